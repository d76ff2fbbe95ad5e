use crate::{
    api::{clients, environments, health, public, reports, subscriptions, tenants},
    auth::{require_admin_key, require_tenant_token, TokenVerifier},
    billing::{BillingEventHandler, BillingGateway, SignatureVerifier},
    config::Config,
    errors::Result,
    observability::{track_http_metrics, HealthChecker},
    query::QueryRunner,
    store::InventoryStore,
    tenancy::resolve_tenant,
    workspace::WorkspaceManager,
};
use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub store: Arc<dyn InventoryStore>,
    pub workspaces: Arc<WorkspaceManager>,
    pub query_runner: Arc<dyn QueryRunner>,
    pub billing: Arc<BillingEventHandler>,
    pub billing_gateway: Arc<dyn BillingGateway>,
    pub token_verifier: Arc<TokenVerifier>,
    pub health_checker: Arc<HealthChecker>,
}

impl AppState {
    /// Wire the components around the given collaborators
    pub fn new(
        config: Config,
        store: Arc<dyn InventoryStore>,
        query_runner: Arc<dyn QueryRunner>,
        billing_gateway: Arc<dyn BillingGateway>,
    ) -> Result<Self> {
        let token_verifier = Arc::new(TokenVerifier::new(&config.auth)?);
        let workspaces = Arc::new(WorkspaceManager::new(config.workspace.root_dir.clone()));
        let billing = Arc::new(BillingEventHandler::new(
            store.clone(),
            SignatureVerifier::new(
                &config.billing.webhook_secret,
                config.billing.signature_tolerance_seconds,
            ),
        ));
        let health_checker = Arc::new(HealthChecker::new(
            store.clone(),
            workspaces.root().to_path_buf(),
        ));

        Ok(Self {
            config: Arc::new(config),
            store,
            workspaces,
            query_runner,
            billing,
            billing_gateway,
            token_verifier,
            health_checker,
        })
    }
}

pub fn create_router(state: AppState) -> Router {
    // Configure CORS
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let mut router = Router::new()
        // Health endpoints
        .route("/health/live", get(health::liveness))
        .route("/health/ready", get(health::readiness));

    if state.config.observability.metrics_enabled {
        router = router.route("/metrics", get(health::metrics));
    }

    router
        .nest("/admin", admin_routes(state.clone()))
        .nest("/api/public", public_routes())
        .nest("/api/v1", v1_routes(state.clone()))
        // Add middleware; the last layer added runs first
        .layer(middleware::from_fn_with_state(state.clone(), resolve_tenant))
        .layer(middleware::from_fn(track_http_metrics))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        // Add state
        .with_state(state)
}

fn admin_routes(state: AppState) -> Router<AppState> {
    Router::new()
        .route(
            "/tenants",
            get(tenants::list_tenants).post(tenants::create_tenant),
        )
        .route_layer(middleware::from_fn_with_state(state, require_admin_key))
}

fn public_routes() -> Router<AppState> {
    Router::new()
        .route("/branding", get(public::branding))
        .route("/webhooks/billing", post(public::billing_webhook))
}

fn v1_routes(state: AppState) -> Router<AppState> {
    Router::new()
        .route(
            "/tenant",
            get(tenants::get_current_tenant).patch(tenants::update_current_tenant),
        )
        .route(
            "/clients",
            get(clients::list_clients).post(clients::create_client),
        )
        .route(
            "/clients/:id",
            get(clients::get_client).patch(clients::update_client),
        )
        .route("/clients/:id/toggle-active", post(clients::toggle_active))
        .route(
            "/environments",
            get(environments::list_environments).post(environments::create_environment),
        )
        .route(
            "/environments/:id",
            get(environments::get_environment).delete(environments::delete_environment),
        )
        .route("/reports", get(reports::list_reports))
        .route("/reports/run-query", post(reports::run_query))
        .route(
            "/reports/:id",
            get(reports::get_report).delete(reports::delete_report),
        )
        .route("/reports/:id/export", get(reports::export_report))
        .route("/subscriptions", get(subscriptions::list_subscriptions))
        .route(
            "/subscriptions/checkout-session",
            post(subscriptions::create_checkout_session),
        )
        .route_layer(middleware::from_fn_with_state(state, require_tenant_token))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::jwt::issue_for_tests;
    use crate::billing::{signature::sign_for_tests, BillingError, CheckoutRequest};
    use crate::db::schema::{CloudProvider, Tenant};
    use crate::query::QueryError;
    use crate::store::InMemoryInventoryStore;
    use crate::workspace::{WorkspaceCredentials, WorkspaceLocation};
    use async_trait::async_trait;
    use axum::{
        body::Body,
        http::{header, Request, StatusCode},
        response::Response,
    };
    use http_body_util::BodyExt;
    use serde_json::{json, Value};
    use std::sync::Mutex;
    use tempfile::TempDir;
    use tower::ServiceExt;

    struct FixedRunner(Value);

    #[async_trait]
    impl QueryRunner for FixedRunner {
        async fn execute(
            &self,
            _query: &str,
            _workspace: &WorkspaceLocation,
        ) -> std::result::Result<Value, QueryError> {
            Ok(self.0.clone())
        }
    }

    #[derive(Default)]
    struct RecordingGateway {
        requests: Mutex<Vec<CheckoutRequest>>,
    }

    #[async_trait]
    impl BillingGateway for RecordingGateway {
        async fn create_checkout_session(
            &self,
            request: CheckoutRequest,
        ) -> std::result::Result<String, BillingError> {
            self.requests.lock().unwrap().push(request);
            Ok("cs_test_1".to_string())
        }
    }

    struct TestApp {
        root: TempDir,
        router: Router,
        state: AppState,
        store: InMemoryInventoryStore,
        gateway: Arc<RecordingGateway>,
        acme: Tenant,
        globex: Tenant,
    }

    async fn test_app() -> TestApp {
        let root = tempfile::tempdir().unwrap();
        let store = InMemoryInventoryStore::new();
        let gateway = Arc::new(RecordingGateway::default());

        let acme = store
            .create_tenant("Acme", json!({"subdomain": "acme", "brand_name": "Acme Cloud"}))
            .await
            .unwrap();
        let globex = store
            .create_tenant("Globex", json!({"subdomain": "globex"}))
            .await
            .unwrap();

        let state = AppState::new(
            Config::for_tests(root.path().to_path_buf()),
            Arc::new(store.clone()),
            Arc::new(FixedRunner(json!([
                {"instance_id": "i-1", "region": "us-east-1"},
                {"instance_id": "i-2", "region": "eu-west-1"}
            ]))),
            gateway.clone(),
        )
        .unwrap();

        TestApp {
            root,
            router: create_router(state.clone()),
            state,
            store,
            gateway,
            acme,
            globex,
        }
    }

    impl TestApp {
        fn token(&self, tenant: &Tenant) -> String {
            issue_for_tests(&self.state.config.auth, tenant.id, 900)
        }

        async fn send(&self, request: Request<Body>) -> Response {
            self.router.clone().oneshot(request).await.unwrap()
        }

        /// Authenticated request on the tenant's own host
        async fn call(&self, tenant: &Tenant, method: &str, uri: &str, body: Option<Value>) -> Response {
            let host = format!("{}.cloudmanager.example.com", tenant.subdomain().unwrap());
            self.send(request(method, uri, &host, Some(&self.token(tenant)), body))
                .await
        }
    }

    fn request(
        method: &str,
        uri: &str,
        host: &str,
        bearer: Option<&str>,
        body: Option<Value>,
    ) -> Request<Body> {
        let mut builder = Request::builder()
            .method(method)
            .uri(uri)
            .header(header::HOST, host);
        if let Some(token) = bearer {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        }
    }

    async fn body_bytes(response: Response) -> Vec<u8> {
        response.into_body().collect().await.unwrap().to_bytes().to_vec()
    }

    async fn body_json(response: Response) -> Value {
        serde_json::from_slice(&body_bytes(response).await).unwrap()
    }

    #[tokio::test]
    async fn test_health_bypasses_tenant_resolution() {
        let app = test_app().await;
        let response = app
            .send(request("GET", "/health/live", "localhost:8080", None, None))
            .await;
        assert_eq!(response.status(), StatusCode::OK);

        let response = app
            .send(request("GET", "/metrics", "10.0.0.1", None, None))
            .await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_unknown_and_malformed_hosts_get_same_denial() {
        let app = test_app().await;
        let token = app.token(&app.acme);

        let unknown = app
            .send(request("GET", "/api/v1/clients", "initech.cloudmanager.example.com", Some(&token), None))
            .await;
        let malformed = app
            .send(request("GET", "/api/v1/clients", "localhost", Some(&token), None))
            .await;

        assert_eq!(unknown.status(), StatusCode::FORBIDDEN);
        assert_eq!(malformed.status(), StatusCode::FORBIDDEN);
        let unknown = body_json(unknown).await;
        assert_eq!(unknown, body_json(malformed).await);
        assert_eq!(unknown["error"], "Invalid tenant");
    }

    #[tokio::test]
    async fn test_branding_is_public() {
        let app = test_app().await;

        let response = app
            .send(request("GET", "/api/public/branding", "ACME.cloudmanager.example.com:443", None, None))
            .await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["name"], "Acme");
        assert_eq!(body["config"]["brand_name"], "Acme Cloud");

        let response = app
            .send(request("GET", "/api/public/branding", "nobody.cloudmanager.example.com", None, None))
            .await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_token_required_and_bound_to_tenant() {
        let app = test_app().await;
        let host = "acme.cloudmanager.example.com";

        let response = app.send(request("GET", "/api/v1/clients", host, None, None)).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let foreign = app.token(&app.globex);
        let response = app
            .send(request("GET", "/api/v1/clients", host, Some(&foreign), None))
            .await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_admin_key_required() {
        let app = test_app().await;

        let response = app
            .send(request("GET", "/admin/tenants", "localhost", Some("wrong"), None))
            .await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let response = app
            .send(request(
                "POST",
                "/admin/tenants",
                "localhost",
                Some("test-admin-key"),
                Some(json!({"name": "Initech", "config": {"subdomain": "InitTech"}})),
            ))
            .await;
        assert_eq!(response.status(), StatusCode::CREATED);
        assert_eq!(body_json(response).await["config"]["subdomain"], "inittech");
    }

    #[tokio::test]
    async fn test_client_lifecycle_and_isolation() {
        let app = test_app().await;

        let response = app
            .call(&app.acme, "POST", "/api/v1/clients", Some(json!({"name": "Wayne Corp"})))
            .await;
        assert_eq!(response.status(), StatusCode::CREATED);
        let client_id = body_json(response).await["id"].as_str().unwrap().to_string();

        let response = app
            .call(&app.acme, "POST", &format!("/api/v1/clients/{}/toggle-active", client_id), None)
            .await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            body_json(response).await,
            json!({"status": "success", "is_active": false})
        );

        let response = app
            .call(&app.globex, "GET", &format!("/api/v1/clients/{}", client_id), None)
            .await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let response = app.call(&app.globex, "GET", "/api/v1/clients", None).await;
        assert_eq!(body_json(response).await, json!([]));
    }

    #[tokio::test]
    async fn test_environment_response_hides_credentials() {
        let app = test_app().await;
        let client = app.store.create_client(app.acme.id, "Wayne Corp").await.unwrap();

        let response = app
            .call(
                &app.acme,
                "POST",
                "/api/v1/environments",
                Some(json!({
                    "client_id": client.id,
                    "provider": "AWS",
                    "credentials": {"access_key": "AKIA", "secret_key": "hunter2"}
                })),
            )
            .await;
        assert_eq!(response.status(), StatusCode::CREATED);
        let bytes = body_bytes(response).await;
        let text = String::from_utf8(bytes).unwrap();
        assert!(!text.contains("hunter2"));
        assert!(!text.contains("credentials"));

        assert!(app.state.workspaces.locate(app.acme.id).await.is_ok());
    }

    #[tokio::test]
    async fn test_run_query_then_export_csv() {
        let app = test_app().await;
        let client = app.store.create_client(app.acme.id, "Wayne Corp").await.unwrap();
        let env = app
            .store
            .create_environment(app.acme.id, client.id, CloudProvider::Aws, json!({}))
            .await
            .unwrap();
        app.state
            .workspaces
            .provision(app.acme.id, &WorkspaceCredentials::from_grouped(&json!({})))
            .await
            .unwrap();

        let response = app
            .call(
                &app.acme,
                "POST",
                "/api/v1/reports/run-query",
                Some(json!({
                    "environment_id": env.id,
                    "query": "select instance_id, region from aws_ec2_instance",
                    "title": "EC2",
                    "report_type": "inventory"
                })),
            )
            .await;
        assert_eq!(response.status(), StatusCode::CREATED);
        let report_id = body_json(response).await["id"].as_str().unwrap().to_string();

        let response = app
            .call(&app.acme, "GET", &format!("/api/v1/reports/{}/export?format=csv", report_id), None)
            .await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            "text/csv; charset=utf-8"
        );
        let disposition = response.headers()[header::CONTENT_DISPOSITION]
            .to_str()
            .unwrap()
            .to_string();
        assert!(disposition.starts_with(&format!("attachment; filename=\"report_{}_", report_id)));
        assert_eq!(
            body_bytes(response).await,
            b"instance_id,region\ni-1,us-east-1\ni-2,eu-west-1\n".to_vec()
        );

        let response = app
            .call(&app.acme, "GET", &format!("/api/v1/reports/{}/export?format=xml", report_id), None)
            .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = app
            .call(&app.globex, "GET", &format!("/api/v1/reports/{}/export", report_id), None)
            .await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_run_query_without_workspace_is_conflict() {
        let app = test_app().await;
        let client = app.store.create_client(app.acme.id, "Wayne Corp").await.unwrap();
        let env = app
            .store
            .create_environment(app.acme.id, client.id, CloudProvider::Aws, json!({}))
            .await
            .unwrap();

        let response = app
            .call(
                &app.acme,
                "POST",
                "/api/v1/reports/run-query",
                Some(json!({
                    "environment_id": env.id,
                    "query": "select 1",
                    "title": "t",
                    "report_type": "custom"
                })),
            )
            .await;
        assert_eq!(response.status(), StatusCode::CONFLICT);
        let body = body_json(response).await;
        let message = body["error"].as_str().unwrap();
        assert!(!message.contains(&app.acme.id.to_string()));
        assert!(!message.contains(app.root.path().to_str().unwrap()));
        assert_eq!(app.store.report_count().await, 0);
    }

    #[tokio::test]
    async fn test_billing_webhook_applies_once() {
        let app = test_app().await;
        let payload = json!({
            "id": "evt_1",
            "type": "checkout.session.completed",
            "data": {"object": {
                "client_reference_id": app.acme.id.to_string(),
                "subscription": "sub_1",
                "display_items": [{"plan": {"id": "pro"}}]
            }}
        })
        .to_string();
        let signature = sign_for_tests("whsec_test", payload.as_bytes(), chrono::Utc::now().timestamp());

        let webhook = || {
            Request::builder()
                .method("POST")
                .uri("/api/public/webhooks/billing")
                .header(header::HOST, "api.cloudmanager.example.com")
                .header("stripe-signature", signature.clone())
                .body(Body::from(payload.clone()))
                .unwrap()
        };

        let response = app.send(webhook()).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["outcome"], "applied");

        let response = app.send(webhook()).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["outcome"], "duplicate");

        let response = app.call(&app.acme, "GET", "/api/v1/subscriptions", None).await;
        let subs = body_json(response).await;
        assert_eq!(subs.as_array().unwrap().len(), 1);
        assert_eq!(subs[0]["plan"], "pro");
        assert!(subs[0].get("provider_subscription_id").is_none());
    }

    #[tokio::test]
    async fn test_billing_webhook_rejects_bad_signature() {
        let app = test_app().await;
        let response = app
            .send(
                Request::builder()
                    .method("POST")
                    .uri("/api/public/webhooks/billing")
                    .header(header::HOST, "api.cloudmanager.example.com")
                    .header("stripe-signature", "t=1,v1=deadbeef")
                    .body(Body::from("{}"))
                    .unwrap(),
            )
            .await;

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(response).await["error"], "Invalid signature");
    }

    #[tokio::test]
    async fn test_checkout_session_uses_resolved_tenant() {
        let app = test_app().await;

        let response = app
            .call(
                &app.acme,
                "POST",
                "/api/v1/subscriptions/checkout-session",
                Some(json!({
                    "price_id": "price_pro",
                    "success_url": "https://acme.example.com/ok",
                    "cancel_url": "https://acme.example.com/cancel"
                })),
            )
            .await;

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await, json!({"session_id": "cs_test_1"}));
        assert_eq!(app.gateway.requests.lock().unwrap()[0].tenant_id, app.acme.id);
    }

    #[tokio::test]
    async fn test_tenant_patch_cannot_remove_subdomain() {
        let app = test_app().await;

        let response = app
            .call(&app.acme, "PATCH", "/api/v1/tenant", Some(json!({"config": {"primary_color": "#000"}})))
            .await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["config"]["primary_color"], "#000");

        let response = app
            .call(&app.acme, "PATCH", "/api/v1/tenant", Some(json!({"config": {"subdomain": null}})))
            .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
