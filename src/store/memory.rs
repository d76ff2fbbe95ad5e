// In-memory inventory store for tests and local runs without PostgreSQL

use super::{InventoryStore, LedgerEntry};
use crate::db::schema::{
    CloudEnvironment, CloudProvider, EndClient, NewReport, ProcessedBillingEvent, Report,
    Subscription, SubscriptionChange, Tenant, SUBDOMAIN_KEY,
};
use crate::errors::{AppError, Result};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

#[derive(Default)]
struct State {
    tenants: Vec<Tenant>,
    clients: Vec<EndClient>,
    environments: Vec<CloudEnvironment>,
    reports: Vec<Report>,
    subscriptions: Vec<Subscription>,
    processed_events: HashMap<String, ProcessedBillingEvent>,
}

impl State {
    fn owns_client(&self, tenant_id: Uuid, client_id: Uuid) -> bool {
        self.clients
            .iter()
            .any(|c| c.id == client_id && c.tenant_id == tenant_id)
    }

    fn owns_environment(&self, tenant_id: Uuid, environment_id: Uuid) -> bool {
        self.environments
            .iter()
            .any(|e| e.id == environment_id && self.owns_client(tenant_id, e.client_id))
    }

    fn subdomain_taken(&self, subdomain: Option<&str>, except: Option<Uuid>) -> bool {
        let Some(subdomain) = subdomain else {
            return false;
        };
        self.tenants
            .iter()
            .any(|t| Some(t.id) != except && t.subdomain() == Some(subdomain))
    }
}

/// Cloning shares the underlying state
#[derive(Clone, Default)]
pub struct InMemoryInventoryStore {
    state: Arc<Mutex<State>>,
}

impl InMemoryInventoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of environments stored for a client, across all tenants
    #[cfg(test)]
    pub async fn environment_count_for_client(&self, client_id: Uuid) -> usize {
        let state = self.state.lock().await;
        state
            .environments
            .iter()
            .filter(|e| e.client_id == client_id)
            .count()
    }

    #[cfg(test)]
    pub async fn report_count(&self) -> usize {
        self.state.lock().await.reports.len()
    }
}

#[async_trait]
impl InventoryStore for InMemoryInventoryStore {
    async fn health_check(&self) -> Result<()> {
        Ok(())
    }

    async fn create_tenant(&self, name: &str, config: serde_json::Value) -> Result<Tenant> {
        let mut state = self.state.lock().await;

        let subdomain = config.get(SUBDOMAIN_KEY).and_then(|v| v.as_str());
        if state.subdomain_taken(subdomain, None) {
            return Err(AppError::Conflict("subdomain already in use".to_string()));
        }

        let now = Utc::now();
        let tenant = Tenant {
            id: Uuid::new_v4(),
            name: name.to_string(),
            config,
            created_at: now,
            updated_at: now,
        };
        state.tenants.push(tenant.clone());

        Ok(tenant)
    }

    async fn list_tenants(&self) -> Result<Vec<Tenant>> {
        Ok(self.state.lock().await.tenants.clone())
    }

    async fn get_tenant(&self, tenant_id: Uuid) -> Result<Option<Tenant>> {
        let state = self.state.lock().await;
        Ok(state.tenants.iter().find(|t| t.id == tenant_id).cloned())
    }

    async fn find_tenant_by_subdomain(&self, subdomain: &str) -> Result<Option<Tenant>> {
        let state = self.state.lock().await;
        Ok(state
            .tenants
            .iter()
            .find(|t| t.subdomain() == Some(subdomain))
            .cloned())
    }

    async fn update_tenant_config(
        &self,
        tenant_id: Uuid,
        config: serde_json::Value,
    ) -> Result<Option<Tenant>> {
        let mut state = self.state.lock().await;

        let subdomain = config.get(SUBDOMAIN_KEY).and_then(|v| v.as_str());
        if state.subdomain_taken(subdomain, Some(tenant_id)) {
            return Err(AppError::Conflict("subdomain already in use".to_string()));
        }

        Ok(state
            .tenants
            .iter_mut()
            .find(|t| t.id == tenant_id)
            .map(|tenant| {
                tenant.config = config;
                tenant.updated_at = Utc::now();
                tenant.clone()
            }))
    }

    async fn create_client(&self, tenant_id: Uuid, name: &str) -> Result<EndClient> {
        let mut state = self.state.lock().await;

        if !state.tenants.iter().any(|t| t.id == tenant_id) {
            return Err(AppError::NotFound("Tenant"));
        }

        let now = Utc::now();
        let client = EndClient {
            id: Uuid::new_v4(),
            tenant_id,
            name: name.to_string(),
            is_active: true,
            created_at: now,
            updated_at: now,
        };
        state.clients.push(client.clone());

        Ok(client)
    }

    async fn list_clients(&self, tenant_id: Uuid) -> Result<Vec<EndClient>> {
        let state = self.state.lock().await;
        Ok(state
            .clients
            .iter()
            .filter(|c| c.tenant_id == tenant_id)
            .cloned()
            .collect())
    }

    async fn get_client(&self, tenant_id: Uuid, client_id: Uuid) -> Result<Option<EndClient>> {
        let state = self.state.lock().await;
        Ok(state
            .clients
            .iter()
            .find(|c| c.id == client_id && c.tenant_id == tenant_id)
            .cloned())
    }

    async fn rename_client(
        &self,
        tenant_id: Uuid,
        client_id: Uuid,
        name: &str,
    ) -> Result<Option<EndClient>> {
        let mut state = self.state.lock().await;
        Ok(state
            .clients
            .iter_mut()
            .find(|c| c.id == client_id && c.tenant_id == tenant_id)
            .map(|client| {
                client.name = name.to_string();
                client.updated_at = Utc::now();
                client.clone()
            }))
    }

    async fn toggle_client_active(
        &self,
        tenant_id: Uuid,
        client_id: Uuid,
    ) -> Result<Option<EndClient>> {
        let mut state = self.state.lock().await;
        Ok(state
            .clients
            .iter_mut()
            .find(|c| c.id == client_id && c.tenant_id == tenant_id)
            .map(|client| {
                client.is_active = !client.is_active;
                client.updated_at = Utc::now();
                client.clone()
            }))
    }

    async fn create_environment(
        &self,
        tenant_id: Uuid,
        client_id: Uuid,
        provider: CloudProvider,
        credentials: serde_json::Value,
    ) -> Result<CloudEnvironment> {
        let mut state = self.state.lock().await;

        if !state.owns_client(tenant_id, client_id) {
            return Err(AppError::NotFound("Client"));
        }

        let now = Utc::now();
        let environment = CloudEnvironment {
            id: Uuid::new_v4(),
            client_id,
            provider,
            credentials,
            created_at: now,
            updated_at: now,
        };
        state.environments.push(environment.clone());

        Ok(environment)
    }

    async fn list_environments(&self, tenant_id: Uuid) -> Result<Vec<CloudEnvironment>> {
        let state = self.state.lock().await;
        Ok(state
            .environments
            .iter()
            .filter(|e| state.owns_client(tenant_id, e.client_id))
            .cloned()
            .collect())
    }

    async fn get_environment(
        &self,
        tenant_id: Uuid,
        environment_id: Uuid,
    ) -> Result<Option<CloudEnvironment>> {
        let state = self.state.lock().await;
        Ok(state
            .environments
            .iter()
            .find(|e| e.id == environment_id && state.owns_client(tenant_id, e.client_id))
            .cloned())
    }

    async fn delete_environment(&self, tenant_id: Uuid, environment_id: Uuid) -> Result<bool> {
        let mut state = self.state.lock().await;

        if !state.owns_environment(tenant_id, environment_id) {
            return Ok(false);
        }

        state.environments.retain(|e| e.id != environment_id);
        state.reports.retain(|r| r.environment_id != environment_id);

        Ok(true)
    }

    async fn create_report(&self, tenant_id: Uuid, report: NewReport) -> Result<Report> {
        let mut state = self.state.lock().await;

        if !state.owns_environment(tenant_id, report.environment_id) {
            return Err(AppError::NotFound("Environment"));
        }

        let created = Report {
            id: Uuid::new_v4(),
            environment_id: report.environment_id,
            title: report.title,
            report_type: report.report_type,
            result: report.result,
            created_at: Utc::now(),
        };
        state.reports.push(created.clone());

        Ok(created)
    }

    async fn list_reports(&self, tenant_id: Uuid) -> Result<Vec<Report>> {
        let state = self.state.lock().await;
        let mut reports: Vec<Report> = state
            .reports
            .iter()
            .filter(|r| state.owns_environment(tenant_id, r.environment_id))
            .cloned()
            .collect();
        reports.reverse();
        Ok(reports)
    }

    async fn get_report(&self, tenant_id: Uuid, report_id: Uuid) -> Result<Option<Report>> {
        let state = self.state.lock().await;
        Ok(state
            .reports
            .iter()
            .find(|r| r.id == report_id && state.owns_environment(tenant_id, r.environment_id))
            .cloned())
    }

    async fn delete_report(&self, tenant_id: Uuid, report_id: Uuid) -> Result<bool> {
        let mut state = self.state.lock().await;

        let owned = state
            .reports
            .iter()
            .any(|r| r.id == report_id && state.owns_environment(tenant_id, r.environment_id));
        if owned {
            state.reports.retain(|r| r.id != report_id);
        }

        Ok(owned)
    }

    async fn list_subscriptions(&self, tenant_id: Uuid) -> Result<Vec<Subscription>> {
        let state = self.state.lock().await;
        Ok(state
            .subscriptions
            .iter()
            .filter(|s| s.tenant_id == tenant_id)
            .cloned()
            .collect())
    }

    async fn apply_billing_event(
        &self,
        event_id: &str,
        event_type: &str,
        change: SubscriptionChange,
    ) -> Result<LedgerEntry> {
        let mut state = self.state.lock().await;

        if state.processed_events.contains_key(event_id) {
            return Ok(LedgerEntry::Duplicate);
        }

        let now = Utc::now();
        let rows_changed = match change {
            SubscriptionChange::Upsert { tenant_id, update } => {
                if !state.tenants.iter().any(|t| t.id == tenant_id) {
                    return Err(AppError::NotFound("Tenant"));
                }

                let position = state
                    .subscriptions
                    .iter()
                    .position(|s| s.tenant_id == tenant_id);
                match position {
                    Some(index) => {
                        let existing = &mut state.subscriptions[index];
                        existing.provider_subscription_id = update.provider_subscription_id;
                        existing.status = update.status;
                        existing.plan = update.plan;
                        existing.updated_at = now;
                    }
                    None => state.subscriptions.push(Subscription {
                        id: Uuid::new_v4(),
                        tenant_id,
                        provider_subscription_id: update.provider_subscription_id,
                        status: update.status,
                        plan: update.plan,
                        created_at: now,
                        updated_at: now,
                    }),
                }
                1
            }
            SubscriptionChange::SetStatus {
                provider_subscription_id,
                status,
            } => {
                let mut changed = 0;
                for sub in state
                    .subscriptions
                    .iter_mut()
                    .filter(|s| s.provider_subscription_id == provider_subscription_id)
                {
                    sub.status = status;
                    sub.updated_at = now;
                    changed += 1;
                }
                changed
            }
            SubscriptionChange::None => 0,
        };

        state.processed_events.insert(
            event_id.to_string(),
            ProcessedBillingEvent {
                event_id: event_id.to_string(),
                event_type: event_type.to_string(),
                processed_at: now,
            },
        );

        Ok(LedgerEntry::Recorded { rows_changed })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::schema::{SubscriptionStatus, SubscriptionUpdate};
    use serde_json::json;

    async fn seeded() -> (InMemoryInventoryStore, Tenant, EndClient) {
        let store = InMemoryInventoryStore::new();
        let tenant = store
            .create_tenant("Acme Consulting", json!({"subdomain": "acme"}))
            .await
            .unwrap();
        let client = store.create_client(tenant.id, "Globex").await.unwrap();
        (store, tenant, client)
    }

    async fn cancel(
        store: &InMemoryInventoryStore,
        event_id: &str,
        provider_subscription_id: &str,
    ) -> LedgerEntry {
        store
            .apply_billing_event(
                event_id,
                "customer.subscription.deleted",
                SubscriptionChange::SetStatus {
                    provider_subscription_id: provider_subscription_id.to_string(),
                    status: SubscriptionStatus::Cancelled,
                },
            )
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_subdomain_must_be_unique() {
        let (store, _, _) = seeded().await;
        let result = store
            .create_tenant("Copycat", json!({"subdomain": "acme"}))
            .await;
        assert!(matches!(result, Err(AppError::Conflict(_))));
    }

    #[tokio::test]
    async fn test_other_tenant_cannot_see_records() {
        let (store, tenant, client) = seeded().await;
        let other = store
            .create_tenant("Other", json!({"subdomain": "other"}))
            .await
            .unwrap();

        let env = store
            .create_environment(tenant.id, client.id, CloudProvider::Aws, json!({}))
            .await
            .unwrap();
        let report = store
            .create_report(
                tenant.id,
                NewReport {
                    environment_id: env.id,
                    title: "Buckets".to_string(),
                    report_type: "inventory".to_string(),
                    result: json!([]),
                },
            )
            .await
            .unwrap();

        assert!(store.get_client(other.id, client.id).await.unwrap().is_none());
        assert!(store.get_environment(other.id, env.id).await.unwrap().is_none());
        assert!(store.get_report(other.id, report.id).await.unwrap().is_none());
        assert!(store.list_reports(other.id).await.unwrap().is_empty());
        assert!(!store.delete_environment(other.id, env.id).await.unwrap());
        assert!(matches!(
            store
                .create_environment(other.id, client.id, CloudProvider::Gcp, json!({}))
                .await,
            Err(AppError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_toggle_client_active() {
        let (store, tenant, client) = seeded().await;
        assert!(client.is_active);

        let toggled = store
            .toggle_client_active(tenant.id, client.id)
            .await
            .unwrap()
            .unwrap();
        assert!(!toggled.is_active);

        let toggled = store
            .toggle_client_active(tenant.id, client.id)
            .await
            .unwrap()
            .unwrap();
        assert!(toggled.is_active);
    }

    #[tokio::test]
    async fn test_billing_event_applied_once() {
        let (store, tenant, _) = seeded().await;
        let change = SubscriptionChange::Upsert {
            tenant_id: tenant.id,
            update: SubscriptionUpdate {
                provider_subscription_id: "sub_1".to_string(),
                status: SubscriptionStatus::Active,
                plan: "pro".to_string(),
            },
        };

        assert_eq!(
            store
                .apply_billing_event("evt_1", "checkout.session.completed", change.clone())
                .await
                .unwrap(),
            LedgerEntry::Recorded { rows_changed: 1 }
        );
        assert_eq!(
            store
                .apply_billing_event("evt_1", "checkout.session.completed", change)
                .await
                .unwrap(),
            LedgerEntry::Duplicate
        );

        let subs = store.list_subscriptions(tenant.id).await.unwrap();
        assert_eq!(subs.len(), 1);
        assert_eq!(subs[0].status, SubscriptionStatus::Active);
    }

    #[tokio::test]
    async fn test_cancel_by_provider_id() {
        let (store, tenant, _) = seeded().await;
        store
            .apply_billing_event(
                "evt_1",
                "checkout.session.completed",
                SubscriptionChange::Upsert {
                    tenant_id: tenant.id,
                    update: SubscriptionUpdate {
                        provider_subscription_id: "sub_1".to_string(),
                        status: SubscriptionStatus::Active,
                        plan: "pro".to_string(),
                    },
                },
            )
            .await
            .unwrap();

        assert_eq!(
            cancel(&store, "evt_2", "sub_unknown").await,
            LedgerEntry::Recorded { rows_changed: 0 }
        );
        assert_eq!(
            cancel(&store, "evt_3", "sub_1").await,
            LedgerEntry::Recorded { rows_changed: 1 }
        );

        let subs = store.list_subscriptions(tenant.id).await.unwrap();
        assert_eq!(subs[0].status, SubscriptionStatus::Cancelled);
    }
}
