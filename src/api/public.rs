// Endpoints reachable without a user session

use crate::{
    api::routes::AppState,
    db::schema::Branding,
    errors::{AppError, Result},
    tenancy::TenantContext,
};
use axum::{body::Bytes, extract::State, http::HeaderMap, Json};
use serde_json::{json, Value};

/// GET /api/public/branding
#[tracing::instrument(skip_all)]
pub async fn branding(tenant: Option<TenantContext>) -> Result<Json<Branding>> {
    let ctx = tenant.ok_or(AppError::NotFound("Tenant"))?;
    Ok(Json(Branding::from(&ctx.tenant)))
}

/// POST /api/public/webhooks/billing
///
/// The body is verified byte-for-byte, so it is taken raw.
#[tracing::instrument(skip_all)]
pub async fn billing_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Value>> {
    let signature = headers
        .get(state.config.billing.signature_header.as_str())
        .and_then(|v| v.to_str().ok());

    let outcome = state.billing.handle(&body, signature).await?;

    Ok(Json(json!({
        "status": "success",
        "outcome": outcome.as_str(),
    })))
}
