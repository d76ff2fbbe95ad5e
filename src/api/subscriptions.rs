use crate::{
    api::routes::AppState,
    billing::CheckoutRequest,
    db::schema::Subscription,
    errors::{AppError, Result},
    tenancy::TenantContext,
};
use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize)]
pub struct CheckoutSessionRequest {
    pub price_id: String,
    pub success_url: String,
    pub cancel_url: String,
}

#[derive(Debug, Serialize)]
pub struct CheckoutSessionResponse {
    pub session_id: String,
}

/// GET /api/v1/subscriptions
#[tracing::instrument(skip_all, fields(tenant_id = %ctx.tenant.id))]
pub async fn list_subscriptions(
    State(state): State<AppState>,
    ctx: TenantContext,
) -> Result<Json<Vec<Subscription>>> {
    Ok(Json(state.store.list_subscriptions(ctx.tenant.id).await?))
}

/// POST /api/v1/subscriptions/checkout-session
#[tracing::instrument(skip_all, fields(tenant_id = %ctx.tenant.id))]
pub async fn create_checkout_session(
    State(state): State<AppState>,
    ctx: TenantContext,
    Json(request): Json<CheckoutSessionRequest>,
) -> Result<Json<CheckoutSessionResponse>> {
    if request.price_id.trim().is_empty() {
        return Err(AppError::ValidationError("price_id is required".to_string()));
    }

    let session_id = state
        .billing_gateway
        .create_checkout_session(CheckoutRequest {
            tenant_id: ctx.tenant.id,
            price_id: request.price_id,
            success_url: request.success_url,
            cancel_url: request.cancel_url,
        })
        .await?;

    Ok(Json(CheckoutSessionResponse { session_id }))
}
