// Cloud environments; responses never carry credentials

use crate::{
    api::routes::AppState,
    auth::Principal,
    db::schema::{CloudEnvironmentView, CloudProvider},
    errors::{AppError, Result},
    services,
    tenancy::TenantContext,
};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use serde_json::Value;
use uuid::Uuid;

#[derive(Deserialize)]
pub struct CreateEnvironmentRequest {
    pub client_id: Uuid,
    pub provider: CloudProvider,
    pub credentials: Value,
}

/// GET /api/v1/environments
#[tracing::instrument(skip_all, fields(tenant_id = %ctx.tenant.id))]
pub async fn list_environments(
    State(state): State<AppState>,
    ctx: TenantContext,
) -> Result<Json<Vec<CloudEnvironmentView>>> {
    let environments = state.store.list_environments(ctx.tenant.id).await?;
    Ok(Json(environments.iter().map(CloudEnvironmentView::from).collect()))
}

/// POST /api/v1/environments
///
/// Provisions the tenant's workspace with the submitted credentials.
#[tracing::instrument(skip_all, fields(tenant_id = %ctx.tenant.id, user = %principal.subject))]
pub async fn create_environment(
    State(state): State<AppState>,
    ctx: TenantContext,
    principal: Principal,
    Json(request): Json<CreateEnvironmentRequest>,
) -> Result<(StatusCode, Json<CloudEnvironmentView>)> {
    let environment = services::create_environment(
        state.store.as_ref(),
        &state.workspaces,
        ctx.tenant.id,
        request.client_id,
        request.provider,
        request.credentials,
    )
    .await?;

    Ok((StatusCode::CREATED, Json(CloudEnvironmentView::from(&environment))))
}

/// GET /api/v1/environments/:id
#[tracing::instrument(skip(state, ctx), fields(tenant_id = %ctx.tenant.id))]
pub async fn get_environment(
    State(state): State<AppState>,
    ctx: TenantContext,
    Path(environment_id): Path<Uuid>,
) -> Result<Json<CloudEnvironmentView>> {
    state
        .store
        .get_environment(ctx.tenant.id, environment_id)
        .await?
        .map(|env| Json(CloudEnvironmentView::from(&env)))
        .ok_or(AppError::NotFound("Environment"))
}

/// DELETE /api/v1/environments/:id
#[tracing::instrument(
    skip(state, ctx, principal),
    fields(tenant_id = %ctx.tenant.id, user = %principal.subject)
)]
pub async fn delete_environment(
    State(state): State<AppState>,
    ctx: TenantContext,
    principal: Principal,
    Path(environment_id): Path<Uuid>,
) -> Result<StatusCode> {
    if state
        .store
        .delete_environment(ctx.tenant.id, environment_id)
        .await?
    {
        tracing::info!(environment_id = %environment_id, "Cloud environment deleted");
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(AppError::NotFound("Environment"))
    }
}
