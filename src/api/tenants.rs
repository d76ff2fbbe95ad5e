// Tenant registration (operators) and self-service config

use crate::{
    api::routes::AppState,
    db::schema::Tenant,
    errors::Result,
    services,
    tenancy::TenantContext,
};
use axum::{extract::State, http::StatusCode, Json};
use serde::Deserialize;
use serde_json::Value;

#[derive(Debug, Deserialize)]
pub struct CreateTenantRequest {
    pub name: String,
    #[serde(default)]
    pub config: Value,
}

#[derive(Debug, Deserialize)]
pub struct UpdateTenantRequest {
    pub config: Value,
}

/// POST /admin/tenants
#[tracing::instrument(skip(state, request), fields(name = %request.name))]
pub async fn create_tenant(
    State(state): State<AppState>,
    Json(request): Json<CreateTenantRequest>,
) -> Result<(StatusCode, Json<Tenant>)> {
    let tenant = services::create_tenant(state.store.as_ref(), &request.name, request.config).await?;
    Ok((StatusCode::CREATED, Json(tenant)))
}

/// GET /admin/tenants
#[tracing::instrument(skip(state))]
pub async fn list_tenants(State(state): State<AppState>) -> Result<Json<Vec<Tenant>>> {
    Ok(Json(state.store.list_tenants().await?))
}

/// GET /api/v1/tenant
pub async fn get_current_tenant(ctx: TenantContext) -> Json<Tenant> {
    Json(ctx.tenant)
}

/// PATCH /api/v1/tenant
#[tracing::instrument(skip_all, fields(tenant_id = %ctx.tenant.id))]
pub async fn update_current_tenant(
    State(state): State<AppState>,
    ctx: TenantContext,
    Json(request): Json<UpdateTenantRequest>,
) -> Result<Json<Tenant>> {
    let tenant =
        services::update_tenant_config(state.store.as_ref(), &ctx.tenant, request.config).await?;
    Ok(Json(tenant))
}
