// End-client management for the resolved tenant

use crate::{
    api::routes::AppState,
    db::schema::EndClient,
    errors::{AppError, Result},
    tenancy::TenantContext,
};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Deserialize)]
pub struct ClientRequest {
    pub name: String,
}

#[derive(Debug, Serialize)]
pub struct ToggleActiveResponse {
    pub status: &'static str,
    pub is_active: bool,
}

fn client_name(request: &ClientRequest) -> Result<&str> {
    let name = request.name.trim();
    if name.is_empty() {
        return Err(AppError::ValidationError("Client name is required".to_string()));
    }
    Ok(name)
}

/// GET /api/v1/clients
#[tracing::instrument(skip_all, fields(tenant_id = %ctx.tenant.id))]
pub async fn list_clients(
    State(state): State<AppState>,
    ctx: TenantContext,
) -> Result<Json<Vec<EndClient>>> {
    Ok(Json(state.store.list_clients(ctx.tenant.id).await?))
}

/// POST /api/v1/clients
#[tracing::instrument(skip_all, fields(tenant_id = %ctx.tenant.id))]
pub async fn create_client(
    State(state): State<AppState>,
    ctx: TenantContext,
    Json(request): Json<ClientRequest>,
) -> Result<(StatusCode, Json<EndClient>)> {
    let client = state
        .store
        .create_client(ctx.tenant.id, client_name(&request)?)
        .await?;

    tracing::info!(client_id = %client.id, "End client created");
    Ok((StatusCode::CREATED, Json(client)))
}

/// GET /api/v1/clients/:id
#[tracing::instrument(skip(state, ctx), fields(tenant_id = %ctx.tenant.id))]
pub async fn get_client(
    State(state): State<AppState>,
    ctx: TenantContext,
    Path(client_id): Path<Uuid>,
) -> Result<Json<EndClient>> {
    state
        .store
        .get_client(ctx.tenant.id, client_id)
        .await?
        .map(Json)
        .ok_or(AppError::NotFound("Client"))
}

/// PATCH /api/v1/clients/:id
#[tracing::instrument(skip(state, ctx, request), fields(tenant_id = %ctx.tenant.id))]
pub async fn update_client(
    State(state): State<AppState>,
    ctx: TenantContext,
    Path(client_id): Path<Uuid>,
    Json(request): Json<ClientRequest>,
) -> Result<Json<EndClient>> {
    state
        .store
        .rename_client(ctx.tenant.id, client_id, client_name(&request)?)
        .await?
        .map(Json)
        .ok_or(AppError::NotFound("Client"))
}

/// POST /api/v1/clients/:id/toggle-active
#[tracing::instrument(skip(state, ctx), fields(tenant_id = %ctx.tenant.id))]
pub async fn toggle_active(
    State(state): State<AppState>,
    ctx: TenantContext,
    Path(client_id): Path<Uuid>,
) -> Result<Json<ToggleActiveResponse>> {
    let client = state
        .store
        .toggle_client_active(ctx.tenant.id, client_id)
        .await?
        .ok_or(AppError::NotFound("Client"))?;

    Ok(Json(ToggleActiveResponse {
        status: "success",
        is_active: client.is_active,
    }))
}
