// Report listing, export and query execution

use crate::{
    api::routes::AppState,
    auth::Principal,
    db::schema::Report,
    errors::{AppError, Result},
    reports::{export_filename, render_csv, ExportFormat},
    services::{self, RunQuery},
    tenancy::TenantContext,
};
use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use serde::Deserialize;
use uuid::Uuid;

#[derive(Debug, Deserialize)]
pub struct ExportParams {
    pub format: Option<String>,
}

async fn find_report(state: &AppState, tenant_id: Uuid, report_id: Uuid) -> Result<Report> {
    state
        .store
        .get_report(tenant_id, report_id)
        .await?
        .ok_or(AppError::NotFound("Report"))
}

/// GET /api/v1/reports
#[tracing::instrument(skip_all, fields(tenant_id = %ctx.tenant.id))]
pub async fn list_reports(
    State(state): State<AppState>,
    ctx: TenantContext,
) -> Result<Json<Vec<Report>>> {
    Ok(Json(state.store.list_reports(ctx.tenant.id).await?))
}

/// GET /api/v1/reports/:id
#[tracing::instrument(skip(state, ctx), fields(tenant_id = %ctx.tenant.id))]
pub async fn get_report(
    State(state): State<AppState>,
    ctx: TenantContext,
    Path(report_id): Path<Uuid>,
) -> Result<Json<Report>> {
    Ok(Json(find_report(&state, ctx.tenant.id, report_id).await?))
}

/// DELETE /api/v1/reports/:id
#[tracing::instrument(
    skip(state, ctx, principal),
    fields(tenant_id = %ctx.tenant.id, user = %principal.subject)
)]
pub async fn delete_report(
    State(state): State<AppState>,
    ctx: TenantContext,
    principal: Principal,
    Path(report_id): Path<Uuid>,
) -> Result<StatusCode> {
    if state.store.delete_report(ctx.tenant.id, report_id).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(AppError::NotFound("Report"))
    }
}

/// GET /api/v1/reports/:id/export?format=json|csv
#[tracing::instrument(skip(state, ctx), fields(tenant_id = %ctx.tenant.id))]
pub async fn export_report(
    State(state): State<AppState>,
    ctx: TenantContext,
    Path(report_id): Path<Uuid>,
    Query(params): Query<ExportParams>,
) -> Result<Response> {
    let format = match params.format.as_deref() {
        Some(raw) => raw.parse::<ExportFormat>()?,
        None => ExportFormat::default(),
    };

    let report = find_report(&state, ctx.tenant.id, report_id).await?;

    match format {
        ExportFormat::Json => Ok(Json(report.result).into_response()),
        ExportFormat::Csv => {
            let body = render_csv(&report.result)?;
            let filename = export_filename(report.id, Utc::now(), format);

            Ok((
                [
                    (header::CONTENT_TYPE, format.content_type().to_string()),
                    (
                        header::CONTENT_DISPOSITION,
                        format!("attachment; filename=\"{}\"", filename),
                    ),
                ],
                body,
            )
                .into_response())
        }
    }
}

/// POST /api/v1/reports/run-query
#[tracing::instrument(skip_all, fields(tenant_id = %ctx.tenant.id, user = %principal.subject))]
pub async fn run_query(
    State(state): State<AppState>,
    ctx: TenantContext,
    principal: Principal,
    Json(request): Json<RunQuery>,
) -> Result<(StatusCode, Json<Report>)> {
    let report = services::run_query(
        state.store.as_ref(),
        &state.workspaces,
        state.query_runner.as_ref(),
        ctx.tenant.id,
        request,
    )
    .await?;

    Ok((StatusCode::CREATED, Json(report)))
}
