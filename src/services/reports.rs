use crate::db::schema::{NewReport, Report};
use crate::errors::{AppError, Result};
use crate::query::QueryRunner;
use crate::store::InventoryStore;
use crate::workspace::WorkspaceManager;
use serde::Deserialize;
use uuid::Uuid;

/// Request body of `POST /api/v1/reports/run-query`
#[derive(Debug, Clone, Deserialize)]
pub struct RunQuery {
    pub environment_id: Uuid,
    pub query: String,
    pub title: String,
    pub report_type: String,
}

/// Run a query in the tenant's workspace and persist the result as a report.
/// Nothing is stored when the engine fails.
#[tracing::instrument(
    skip(store, workspaces, runner, request),
    fields(environment_id = %request.environment_id)
)]
pub async fn run_query(
    store: &dyn InventoryStore,
    workspaces: &WorkspaceManager,
    runner: &dyn QueryRunner,
    tenant_id: Uuid,
    request: RunQuery,
) -> Result<Report> {
    if request.title.trim().is_empty() {
        return Err(AppError::ValidationError("title is required".to_string()));
    }
    if request.report_type.trim().is_empty() {
        return Err(AppError::ValidationError("report_type is required".to_string()));
    }

    store
        .get_environment(tenant_id, request.environment_id)
        .await?
        .ok_or(AppError::NotFound("Environment"))?;

    let workspace = workspaces.locate(tenant_id).await?;
    let result = runner.execute(&request.query, &workspace).await?;

    let report = store
        .create_report(
            tenant_id,
            NewReport {
                environment_id: request.environment_id,
                title: request.title,
                report_type: request.report_type,
                result,
            },
        )
        .await?;

    tracing::info!(report_id = %report.id, "Report recorded");
    Ok(report)
}
