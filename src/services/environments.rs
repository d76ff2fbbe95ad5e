use crate::db::schema::{CloudEnvironment, CloudProvider};
use crate::errors::{AppError, Result};
use crate::store::InventoryStore;
use crate::workspace::{WorkspaceCredentials, WorkspaceManager};
use serde_json::Value;
use uuid::Uuid;

/// Store a cloud environment and provision the tenant's workspace with its
/// credentials. Either both happen or neither: when provisioning fails the
/// new record is deleted again and the provisioning error is returned.
#[tracing::instrument(skip(store, workspaces, credentials))]
pub async fn create_environment(
    store: &dyn InventoryStore,
    workspaces: &WorkspaceManager,
    tenant_id: Uuid,
    client_id: Uuid,
    provider: CloudProvider,
    credentials: Value,
) -> Result<CloudEnvironment> {
    if !credentials.is_object() {
        return Err(AppError::ValidationError(
            "credentials must be a JSON object".to_string(),
        ));
    }

    let environment = store
        .create_environment(tenant_id, client_id, provider, credentials)
        .await?;

    let grouped = WorkspaceCredentials::for_environment(provider, &environment.credentials);
    if let Err(e) = workspaces.provision(tenant_id, &grouped).await {
        tracing::error!(
            environment_id = %environment.id,
            error = %e,
            "Workspace provisioning failed; removing environment"
        );

        if let Err(delete_err) = store.delete_environment(tenant_id, environment.id).await {
            tracing::error!(
                environment_id = %environment.id,
                error = %delete_err,
                "Failed to remove environment after provisioning failure"
            );
        }

        return Err(e.into());
    }

    tracing::info!(
        environment_id = %environment.id,
        provider = %provider,
        "Cloud environment created"
    );

    Ok(environment)
}
