// Per-tenant, credential-bearing workspaces for the query engine

pub mod locks;

pub use locks::TenantLocks;

use crate::db::schema::CloudProvider;
use crate::observability::MetricsRecorder;
use serde::Serialize;
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use thiserror::Error;
use uuid::Uuid;

/// Name of the configuration artifact inside each workspace
pub const CONFIG_FILE_NAME: &str = "config.json";

#[derive(Debug, Error)]
pub enum WorkspaceError {
    #[error("failed to create workspace directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write workspace configuration {path}: {source}")]
    WriteConfig {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to encode workspace configuration: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("workspace {path} does not exist")]
    NotFound { path: PathBuf },
}

/// Location of a provisioned workspace
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkspaceLocation(PathBuf);

impl WorkspaceLocation {
    pub fn path(&self) -> &Path {
        &self.0
    }

    pub fn config_path(&self) -> PathBuf {
        self.0.join(CONFIG_FILE_NAME)
    }
}

impl AsRef<Path> for WorkspaceLocation {
    fn as_ref(&self) -> &Path {
        &self.0
    }
}

/// Credentials grouped by provider key, as written to `config.json`
#[derive(Clone, PartialEq, Serialize)]
pub struct WorkspaceCredentials {
    pub aws: Value,
    pub gcp: Value,
    pub azure: Value,
}

impl std::fmt::Debug for WorkspaceCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("WorkspaceCredentials(<redacted>)")
    }
}

impl WorkspaceCredentials {
    /// Read a blob already grouped by provider key; absent providers get `{}`
    pub fn from_grouped(blob: &Value) -> Self {
        let pick = |provider: CloudProvider| {
            blob.get(provider.config_key())
                .cloned()
                .unwrap_or_else(|| Value::Object(Map::new()))
        };

        Self {
            aws: pick(CloudProvider::Aws),
            gcp: pick(CloudProvider::Gcp),
            azure: pick(CloudProvider::Azure),
        }
    }

    /// Group an environment's credential blob.
    ///
    /// A blob carrying any provider key is taken as already grouped;
    /// otherwise the whole blob is the record of `provider`.
    pub fn for_environment(provider: CloudProvider, blob: &Value) -> Self {
        let grouped = CloudProvider::ALL
            .iter()
            .any(|p| blob.get(p.config_key()).is_some());

        if grouped {
            return Self::from_grouped(blob);
        }

        let mut wrapped = Map::new();
        wrapped.insert(provider.config_key().to_string(), blob.clone());
        Self::from_grouped(&Value::Object(wrapped))
    }
}

/// Creates and locates tenant workspaces under a root directory.
///
/// Provisioning the same tenant is serialized through [`TenantLocks`];
/// different tenants proceed in parallel.
pub struct WorkspaceManager {
    root: PathBuf,
    locks: TenantLocks,
}

impl WorkspaceManager {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            locks: TenantLocks::new(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Deterministic location for a tenant; does not touch the filesystem
    pub fn location_for(&self, tenant_id: Uuid) -> WorkspaceLocation {
        WorkspaceLocation(self.root.join(tenant_id.to_string()))
    }

    /// Location of an existing workspace
    pub async fn locate(&self, tenant_id: Uuid) -> Result<WorkspaceLocation, WorkspaceError> {
        let location = self.location_for(tenant_id);
        match tokio::fs::metadata(location.path()).await {
            Ok(meta) if meta.is_dir() => Ok(location),
            _ => Err(WorkspaceError::NotFound {
                path: location.0,
            }),
        }
    }

    /// Ensure the tenant's workspace exists and (re)write its configuration.
    /// Last write wins.
    #[tracing::instrument(skip(self, credentials))]
    pub async fn provision(
        &self,
        tenant_id: Uuid,
        credentials: &WorkspaceCredentials,
    ) -> Result<WorkspaceLocation, WorkspaceError> {
        let _guard = self.locks.acquire(tenant_id).await;

        let result = self.write_workspace(tenant_id, credentials).await;
        MetricsRecorder::record_workspace_provision(if result.is_ok() { "ok" } else { "error" });

        match &result {
            Ok(location) => tracing::info!(
                tenant_id = %tenant_id,
                path = %location.path().display(),
                "Workspace provisioned"
            ),
            Err(e) => tracing::error!(tenant_id = %tenant_id, error = %e, "Workspace provisioning failed"),
        }

        result
    }

    async fn write_workspace(
        &self,
        tenant_id: Uuid,
        credentials: &WorkspaceCredentials,
    ) -> Result<WorkspaceLocation, WorkspaceError> {
        let location = self.location_for(tenant_id);

        tokio::fs::create_dir_all(location.path())
            .await
            .map_err(|source| WorkspaceError::CreateDir {
                path: location.path().to_path_buf(),
                source,
            })?;

        let contents = serde_json::to_vec_pretty(credentials)?;
        let target = location.config_path();
        let staging = location.path().join(format!(".{}.tmp", CONFIG_FILE_NAME));

        let write_err = |source| WorkspaceError::WriteConfig {
            path: target.clone(),
            source,
        };

        tokio::fs::write(&staging, &contents).await.map_err(write_err)?;
        restrict_permissions(&staging).await.map_err(write_err)?;
        tokio::fs::rename(&staging, &target).await.map_err(write_err)?;

        Ok(location)
    }
}

#[cfg(unix)]
async fn restrict_permissions(path: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600)).await
}

#[cfg(not(unix))]
async fn restrict_permissions(_path: &Path) -> std::io::Result<()> {
    Ok(())
}
