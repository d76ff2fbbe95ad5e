use crate::store::InventoryStore;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthStatus {
    pub status: String,
    pub version: String,
    pub checks: HealthChecks,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthChecks {
    pub database: ComponentStatus,
    pub workspace_root: ComponentStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentStatus {
    pub status: String,
    pub message: Option<String>,
}

impl ComponentStatus {
    fn ok() -> Self {
        Self {
            status: "ok".to_string(),
            message: None,
        }
    }

    fn unknown() -> Self {
        Self {
            status: "unknown".to_string(),
            message: None,
        }
    }

    fn error(message: String) -> Self {
        Self {
            status: "error".to_string(),
            message: Some(message),
        }
    }

    fn is_ok(&self) -> bool {
        self.status == "ok"
    }
}

pub struct HealthChecker {
    store: Arc<dyn InventoryStore>,
    workspace_root: PathBuf,
}

impl HealthChecker {
    pub fn new(store: Arc<dyn InventoryStore>, workspace_root: PathBuf) -> Self {
        Self {
            store,
            workspace_root,
        }
    }

    /// Liveness check - is the service running?
    pub async fn liveness(&self) -> HealthStatus {
        HealthStatus {
            status: "ok".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            checks: HealthChecks {
                database: ComponentStatus::unknown(),
                workspace_root: ComponentStatus::unknown(),
            },
        }
    }

    /// Readiness check - can the service handle requests?
    pub async fn readiness(&self) -> HealthStatus {
        let database = self.check_database().await;
        let workspace_root = self.check_workspace_root().await;

        let overall_status = if database.is_ok() && workspace_root.is_ok() {
            "ok"
        } else {
            "degraded"
        };

        HealthStatus {
            status: overall_status.to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            checks: HealthChecks {
                database,
                workspace_root,
            },
        }
    }

    async fn check_database(&self) -> ComponentStatus {
        match self.store.health_check().await {
            Ok(()) => ComponentStatus::ok(),
            Err(e) => ComponentStatus::error(format!("Database check failed: {}", e)),
        }
    }

    async fn check_workspace_root(&self) -> ComponentStatus {
        match tokio::fs::metadata(&self.workspace_root).await {
            Ok(meta) if meta.is_dir() => ComponentStatus::ok(),
            Ok(_) => ComponentStatus::error(format!(
                "{} is not a directory",
                self.workspace_root.display()
            )),
            Err(e) => ComponentStatus::error(format!(
                "{} is not accessible: {}",
                self.workspace_root.display(),
                e
            )),
        }
    }
}
