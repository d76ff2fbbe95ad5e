// External query engine invocation

pub mod executor;

pub use executor::{EngineCommand, ProcessQueryExecutor};

use crate::workspace::WorkspaceLocation;
use async_trait::async_trait;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Failure kinds of a query run. The three engine-facing kinds are
/// mutually exclusive: missing workspace, process failure, unparseable output.
#[derive(Debug, Error)]
pub enum QueryError {
    #[error("workspace {path} does not exist")]
    WorkspaceNotFound { path: PathBuf },

    #[error("query text is empty")]
    EmptyQuery,

    /// Spawn failure, non-zero exit, or timeout (`timeout` is set)
    #[error("query engine failed (exit code {exit_code:?}, timeout {timeout:?}): {diagnostics}")]
    ProcessExecution {
        exit_code: Option<i32>,
        diagnostics: String,
        timeout: Option<Duration>,
    },

    #[error("query engine output is not valid JSON: {0}")]
    OutputParse(#[source] serde_json::Error),
}

impl QueryError {
    /// Label used for metrics
    pub fn kind(&self) -> &'static str {
        match self {
            QueryError::WorkspaceNotFound { .. } => "workspace_not_found",
            QueryError::EmptyQuery => "empty_query",
            QueryError::ProcessExecution { timeout: Some(_), .. } => "timeout",
            QueryError::ProcessExecution { .. } => "process_error",
            QueryError::OutputParse(_) => "parse_error",
        }
    }
}

/// Runs a query against a provisioned workspace
#[async_trait]
pub trait QueryRunner: Send + Sync {
    /// Returns the engine's structured output unchanged
    async fn execute(
        &self,
        query: &str,
        workspace: &WorkspaceLocation,
    ) -> Result<serde_json::Value, QueryError>;
}
