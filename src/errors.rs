use crate::billing::BillingError;
use crate::query::QueryError;
use crate::workspace::WorkspaceError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use std::fmt;

/// Application-wide error type
#[derive(Debug)]
pub enum AppError {
    // Database errors
    Database(sqlx::Error),
    DatabaseMigration(sqlx::migrate::MigrateError),

    // Tenant isolation
    TenantNotFound,

    // Authentication errors
    Unauthorized,
    TokenValidation(String),
    TokenExpired,
    TenantMismatch,

    // Entity lookups
    NotFound(&'static str),
    Conflict(String),

    // Workspace errors
    WorkspaceProvision(String),
    WorkspaceNotFound(String),

    // Query engine errors
    ProcessExecution {
        exit_code: Option<i32>,
        diagnostics: String,
    },
    ProcessTimeout {
        seconds: u64,
        diagnostics: String,
    },
    OutputParse(String),

    // Report export
    UnprocessableExport(String),

    // Billing errors
    BillingSignature,
    InvalidBillingPayload(String),
    BillingGateway(String),

    // Validation errors
    ValidationError(String),

    // Configuration errors
    Configuration(String),

    // Internal errors
    Internal(String),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Database(e) => write!(f, "Database error: {}", e),
            AppError::DatabaseMigration(e) => write!(f, "Database migration error: {}", e),
            AppError::TenantNotFound => write!(f, "Invalid tenant"),
            AppError::Unauthorized => write!(f, "Unauthorized"),
            AppError::TokenValidation(msg) => write!(f, "Token validation failed: {}", msg),
            AppError::TokenExpired => write!(f, "Token has expired"),
            AppError::TenantMismatch => write!(f, "Token was issued for another tenant"),
            AppError::NotFound(entity) => write!(f, "{} not found", entity),
            AppError::Conflict(msg) => write!(f, "Conflict: {}", msg),
            AppError::WorkspaceProvision(msg) => write!(f, "Workspace provisioning failed: {}", msg),
            AppError::WorkspaceNotFound(_) => write!(
                f,
                "Workspace not provisioned; create a cloud environment first"
            ),
            AppError::ProcessExecution {
                exit_code,
                diagnostics,
            } => match exit_code {
                Some(code) => write!(f, "Query engine exited with status {}: {}", code, diagnostics),
                None => write!(f, "Query engine failed: {}", diagnostics),
            },
            AppError::ProcessTimeout { seconds, .. } => {
                write!(f, "Query engine timed out after {}s", seconds)
            }
            AppError::OutputParse(msg) => write!(f, "Query engine returned invalid JSON: {}", msg),
            AppError::UnprocessableExport(msg) => write!(f, "Report cannot be exported: {}", msg),
            AppError::BillingSignature => write!(f, "Invalid signature"),
            AppError::InvalidBillingPayload(msg) => write!(f, "Invalid billing event: {}", msg),
            AppError::BillingGateway(msg) => write!(f, "Billing gateway error: {}", msg),
            AppError::ValidationError(msg) => write!(f, "Validation error: {}", msg),
            AppError::Configuration(msg) => write!(f, "Configuration error: {}", msg),
            AppError::Internal(msg) => write!(f, "Internal error: {}", msg),
        }
    }
}

impl std::error::Error for AppError {}

// Convert from various error types
impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        AppError::Database(err)
    }
}

impl From<sqlx::migrate::MigrateError> for AppError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        AppError::DatabaseMigration(err)
    }
}

impl From<jsonwebtoken::errors::Error> for AppError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        use jsonwebtoken::errors::ErrorKind;
        match err.kind() {
            ErrorKind::ExpiredSignature => AppError::TokenExpired,
            ErrorKind::InvalidToken => AppError::TokenValidation("Invalid token".to_string()),
            _ => AppError::TokenValidation(err.to_string()),
        }
    }
}

impl From<WorkspaceError> for AppError {
    fn from(err: WorkspaceError) -> Self {
        match err {
            WorkspaceError::NotFound { path } => AppError::WorkspaceNotFound(path.display().to_string()),
            other => AppError::WorkspaceProvision(other.to_string()),
        }
    }
}

impl From<QueryError> for AppError {
    fn from(err: QueryError) -> Self {
        match err {
            QueryError::WorkspaceNotFound { path } => {
                AppError::WorkspaceNotFound(path.display().to_string())
            }
            QueryError::EmptyQuery => AppError::ValidationError("Query is required".to_string()),
            QueryError::ProcessExecution {
                diagnostics,
                timeout: Some(limit),
                ..
            } => AppError::ProcessTimeout {
                seconds: limit.as_secs(),
                diagnostics,
            },
            QueryError::ProcessExecution {
                exit_code,
                diagnostics,
                timeout: None,
            } => AppError::ProcessExecution {
                exit_code,
                diagnostics,
            },
            QueryError::OutputParse(e) => AppError::OutputParse(e.to_string()),
        }
    }
}

impl From<BillingError> for AppError {
    fn from(err: BillingError) -> Self {
        match err {
            BillingError::Signature(reason) => {
                tracing::warn!(reason = %reason, "Billing signature rejected");
                AppError::BillingSignature
            }
            BillingError::Payload(msg) => AppError::InvalidBillingPayload(msg),
            BillingError::Gateway(msg) => AppError::BillingGateway(msg),
            BillingError::Store(e) => e,
        }
    }
}

impl AppError {
    /// HTTP status for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Database(_)
            | AppError::DatabaseMigration(_)
            | AppError::WorkspaceProvision(_)
            | AppError::Configuration(_)
            | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::TenantNotFound | AppError::TenantMismatch => StatusCode::FORBIDDEN,
            AppError::Unauthorized | AppError::TokenValidation(_) | AppError::TokenExpired => {
                StatusCode::UNAUTHORIZED
            }
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict(_) | AppError::WorkspaceNotFound(_) => StatusCode::CONFLICT,
            AppError::ProcessExecution { .. }
            | AppError::OutputParse(_)
            | AppError::BillingGateway(_) => StatusCode::BAD_GATEWAY,
            AppError::ProcessTimeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            AppError::UnprocessableExport(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::BillingSignature
            | AppError::InvalidBillingPayload(_)
            | AppError::ValidationError(_) => StatusCode::BAD_REQUEST,
        }
    }
}

// Implement IntoResponse for Axum
impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        let error_message = match &self {
            AppError::Database(_) | AppError::DatabaseMigration(_) => {
                tracing::error!("Database error: {:?}", self);
                "Internal server error".to_string()
            }
            AppError::WorkspaceProvision(_) => {
                tracing::error!("Workspace error: {}", self);
                "Workspace provisioning failed".to_string()
            }
            AppError::WorkspaceNotFound(path) => {
                tracing::warn!(path = %path, "Workspace missing");
                self.to_string()
            }
            AppError::BillingGateway(_) => {
                tracing::error!("Billing gateway error: {}", self);
                "Billing gateway unavailable".to_string()
            }
            AppError::Configuration(_) | AppError::Internal(_) => {
                tracing::error!("Internal error: {:?}", self);
                "Internal server error".to_string()
            }
            AppError::Unauthorized | AppError::TokenValidation(_) => "Unauthorized".to_string(),
            AppError::ProcessExecution { .. }
            | AppError::ProcessTimeout { .. }
            | AppError::OutputParse(_) => {
                tracing::warn!("Query execution failed: {}", self);
                self.to_string()
            }
            _ => self.to_string(),
        };

        let body = Json(json!({
            "error": error_message,
            "status": status.as_u16(),
        }));

        (status, body).into_response()
    }
}

/// Result type alias for the application
pub type Result<T> = std::result::Result<T, AppError>;
