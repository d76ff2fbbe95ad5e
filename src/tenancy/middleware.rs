use super::{resolve_host, Resolution, TenantContext};
use crate::{
    api::routes::AppState,
    errors::{AppError, Result},
};
use axum::{
    extract::{Request, State},
    http::header::HOST,
    middleware::Next,
    response::Response,
};

fn request_host(request: &Request) -> Option<String> {
    request
        .headers()
        .get(HOST)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .or_else(|| request.uri().authority().map(|a| a.as_str().to_string()))
}

fn has_prefix(path: &str, prefixes: &[String]) -> bool {
    prefixes.iter().any(|prefix| path.starts_with(prefix.as_str()))
}

/// Tenant resolution middleware.
///
/// Bypass paths pass through untouched. Everything else is resolved from the
/// host; on failure public paths continue without a tenant and all other
/// paths are denied with the same `TenantNotFound` regardless of cause.
pub async fn resolve_tenant(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response> {
    let path = request.uri().path().to_string();
    let tenancy = &state.config.tenancy;

    if has_prefix(&path, &tenancy.bypass_prefixes) {
        return Ok(next.run(request).await);
    }

    let host = request_host(&request);
    let resolution = resolve_host(state.store.as_ref(), host.as_deref()).await?;

    match resolution {
        Resolution::Resolved(tenant) => {
            tracing::info!(
                tenant_id = %tenant.id,
                tenant = %tenant.name,
                path = %path,
                "Tenant identified"
            );
            request.extensions_mut().insert(TenantContext { tenant });
            Ok(next.run(request).await)
        }
        failed => {
            let subdomain = match &failed {
                Resolution::Unknown(subdomain) => subdomain.as_str(),
                _ => "",
            };
            tracing::warn!(
                host = host.as_deref().unwrap_or(""),
                subdomain,
                reason = failed.label(),
                path = %path,
                "Tenant not identified"
            );

            if has_prefix(&path, &tenancy.public_prefixes) {
                Ok(next.run(request).await)
            } else {
                Err(AppError::TenantNotFound)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prefix_matching() {
        let prefixes = vec!["/admin/".to_string(), "/metrics".to_string()];
        assert!(has_prefix("/admin/tenants", &prefixes));
        assert!(has_prefix("/metrics", &prefixes));
        assert!(!has_prefix("/api/v1/clients", &prefixes));
        assert!(!has_prefix("/administrator", &prefixes));
    }
}
