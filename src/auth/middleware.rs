use crate::{
    api::routes::AppState,
    billing::signature::constant_time_compare,
    errors::{AppError, Result},
    tenancy::TenantContext,
};
use axum::{
    async_trait,
    extract::{FromRequestParts, Request, State},
    http::{header::AUTHORIZATION, request::Parts, HeaderMap},
    middleware::Next,
    response::Response,
};

/// Authenticated tenant user, set by [`require_tenant_token`].
/// Handlers that act on the user's behalf take it to attribute the action.
#[derive(Debug, Clone)]
pub struct Principal {
    pub subject: String,
}

#[async_trait]
impl<S> FromRequestParts<S> for Principal
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self> {
        parts
            .extensions
            .get::<Principal>()
            .cloned()
            .ok_or(AppError::Unauthorized)
    }
}

fn bearer_token(headers: &HeaderMap) -> Result<&str> {
    let auth_header = headers
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .ok_or(AppError::Unauthorized)?;

    auth_header
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .ok_or(AppError::Unauthorized)
}

/// Requires a valid access token issued for the resolved tenant.
/// Must run after tenant resolution.
pub async fn require_tenant_token(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response> {
    let tenant_id = request
        .extensions()
        .get::<TenantContext>()
        .map(|ctx| ctx.tenant.id)
        .ok_or(AppError::TenantNotFound)?;

    let claims = state.token_verifier.verify(bearer_token(request.headers())?)?;

    if claims.tenant_id_uuid()? != tenant_id {
        tracing::warn!(
            tenant_id = %tenant_id,
            token_tenant = %claims.tenant_id,
            "Token presented for another tenant"
        );
        return Err(AppError::TenantMismatch);
    }

    request
        .extensions_mut()
        .insert(Principal { subject: claims.sub });

    Ok(next.run(request).await)
}

/// Requires the operator API key as a bearer token
pub async fn require_admin_key(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response> {
    let presented = bearer_token(request.headers())?;

    if !constant_time_compare(presented, &state.config.admin.api_key) {
        tracing::warn!(path = %request.uri().path(), "Admin key rejected");
        return Err(AppError::Unauthorized);
    }

    Ok(next.run(request).await)
}
