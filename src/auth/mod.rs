// Request authentication for tenant users and operators

pub mod jwt;
pub mod middleware;

pub use jwt::{JwtClaims, TokenVerifier};
pub use middleware::{require_admin_key, require_tenant_token, Principal};
