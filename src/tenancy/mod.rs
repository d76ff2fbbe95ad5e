// Host-based tenant identification

pub mod middleware;

pub use middleware::resolve_tenant;

use crate::db::schema::{Tenant, SUBDOMAIN_KEY};
use crate::errors::{AppError, Result};
use crate::observability::MetricsRecorder;
use crate::store::InventoryStore;
use axum::{async_trait, extract::FromRequestParts, http::request::Parts};
use serde_json::Value;

/// The tenant a request was resolved to.
///
/// Inserted into request extensions by [`resolve_tenant`]; handlers take it
/// as an extractor. Extraction fails with `TenantNotFound` when absent.
#[derive(Debug, Clone)]
pub struct TenantContext {
    pub tenant: Tenant,
}

#[async_trait]
impl<S> FromRequestParts<S> for TenantContext
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self> {
        parts
            .extensions
            .get::<TenantContext>()
            .cloned()
            .ok_or(AppError::TenantNotFound)
    }
}

/// Outcome of looking up a request host
#[derive(Debug, Clone)]
pub enum Resolution {
    Resolved(Tenant),
    /// Well-formed host whose subdomain matches no tenant
    Unknown(String),
    Malformed,
}

impl Resolution {
    pub fn label(&self) -> &'static str {
        match self {
            Resolution::Resolved(_) => "resolved",
            Resolution::Unknown(_) => "unknown",
            Resolution::Malformed => "malformed",
        }
    }
}

/// Left-most label of a host, normalized.
///
/// Trims whitespace, strips a port and a trailing dot, lowercases. Returns
/// `None` for empty hosts, hosts without a dot, bracketed IPv6 literals and
/// hosts with an empty label.
pub fn subdomain_from_host(host: &str) -> Option<String> {
    let host = host.trim();
    if host.is_empty() || host.starts_with('[') {
        return None;
    }

    let host = match host.rsplit_once(':') {
        Some((name, port)) if port.chars().all(|c| c.is_ascii_digit()) => name,
        Some(_) => return None,
        None => host,
    };
    if host.contains(':') {
        return None;
    }

    let host = host.strip_suffix('.').unwrap_or(host).to_ascii_lowercase();
    if !host.contains('.') || host.split('.').any(str::is_empty) {
        return None;
    }

    host.split('.').next().map(str::to_string)
}

/// Resolve a request host to a tenant through the store
pub async fn resolve_host(store: &dyn InventoryStore, host: Option<&str>) -> Result<Resolution> {
    let resolution = match host.and_then(subdomain_from_host) {
        None => Resolution::Malformed,
        Some(subdomain) => match store.find_tenant_by_subdomain(&subdomain).await? {
            Some(tenant) => Resolution::Resolved(tenant),
            None => Resolution::Unknown(subdomain),
        },
    };
    MetricsRecorder::record_tenant_resolution(resolution.label());

    Ok(resolution)
}

/// Canonical form of a subdomain supplied on write: trimmed, lowercase,
/// a single DNS label.
pub fn normalize_subdomain(raw: &str) -> Result<String> {
    let subdomain = raw.trim().to_ascii_lowercase();

    let valid_label = !subdomain.is_empty()
        && subdomain.len() <= 63
        && !subdomain.starts_with('-')
        && !subdomain.ends_with('-')
        && subdomain
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-');

    if valid_label {
        Ok(subdomain)
    } else {
        Err(AppError::ValidationError(format!(
            "'{}' is not a valid subdomain",
            raw
        )))
    }
}

/// Normalize the subdomain inside a tenant config object, in place.
/// A config without a subdomain is left unchanged.
pub fn normalize_config_subdomain(config: &mut Value) -> Result<()> {
    let Some(object) = config.as_object_mut() else {
        return Err(AppError::ValidationError(
            "Tenant config must be a JSON object".to_string(),
        ));
    };

    match object.get(SUBDOMAIN_KEY) {
        None => Ok(()),
        Some(Value::String(raw)) => {
            let normalized = normalize_subdomain(raw)?;
            object.insert(SUBDOMAIN_KEY.to_string(), Value::String(normalized));
            Ok(())
        }
        Some(_) => Err(AppError::ValidationError(
            "subdomain must be a string".to_string(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryInventoryStore;
    use serde_json::json;

    #[test]
    fn test_subdomain_extraction() {
        assert_eq!(subdomain_from_host("acme.example.com"), Some("acme".to_string()));
        assert_eq!(subdomain_from_host("ACME.Example.com"), Some("acme".to_string()));
        assert_eq!(subdomain_from_host("acme.example.com:8080"), Some("acme".to_string()));
        assert_eq!(subdomain_from_host(" acme.example.com. "), Some("acme".to_string()));
        assert_eq!(subdomain_from_host("acme.localhost:3000"), Some("acme".to_string()));
    }

    #[test]
    fn test_malformed_hosts() {
        for host in [
            "",
            "   ",
            "localhost",
            "localhost:8080",
            "[::1]:8080",
            "::1",
            ".example.com",
            "acme..com",
            "acme.example.com:http",
        ] {
            assert_eq!(subdomain_from_host(host), None, "{:?}", host);
        }
    }

    #[test]
    fn test_normalize_subdomain() {
        assert_eq!(normalize_subdomain("  Acme ").unwrap(), "acme");
        assert_eq!(normalize_subdomain("acme-eu-2").unwrap(), "acme-eu-2");
        for bad in ["", "acme.corp", "-acme", "acme_1", "ac me"] {
            assert!(normalize_subdomain(bad).is_err(), "{:?}", bad);
        }
    }

    #[test]
    fn test_normalize_config_subdomain() {
        let mut config = json!({"subdomain": "ACME", "brand_name": "Acme"});
        normalize_config_subdomain(&mut config).unwrap();
        assert_eq!(config["subdomain"], "acme");
        assert_eq!(config["brand_name"], "Acme");

        assert!(normalize_config_subdomain(&mut json!({"subdomain": 7})).is_err());
        assert!(normalize_config_subdomain(&mut json!(["acme"])).is_err());
    }

    #[tokio::test]
    async fn test_resolve_host() {
        let store = InMemoryInventoryStore::new();
        let tenant = store
            .create_tenant("Acme", json!({"subdomain": "acme"}))
            .await
            .unwrap();

        match resolve_host(&store, Some("Acme.app.example.com:443")).await.unwrap() {
            Resolution::Resolved(found) => assert_eq!(found.id, tenant.id),
            other => panic!("unexpected resolution: {:?}", other),
        }

        assert!(matches!(
            resolve_host(&store, Some("globex.app.example.com")).await.unwrap(),
            Resolution::Unknown(subdomain) if subdomain == "globex"
        ));
        assert!(matches!(
            resolve_host(&store, Some("localhost")).await.unwrap(),
            Resolution::Malformed
        ));
        assert!(matches!(
            resolve_host(&store, None).await.unwrap(),
            Resolution::Malformed
        ));
    }
}
