use crate::db::schema::{Tenant, SUBDOMAIN_KEY};
use crate::errors::{AppError, Result};
use crate::store::InventoryStore;
use crate::tenancy::normalize_config_subdomain;
use serde_json::{Map, Value};

/// Register a tenant. The config must carry a subdomain; it is stored
/// lowercased.
#[tracing::instrument(skip(store, config))]
pub async fn create_tenant(store: &dyn InventoryStore, name: &str, config: Value) -> Result<Tenant> {
    let name = name.trim();
    if name.is_empty() {
        return Err(AppError::ValidationError("Tenant name is required".to_string()));
    }

    let mut config = match config {
        Value::Null => Value::Object(Map::new()),
        other => other,
    };
    normalize_config_subdomain(&mut config)?;

    if config.get(SUBDOMAIN_KEY).is_none() {
        return Err(AppError::ValidationError(
            "Tenant config must include a subdomain".to_string(),
        ));
    }

    let tenant = store.create_tenant(name, config).await?;
    tracing::info!(tenant_id = %tenant.id, subdomain = ?tenant.subdomain(), "Tenant created");

    Ok(tenant)
}

/// Merge `patch` into the tenant's config. Top-level keys replace existing
/// ones; a `null` value removes the key. The subdomain cannot be removed.
#[tracing::instrument(skip(store, tenant, patch), fields(tenant_id = %tenant.id))]
pub async fn update_tenant_config(
    store: &dyn InventoryStore,
    tenant: &Tenant,
    patch: Value,
) -> Result<Tenant> {
    let Value::Object(patch) = patch else {
        return Err(AppError::ValidationError(
            "Config patch must be a JSON object".to_string(),
        ));
    };

    let mut merged = match &tenant.config {
        Value::Object(existing) => existing.clone(),
        _ => Map::new(),
    };

    for (key, value) in patch {
        if value.is_null() {
            if key == SUBDOMAIN_KEY {
                return Err(AppError::ValidationError(
                    "The subdomain cannot be removed".to_string(),
                ));
            }
            merged.remove(&key);
        } else {
            merged.insert(key, value);
        }
    }

    let mut config = Value::Object(merged);
    normalize_config_subdomain(&mut config)?;

    store
        .update_tenant_config(tenant.id, config)
        .await?
        .ok_or(AppError::TenantNotFound)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryInventoryStore;
    use serde_json::json;

    #[tokio::test]
    async fn test_create_lowercases_subdomain() {
        let store = InMemoryInventoryStore::new();
        let tenant = create_tenant(&store, "Acme", json!({"subdomain": "AcMe"}))
            .await
            .unwrap();

        assert_eq!(tenant.subdomain(), Some("acme"));
        assert!(store.find_tenant_by_subdomain("acme").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_create_requires_subdomain() {
        let store = InMemoryInventoryStore::new();
        let err = create_tenant(&store, "Acme", json!({"brand_name": "Acme"}))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::ValidationError(_)));

        let err = create_tenant(&store, "  ", json!({"subdomain": "acme"}))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::ValidationError(_)));
    }

    #[tokio::test]
    async fn test_duplicate_subdomain_conflicts() {
        let store = InMemoryInventoryStore::new();
        create_tenant(&store, "Acme", json!({"subdomain": "acme"})).await.unwrap();
        let err = create_tenant(&store, "Acme 2", json!({"subdomain": "ACME"}))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_patch_merges_and_keeps_subdomain() {
        let store = InMemoryInventoryStore::new();
        let tenant = create_tenant(
            &store,
            "Acme",
            json!({"subdomain": "acme", "brand_name": "Acme", "logo_url": "https://x/logo.png"}),
        )
        .await
        .unwrap();

        let updated = update_tenant_config(
            &store,
            &tenant,
            json!({"primary_color": "#112233", "logo_url": null}),
        )
        .await
        .unwrap();

        assert_eq!(
            updated.config,
            json!({"subdomain": "acme", "brand_name": "Acme", "primary_color": "#112233"})
        );

        let err = update_tenant_config(&store, &updated, json!({"subdomain": null}))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::ValidationError(_)));
    }
}
