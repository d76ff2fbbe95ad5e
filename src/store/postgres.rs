// PostgreSQL implementation of the inventory store

use super::{InventoryStore, LedgerEntry};
use crate::db::schema::{
    CloudEnvironment, CloudProvider, EndClient, NewReport, Report, Subscription,
    SubscriptionChange, SubscriptionStatus, Tenant,
};
use crate::errors::{AppError, Result};
use async_trait::async_trait;
use sqlx::{postgres::PgRow, PgPool, Row};
use uuid::Uuid;

const ENVIRONMENT_COLUMNS: &str =
    "e.id, e.client_id, e.provider, e.credentials, e.created_at, e.updated_at";

const REPORT_COLUMNS: &str =
    "r.id, r.environment_id, r.title, r.report_type, r.result, r.created_at";

pub struct PgInventoryStore {
    pool: PgPool,
}

impl PgInventoryStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn environment_from_row(row: &PgRow) -> Result<CloudEnvironment> {
    let provider: String = row.try_get("provider")?;
    let provider = CloudProvider::parse(&provider)
        .ok_or_else(|| AppError::Internal(format!("Unknown cloud provider in database: {}", provider)))?;

    Ok(CloudEnvironment {
        id: row.try_get("id")?,
        client_id: row.try_get("client_id")?,
        provider,
        credentials: row.try_get("credentials")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn subscription_from_row(row: &PgRow) -> Result<Subscription> {
    let status: String = row.try_get("status")?;
    let status = SubscriptionStatus::parse(&status)
        .ok_or_else(|| AppError::Internal(format!("Unknown subscription status in database: {}", status)))?;

    Ok(Subscription {
        id: row.try_get("id")?,
        tenant_id: row.try_get("tenant_id")?,
        provider_subscription_id: row.try_get("provider_subscription_id")?,
        status,
        plan: row.try_get("plan")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn map_unique_violation(err: sqlx::Error, message: &str) -> AppError {
    match &err {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            AppError::Conflict(message.to_string())
        }
        _ => AppError::Database(err),
    }
}

#[async_trait]
impl InventoryStore for PgInventoryStore {
    async fn health_check(&self) -> Result<()> {
        crate::db::health_check(&self.pool).await
    }

    async fn create_tenant(&self, name: &str, config: serde_json::Value) -> Result<Tenant> {
        let tenant = sqlx::query_as::<_, Tenant>(
            r#"
            INSERT INTO tenants (id, name, config)
            VALUES ($1, $2, $3)
            RETURNING id, name, config, created_at, updated_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(name)
        .bind(&config)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| map_unique_violation(e, "subdomain already in use"))?;

        Ok(tenant)
    }

    async fn list_tenants(&self) -> Result<Vec<Tenant>> {
        let tenants = sqlx::query_as::<_, Tenant>(
            "SELECT id, name, config, created_at, updated_at FROM tenants ORDER BY created_at",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(tenants)
    }

    async fn get_tenant(&self, tenant_id: Uuid) -> Result<Option<Tenant>> {
        let tenant = sqlx::query_as::<_, Tenant>(
            "SELECT id, name, config, created_at, updated_at FROM tenants WHERE id = $1",
        )
        .bind(tenant_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(tenant)
    }

    async fn find_tenant_by_subdomain(&self, subdomain: &str) -> Result<Option<Tenant>> {
        let tenant = sqlx::query_as::<_, Tenant>(
            r#"
            SELECT id, name, config, created_at, updated_at
            FROM tenants
            WHERE config->>'subdomain' = $1
            "#,
        )
        .bind(subdomain)
        .fetch_optional(&self.pool)
        .await?;

        Ok(tenant)
    }

    async fn update_tenant_config(
        &self,
        tenant_id: Uuid,
        config: serde_json::Value,
    ) -> Result<Option<Tenant>> {
        let tenant = sqlx::query_as::<_, Tenant>(
            r#"
            UPDATE tenants
            SET config = $2, updated_at = NOW()
            WHERE id = $1
            RETURNING id, name, config, created_at, updated_at
            "#,
        )
        .bind(tenant_id)
        .bind(&config)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_unique_violation(e, "subdomain already in use"))?;

        Ok(tenant)
    }

    async fn create_client(&self, tenant_id: Uuid, name: &str) -> Result<EndClient> {
        let client = sqlx::query_as::<_, EndClient>(
            r#"
            INSERT INTO end_clients (id, tenant_id, name)
            VALUES ($1, $2, $3)
            RETURNING id, tenant_id, name, is_active, created_at, updated_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(tenant_id)
        .bind(name)
        .fetch_one(&self.pool)
        .await?;

        Ok(client)
    }

    async fn list_clients(&self, tenant_id: Uuid) -> Result<Vec<EndClient>> {
        let clients = sqlx::query_as::<_, EndClient>(
            r#"
            SELECT id, tenant_id, name, is_active, created_at, updated_at
            FROM end_clients
            WHERE tenant_id = $1
            ORDER BY created_at
            "#,
        )
        .bind(tenant_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(clients)
    }

    async fn get_client(&self, tenant_id: Uuid, client_id: Uuid) -> Result<Option<EndClient>> {
        let client = sqlx::query_as::<_, EndClient>(
            r#"
            SELECT id, tenant_id, name, is_active, created_at, updated_at
            FROM end_clients
            WHERE id = $1 AND tenant_id = $2
            "#,
        )
        .bind(client_id)
        .bind(tenant_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(client)
    }

    async fn rename_client(
        &self,
        tenant_id: Uuid,
        client_id: Uuid,
        name: &str,
    ) -> Result<Option<EndClient>> {
        let client = sqlx::query_as::<_, EndClient>(
            r#"
            UPDATE end_clients
            SET name = $3, updated_at = NOW()
            WHERE id = $1 AND tenant_id = $2
            RETURNING id, tenant_id, name, is_active, created_at, updated_at
            "#,
        )
        .bind(client_id)
        .bind(tenant_id)
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;

        Ok(client)
    }

    async fn toggle_client_active(
        &self,
        tenant_id: Uuid,
        client_id: Uuid,
    ) -> Result<Option<EndClient>> {
        let client = sqlx::query_as::<_, EndClient>(
            r#"
            UPDATE end_clients
            SET is_active = NOT is_active, updated_at = NOW()
            WHERE id = $1 AND tenant_id = $2
            RETURNING id, tenant_id, name, is_active, created_at, updated_at
            "#,
        )
        .bind(client_id)
        .bind(tenant_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(client)
    }

    async fn create_environment(
        &self,
        tenant_id: Uuid,
        client_id: Uuid,
        provider: CloudProvider,
        credentials: serde_json::Value,
    ) -> Result<CloudEnvironment> {
        // The SELECT only yields a row when the client belongs to the tenant
        let row = sqlx::query(
            r#"
            INSERT INTO cloud_environments (id, client_id, provider, credentials)
            SELECT $1, c.id, $3, $4
            FROM end_clients c
            WHERE c.id = $2 AND c.tenant_id = $5
            RETURNING id, client_id, provider, credentials, created_at, updated_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(client_id)
        .bind(provider.as_str())
        .bind(&credentials)
        .bind(tenant_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(AppError::NotFound("Client"))?;

        environment_from_row(&row)
    }

    async fn list_environments(&self, tenant_id: Uuid) -> Result<Vec<CloudEnvironment>> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {ENVIRONMENT_COLUMNS}
            FROM cloud_environments e
            JOIN end_clients c ON c.id = e.client_id
            WHERE c.tenant_id = $1
            ORDER BY e.created_at
            "#
        ))
        .bind(tenant_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(environment_from_row).collect()
    }

    async fn get_environment(
        &self,
        tenant_id: Uuid,
        environment_id: Uuid,
    ) -> Result<Option<CloudEnvironment>> {
        let row = sqlx::query(&format!(
            r#"
            SELECT {ENVIRONMENT_COLUMNS}
            FROM cloud_environments e
            JOIN end_clients c ON c.id = e.client_id
            WHERE e.id = $1 AND c.tenant_id = $2
            "#
        ))
        .bind(environment_id)
        .bind(tenant_id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(environment_from_row).transpose()
    }

    async fn delete_environment(&self, tenant_id: Uuid, environment_id: Uuid) -> Result<bool> {
        let result = sqlx::query(
            r#"
            DELETE FROM cloud_environments e
            USING end_clients c
            WHERE e.id = $1 AND c.id = e.client_id AND c.tenant_id = $2
            "#,
        )
        .bind(environment_id)
        .bind(tenant_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn create_report(&self, tenant_id: Uuid, report: NewReport) -> Result<Report> {
        let created = sqlx::query_as::<_, Report>(
            r#"
            INSERT INTO reports (id, environment_id, title, report_type, result)
            SELECT $1, e.id, $3, $4, $5::json
            FROM cloud_environments e
            JOIN end_clients c ON c.id = e.client_id
            WHERE e.id = $2 AND c.tenant_id = $6
            RETURNING id, environment_id, title, report_type, result, created_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(report.environment_id)
        .bind(&report.title)
        .bind(&report.report_type)
        // Sent as text so the engine's key order survives
        .bind(report.result.to_string())
        .bind(tenant_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(AppError::NotFound("Environment"))?;

        Ok(created)
    }

    async fn list_reports(&self, tenant_id: Uuid) -> Result<Vec<Report>> {
        let reports = sqlx::query_as::<_, Report>(&format!(
            r#"
            SELECT {REPORT_COLUMNS}
            FROM reports r
            JOIN cloud_environments e ON e.id = r.environment_id
            JOIN end_clients c ON c.id = e.client_id
            WHERE c.tenant_id = $1
            ORDER BY r.created_at DESC
            "#
        ))
        .bind(tenant_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(reports)
    }

    async fn get_report(&self, tenant_id: Uuid, report_id: Uuid) -> Result<Option<Report>> {
        let report = sqlx::query_as::<_, Report>(&format!(
            r#"
            SELECT {REPORT_COLUMNS}
            FROM reports r
            JOIN cloud_environments e ON e.id = r.environment_id
            JOIN end_clients c ON c.id = e.client_id
            WHERE r.id = $1 AND c.tenant_id = $2
            "#
        ))
        .bind(report_id)
        .bind(tenant_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(report)
    }

    async fn delete_report(&self, tenant_id: Uuid, report_id: Uuid) -> Result<bool> {
        let result = sqlx::query(
            r#"
            DELETE FROM reports r
            USING cloud_environments e, end_clients c
            WHERE r.id = $1
              AND e.id = r.environment_id
              AND c.id = e.client_id
              AND c.tenant_id = $2
            "#,
        )
        .bind(report_id)
        .bind(tenant_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn list_subscriptions(&self, tenant_id: Uuid) -> Result<Vec<Subscription>> {
        let rows = sqlx::query(
            r#"
            SELECT id, tenant_id, provider_subscription_id, status, plan, created_at, updated_at
            FROM subscriptions
            WHERE tenant_id = $1
            "#,
        )
        .bind(tenant_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(subscription_from_row).collect()
    }

    async fn apply_billing_event(
        &self,
        event_id: &str,
        event_type: &str,
        change: SubscriptionChange,
    ) -> Result<LedgerEntry> {
        let mut tx = self.pool.begin().await?;

        let recorded = sqlx::query(
            r#"
            INSERT INTO processed_billing_events (event_id, event_type)
            VALUES ($1, $2)
            ON CONFLICT (event_id) DO NOTHING
            "#,
        )
        .bind(event_id)
        .bind(event_type)
        .execute(&mut *tx)
        .await?;

        if recorded.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(LedgerEntry::Duplicate);
        }

        let rows_changed = match change {
            SubscriptionChange::Upsert { tenant_id, update } => sqlx::query(
                r#"
                INSERT INTO subscriptions (id, tenant_id, provider_subscription_id, status, plan)
                VALUES ($1, $2, $3, $4, $5)
                ON CONFLICT (tenant_id) DO UPDATE
                SET provider_subscription_id = EXCLUDED.provider_subscription_id,
                    status = EXCLUDED.status,
                    plan = EXCLUDED.plan,
                    updated_at = NOW()
                "#,
            )
            .bind(Uuid::new_v4())
            .bind(tenant_id)
            .bind(&update.provider_subscription_id)
            .bind(update.status.as_str())
            .bind(&update.plan)
            .execute(&mut *tx)
            .await?
            .rows_affected(),
            SubscriptionChange::SetStatus {
                provider_subscription_id,
                status,
            } => sqlx::query(
                r#"
                UPDATE subscriptions
                SET status = $2, updated_at = NOW()
                WHERE provider_subscription_id = $1
                "#,
            )
            .bind(&provider_subscription_id)
            .bind(status.as_str())
            .execute(&mut *tx)
            .await?
            .rows_affected(),
            SubscriptionChange::None => 0,
        };

        tx.commit().await?;

        Ok(LedgerEntry::Recorded { rows_changed })
    }
}
