// Persistence seam for tenant-owned records

pub mod memory;
pub mod postgres;

pub use memory::InMemoryInventoryStore;
pub use postgres::PgInventoryStore;

use crate::db::schema::{
    CloudEnvironment, CloudProvider, EndClient, NewReport, Report, Subscription,
    SubscriptionChange, Tenant,
};
use crate::errors::Result;
use async_trait::async_trait;
use uuid::Uuid;

/// Result of recording a billing event in the processed-event ledger
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LedgerEntry {
    /// Event id was already recorded; nothing changed
    Duplicate,
    /// Newly recorded; `rows_changed` subscription rows were written
    Recorded { rows_changed: u64 },
}

/// Storage for the Tenant → EndClient → CloudEnvironment → Report chain.
///
/// Every tenant-owned lookup takes the tenant id and filters through the
/// ownership chain, so a record that belongs to another tenant is
/// indistinguishable from a missing one.
#[async_trait]
pub trait InventoryStore: Send + Sync {
    async fn health_check(&self) -> Result<()>;

    // Tenants
    async fn create_tenant(&self, name: &str, config: serde_json::Value) -> Result<Tenant>;
    async fn list_tenants(&self) -> Result<Vec<Tenant>>;
    async fn get_tenant(&self, tenant_id: Uuid) -> Result<Option<Tenant>>;
    /// `subdomain` must already be normalized (lowercase, no port)
    async fn find_tenant_by_subdomain(&self, subdomain: &str) -> Result<Option<Tenant>>;
    async fn update_tenant_config(
        &self,
        tenant_id: Uuid,
        config: serde_json::Value,
    ) -> Result<Option<Tenant>>;

    // End clients
    async fn create_client(&self, tenant_id: Uuid, name: &str) -> Result<EndClient>;
    async fn list_clients(&self, tenant_id: Uuid) -> Result<Vec<EndClient>>;
    async fn get_client(&self, tenant_id: Uuid, client_id: Uuid) -> Result<Option<EndClient>>;
    async fn rename_client(
        &self,
        tenant_id: Uuid,
        client_id: Uuid,
        name: &str,
    ) -> Result<Option<EndClient>>;
    async fn toggle_client_active(
        &self,
        tenant_id: Uuid,
        client_id: Uuid,
    ) -> Result<Option<EndClient>>;

    // Cloud environments
    /// Fails with `NotFound` when the client is not owned by the tenant
    async fn create_environment(
        &self,
        tenant_id: Uuid,
        client_id: Uuid,
        provider: CloudProvider,
        credentials: serde_json::Value,
    ) -> Result<CloudEnvironment>;
    async fn list_environments(&self, tenant_id: Uuid) -> Result<Vec<CloudEnvironment>>;
    async fn get_environment(
        &self,
        tenant_id: Uuid,
        environment_id: Uuid,
    ) -> Result<Option<CloudEnvironment>>;
    async fn delete_environment(&self, tenant_id: Uuid, environment_id: Uuid) -> Result<bool>;

    // Reports
    /// Fails with `NotFound` when the environment is not owned by the tenant
    async fn create_report(&self, tenant_id: Uuid, report: NewReport) -> Result<Report>;
    async fn list_reports(&self, tenant_id: Uuid) -> Result<Vec<Report>>;
    async fn get_report(&self, tenant_id: Uuid, report_id: Uuid) -> Result<Option<Report>>;
    async fn delete_report(&self, tenant_id: Uuid, report_id: Uuid) -> Result<bool>;

    // Subscriptions
    async fn list_subscriptions(&self, tenant_id: Uuid) -> Result<Vec<Subscription>>;

    /// Record `event_id` in the processed-event ledger and apply `change`
    /// as one unit. Changes nothing when the event id was already recorded.
    async fn apply_billing_event(
        &self,
        event_id: &str,
        event_type: &str,
        change: SubscriptionChange,
    ) -> Result<LedgerEntry>;
}
