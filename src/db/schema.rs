// Database schema types shared by every store implementation

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;
use uuid::Uuid;

/// Key inside `Tenant::config` that holds the tenant's subdomain
pub const SUBDOMAIN_KEY: &str = "subdomain";

// ============================================================================
// Tenant
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Tenant {
    pub id: Uuid,
    pub name: String,
    /// Branding fields (brand_name, logo_url, primary_color, theme_class) plus the subdomain
    pub config: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Tenant {
    pub fn subdomain(&self) -> Option<&str> {
        self.config.get(SUBDOMAIN_KEY).and_then(|v| v.as_str())
    }
}

/// Public branding view, served without authentication
#[derive(Debug, Clone, Serialize)]
pub struct Branding {
    pub name: String,
    pub config: serde_json::Value,
}

impl From<&Tenant> for Branding {
    fn from(tenant: &Tenant) -> Self {
        Self {
            name: tenant.name.clone(),
            config: tenant.config.clone(),
        }
    }
}

// ============================================================================
// End client
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct EndClient {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub name: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// ============================================================================
// Cloud environment
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CloudProvider {
    #[serde(rename = "AWS", alias = "aws")]
    Aws,
    #[serde(rename = "GCP", alias = "gcp")]
    Gcp,
    #[serde(rename = "Azure", alias = "azure", alias = "AZURE")]
    Azure,
}

impl CloudProvider {
    pub const ALL: [CloudProvider; 3] = [CloudProvider::Aws, CloudProvider::Gcp, CloudProvider::Azure];

    /// Value stored in the database
    pub fn as_str(&self) -> &'static str {
        match self {
            CloudProvider::Aws => "AWS",
            CloudProvider::Gcp => "GCP",
            CloudProvider::Azure => "Azure",
        }
    }

    /// Key used in the workspace configuration artifact
    pub fn config_key(&self) -> &'static str {
        match self {
            CloudProvider::Aws => "aws",
            CloudProvider::Gcp => "gcp",
            CloudProvider::Azure => "azure",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "AWS" | "aws" => Some(CloudProvider::Aws),
            "GCP" | "gcp" => Some(CloudProvider::Gcp),
            "Azure" | "azure" | "AZURE" => Some(CloudProvider::Azure),
            _ => None,
        }
    }
}

impl fmt::Display for CloudProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Stored cloud environment. Not `Serialize`: responses go through
/// [`CloudEnvironmentView`], which has no credentials field. `Debug`
/// redacts the credentials.
#[derive(Clone)]
pub struct CloudEnvironment {
    pub id: Uuid,
    pub client_id: Uuid,
    pub provider: CloudProvider,
    pub credentials: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl fmt::Debug for CloudEnvironment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CloudEnvironment")
            .field("id", &self.id)
            .field("client_id", &self.client_id)
            .field("provider", &self.provider)
            .field("credentials", &"<redacted>")
            .field("created_at", &self.created_at)
            .field("updated_at", &self.updated_at)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CloudEnvironmentView {
    pub id: Uuid,
    pub client_id: Uuid,
    pub provider: CloudProvider,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&CloudEnvironment> for CloudEnvironmentView {
    fn from(env: &CloudEnvironment) -> Self {
        Self {
            id: env.id,
            client_id: env.client_id,
            provider: env.provider,
            created_at: env.created_at,
            updated_at: env.updated_at,
        }
    }
}

// ============================================================================
// Report
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Report {
    pub id: Uuid,
    pub environment_id: Uuid,
    pub title: String,
    pub report_type: String,
    pub result: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

/// Input for a new report
#[derive(Debug, Clone)]
pub struct NewReport {
    pub environment_id: Uuid,
    pub title: String,
    pub report_type: String,
    pub result: serde_json::Value,
}

// ============================================================================
// Subscription
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubscriptionStatus {
    Active,
    Inactive,
    Cancelled,
}

impl SubscriptionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionStatus::Active => "active",
            SubscriptionStatus::Inactive => "inactive",
            SubscriptionStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "active" => Some(SubscriptionStatus::Active),
            "inactive" => Some(SubscriptionStatus::Inactive),
            "cancelled" => Some(SubscriptionStatus::Cancelled),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Subscription {
    pub id: Uuid,
    pub tenant_id: Uuid,
    #[serde(skip_serializing)]
    pub provider_subscription_id: String,
    pub status: SubscriptionStatus,
    pub plan: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Values written by a subscription upsert
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionUpdate {
    pub provider_subscription_id: String,
    pub status: SubscriptionStatus,
    pub plan: String,
}

// ============================================================================
// Billing event ledger
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ProcessedBillingEvent {
    pub event_id: String,
    pub event_type: String,
    pub processed_at: DateTime<Utc>,
}

/// State change requested by a verified billing event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubscriptionChange {
    /// Upsert the tenant's subscription
    Upsert {
        tenant_id: Uuid,
        update: SubscriptionUpdate,
    },
    /// Set the status of the subscription with this provider id
    SetStatus {
        provider_subscription_id: String,
        status: SubscriptionStatus,
    },
    /// Acknowledge only
    None,
}
