use super::BillingError;
use crate::config::BillingConfig;
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use uuid::Uuid;

/// Checkout session parameters for one tenant
#[derive(Debug, Clone)]
pub struct CheckoutRequest {
    pub tenant_id: Uuid,
    pub price_id: String,
    pub success_url: String,
    pub cancel_url: String,
}

/// Outbound calls to the billing provider
#[async_trait]
pub trait BillingGateway: Send + Sync {
    /// Returns the provider's session id
    async fn create_checkout_session(&self, request: CheckoutRequest) -> Result<String, BillingError>;
}

#[derive(Debug, Deserialize)]
struct SessionResponse {
    id: String,
}

/// Form-encoded REST client for the provider's checkout API
pub struct HttpBillingGateway {
    client: Client,
    base_url: String,
    api_key: String,
}

impl HttpBillingGateway {
    pub fn new(config: &BillingConfig) -> Result<Self, BillingError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| BillingError::Gateway(e.to_string()))?;

        Ok(Self {
            client,
            base_url: config.api_base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
        })
    }
}

#[async_trait]
impl BillingGateway for HttpBillingGateway {
    #[tracing::instrument(skip(self, request), fields(tenant_id = %request.tenant_id))]
    async fn create_checkout_session(&self, request: CheckoutRequest) -> Result<String, BillingError> {
        let tenant_id = request.tenant_id.to_string();
        let form = [
            ("mode", "subscription"),
            ("line_items[0][price]", request.price_id.as_str()),
            ("line_items[0][quantity]", "1"),
            ("success_url", request.success_url.as_str()),
            ("cancel_url", request.cancel_url.as_str()),
            ("client_reference_id", tenant_id.as_str()),
        ];

        let response = self
            .client
            .post(format!("{}/v1/checkout/sessions", self.base_url))
            .bearer_auth(&self.api_key)
            .form(&form)
            .send()
            .await
            .map_err(|e| BillingError::Gateway(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(BillingError::Gateway(format!(
                "checkout session request returned {}: {}",
                status, body
            )));
        }

        let session: SessionResponse = response
            .json()
            .await
            .map_err(|e| BillingError::Gateway(e.to_string()))?;

        tracing::info!(session_id = %session.id, "Checkout session created");
        Ok(session.id)
    }
}
