use super::{BillingError, SignatureVerifier};
use crate::db::schema::{SubscriptionChange, SubscriptionStatus, SubscriptionUpdate};
use crate::observability::MetricsRecorder;
use crate::store::{InventoryStore, LedgerEntry};
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use uuid::Uuid;

pub const CHECKOUT_COMPLETED: &str = "checkout.session.completed";
pub const SUBSCRIPTION_DELETED: &str = "customer.subscription.deleted";

/// Result of handling one delivery
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BillingOutcome {
    /// Recorded and its subscription change committed
    Applied,
    /// Event id already in the ledger; nothing changed
    Duplicate,
    /// Recorded, but no subscription changed: the event type carries no
    /// change or it names an unknown subscription
    Ignored,
}

impl BillingOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            BillingOutcome::Applied => "applied",
            BillingOutcome::Duplicate => "duplicate",
            BillingOutcome::Ignored => "ignored",
        }
    }
}

#[derive(Debug, Deserialize)]
struct BillingEvent {
    id: String,
    #[serde(rename = "type")]
    event_type: String,
    data: EventData,
}

#[derive(Debug, Deserialize)]
struct EventData {
    object: Value,
}

/// Verifies, deduplicates and applies billing provider events
pub struct BillingEventHandler {
    store: Arc<dyn InventoryStore>,
    verifier: SignatureVerifier,
}

impl BillingEventHandler {
    pub fn new(store: Arc<dyn InventoryStore>, verifier: SignatureVerifier) -> Self {
        Self { store, verifier }
    }

    #[tracing::instrument(skip_all)]
    pub async fn handle(
        &self,
        payload: &[u8],
        signature_header: Option<&str>,
    ) -> Result<BillingOutcome, BillingError> {
        let result = self.process(payload, signature_header).await;

        let label = match &result {
            Ok(outcome) => outcome.as_str(),
            Err(BillingError::Signature(_)) => "bad_signature",
            Err(BillingError::Payload(_)) => "bad_payload",
            Err(_) => "error",
        };
        MetricsRecorder::record_billing_event(label);

        result
    }

    async fn process(
        &self,
        payload: &[u8],
        signature_header: Option<&str>,
    ) -> Result<BillingOutcome, BillingError> {
        let header = signature_header
            .ok_or_else(|| BillingError::Signature("missing signature header".to_string()))?;
        self.verifier.verify(payload, header)?;

        let event: BillingEvent = serde_json::from_slice(payload)
            .map_err(|e| BillingError::Payload(e.to_string()))?;

        let change = self.subscription_change(&event).await?;

        let entry = self
            .store
            .apply_billing_event(&event.id, &event.event_type, change)
            .await?;

        let outcome = match entry {
            LedgerEntry::Duplicate => BillingOutcome::Duplicate,
            LedgerEntry::Recorded { rows_changed: 0 } => BillingOutcome::Ignored,
            LedgerEntry::Recorded { .. } => BillingOutcome::Applied,
        };

        tracing::info!(
            event_id = %event.id,
            event_type = %event.event_type,
            outcome = outcome.as_str(),
            "Billing event handled"
        );

        Ok(outcome)
    }

    async fn subscription_change(
        &self,
        event: &BillingEvent,
    ) -> Result<SubscriptionChange, BillingError> {
        let object = &event.data.object;

        match event.event_type.as_str() {
            CHECKOUT_COMPLETED => {
                let tenant_id = object
                    .get("client_reference_id")
                    .and_then(Value::as_str)
                    .and_then(|s| Uuid::parse_str(s).ok())
                    .ok_or_else(|| {
                        BillingError::Payload("client_reference_id is not a tenant id".to_string())
                    })?;

                let provider_subscription_id = required_str(object, "subscription")?;
                let plan = plan_id(object)
                    .ok_or_else(|| BillingError::Payload("plan id is missing".to_string()))?;

                if self.store.get_tenant(tenant_id).await?.is_none() {
                    return Err(BillingError::Payload(format!(
                        "tenant {} does not exist",
                        tenant_id
                    )));
                }

                Ok(SubscriptionChange::Upsert {
                    tenant_id,
                    update: SubscriptionUpdate {
                        provider_subscription_id,
                        status: SubscriptionStatus::Active,
                        plan,
                    },
                })
            }
            SUBSCRIPTION_DELETED => Ok(SubscriptionChange::SetStatus {
                provider_subscription_id: required_str(object, "id")?,
                status: SubscriptionStatus::Cancelled,
            }),
            other => {
                tracing::debug!(event_type = %other, "No subscription change for event type");
                Ok(SubscriptionChange::None)
            }
        }
    }
}

fn required_str(object: &Value, field: &str) -> Result<String, BillingError> {
    object
        .get(field)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .ok_or_else(|| BillingError::Payload(format!("{} is missing", field)))
}

/// `display_items[0].plan.id`, falling back to `metadata.plan`
fn plan_id(object: &Value) -> Option<String> {
    object
        .pointer("/display_items/0/plan/id")
        .and_then(Value::as_str)
        .or_else(|| object.pointer("/metadata/plan").and_then(Value::as_str))
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::billing::signature::sign_for_tests;
    use crate::db::schema::Tenant;
    use crate::store::InMemoryInventoryStore;
    use chrono::Utc;
    use serde_json::json;

    const SECRET: &str = "whsec_test";

    async fn setup() -> (BillingEventHandler, InMemoryInventoryStore, Tenant) {
        let store = InMemoryInventoryStore::new();
        let tenant = store
            .create_tenant("Acme", json!({"subdomain": "acme"}))
            .await
            .unwrap();
        let handler = BillingEventHandler::new(
            Arc::new(store.clone()),
            SignatureVerifier::new(SECRET, 300),
        );
        (handler, store, tenant)
    }

    fn signed(event: &Value) -> (Vec<u8>, String) {
        let body = serde_json::to_vec(event).unwrap();
        let header = sign_for_tests(SECRET, &body, Utc::now().timestamp());
        (body, header)
    }

    fn checkout_event(id: &str, tenant_id: Uuid) -> Value {
        json!({
            "id": id,
            "type": CHECKOUT_COMPLETED,
            "data": {"object": {
                "client_reference_id": tenant_id.to_string(),
                "subscription": "sub_123",
                "display_items": [{"plan": {"id": "pro"}}]
            }}
        })
    }

    #[tokio::test]
    async fn test_checkout_activates_subscription() {
        let (handler, store, tenant) = setup().await;
        let (body, header) = signed(&checkout_event("evt_1", tenant.id));

        let outcome = handler.handle(&body, Some(&header)).await.unwrap();
        assert_eq!(outcome, BillingOutcome::Applied);

        let subs = store.list_subscriptions(tenant.id).await.unwrap();
        assert_eq!(subs.len(), 1);
        assert_eq!(subs[0].status, SubscriptionStatus::Active);
        assert_eq!(subs[0].plan, "pro");
        assert_eq!(subs[0].provider_subscription_id, "sub_123");
    }

    #[tokio::test]
    async fn test_replay_is_duplicate() {
        let (handler, store, tenant) = setup().await;
        let (body, header) = signed(&checkout_event("evt_1", tenant.id));

        handler.handle(&body, Some(&header)).await.unwrap();
        let outcome = handler.handle(&body, Some(&header)).await.unwrap();

        assert_eq!(outcome, BillingOutcome::Duplicate);
        assert_eq!(store.list_subscriptions(tenant.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_plan_falls_back_to_metadata() {
        let (handler, store, tenant) = setup().await;
        let event = json!({
            "id": "evt_2",
            "type": CHECKOUT_COMPLETED,
            "data": {"object": {
                "client_reference_id": tenant.id.to_string(),
                "subscription": "sub_9",
                "metadata": {"plan": "starter"}
            }}
        });
        let (body, header) = signed(&event);

        handler.handle(&body, Some(&header)).await.unwrap();
        assert_eq!(store.list_subscriptions(tenant.id).await.unwrap()[0].plan, "starter");
    }

    #[tokio::test]
    async fn test_tampered_payload_changes_nothing() {
        let (handler, store, tenant) = setup().await;
        let (_, header) = signed(&checkout_event("evt_1", tenant.id));
        let forged = serde_json::to_vec(&checkout_event("evt_1", Uuid::new_v4())).unwrap();

        let err = handler.handle(&forged, Some(&header)).await.unwrap_err();
        assert!(matches!(err, BillingError::Signature(_)));

        let err = handler.handle(&forged, None).await.unwrap_err();
        assert!(matches!(err, BillingError::Signature(_)));

        assert!(store.list_subscriptions(tenant.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_tenant_rejected() {
        let (handler, _store, _tenant) = setup().await;
        let (body, header) = signed(&checkout_event("evt_1", Uuid::new_v4()));

        let err = handler.handle(&body, Some(&header)).await.unwrap_err();
        assert!(matches!(err, BillingError::Payload(_)));
    }

    #[tokio::test]
    async fn test_missing_plan_rejected() {
        let (handler, _store, tenant) = setup().await;
        let event = json!({
            "id": "evt_3",
            "type": CHECKOUT_COMPLETED,
            "data": {"object": {
                "client_reference_id": tenant.id.to_string(),
                "subscription": "sub_1"
            }}
        });
        let (body, header) = signed(&event);

        let err = handler.handle(&body, Some(&header)).await.unwrap_err();
        assert!(matches!(err, BillingError::Payload(_)));
    }

    #[tokio::test]
    async fn test_unrelated_event_is_acknowledged_once() {
        let (handler, _store, _tenant) = setup().await;
        let event = json!({"id": "evt_4", "type": "invoice.paid", "data": {"object": {}}});
        let (body, header) = signed(&event);

        assert_eq!(
            handler.handle(&body, Some(&header)).await.unwrap(),
            BillingOutcome::Ignored
        );
        assert_eq!(
            handler.handle(&body, Some(&header)).await.unwrap(),
            BillingOutcome::Duplicate
        );
    }

    #[tokio::test]
    async fn test_subscription_deleted_cancels() {
        let (handler, store, tenant) = setup().await;
        let (body, header) = signed(&checkout_event("evt_1", tenant.id));
        handler.handle(&body, Some(&header)).await.unwrap();

        let deleted = json!({
            "id": "evt_5",
            "type": SUBSCRIPTION_DELETED,
            "data": {"object": {"id": "sub_123"}}
        });
        let (body, header) = signed(&deleted);

        assert_eq!(
            handler.handle(&body, Some(&header)).await.unwrap(),
            BillingOutcome::Applied
        );
        assert_eq!(
            store.list_subscriptions(tenant.id).await.unwrap()[0].status,
            SubscriptionStatus::Cancelled
        );
    }

    #[tokio::test]
    async fn test_cancel_for_unknown_subscription_is_ignored() {
        let (handler, store, tenant) = setup().await;
        let (body, header) = signed(&checkout_event("evt_1", tenant.id));
        handler.handle(&body, Some(&header)).await.unwrap();

        let deleted = json!({
            "id": "evt_6",
            "type": SUBSCRIPTION_DELETED,
            "data": {"object": {"id": "sub_other"}}
        });
        let (body, header) = signed(&deleted);

        assert_eq!(
            handler.handle(&body, Some(&header)).await.unwrap(),
            BillingOutcome::Ignored
        );
        assert_eq!(
            store.list_subscriptions(tenant.id).await.unwrap()[0].status,
            SubscriptionStatus::Active
        );
    }

    #[tokio::test]
    async fn test_malformed_event_rejected() {
        let (handler, _store, _tenant) = setup().await;
        let body = b"{\"id\": 1}".to_vec();
        let header = sign_for_tests(SECRET, &body, Utc::now().timestamp());

        let err = handler.handle(&body, Some(&header)).await.unwrap_err();
        assert!(matches!(err, BillingError::Payload(_)));
    }
}
