use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;
use uuid::Uuid;

use super::payment::{PaymentIntent, PaymentOutcome};

/// Inbound provider event, e.g.
/// `{"id":"evt_1","type":"payment_intent.succeeded","data":{"object":{"id":"pi_1","metadata":{"order_id":"…"}}}}`.
#[derive(Debug, Clone, Deserialize)]
pub struct ProviderEvent {
    pub id: String,
    #[serde(rename = "type")]
    pub event_type: String,
    #[serde(default)]
    pub data: Value,
}

impl ProviderEvent {
    pub fn outcome(&self) -> Option<PaymentOutcome> {
        match self.event_type.as_str() {
            "payment_intent.succeeded" => Some(PaymentOutcome::Succeeded),
            "payment_intent.payment_failed" => Some(PaymentOutcome::Failed),
            _ => None,
        }
    }

    pub fn provider_payment_id(&self) -> Option<&str> {
        self.data.pointer("/object/id").and_then(Value::as_str)
    }

    pub fn order_id(&self) -> Option<Uuid> {
        self.data
            .pointer("/object/metadata/order_id")
            .and_then(Value::as_str)
            .and_then(|raw| Uuid::parse_str(raw).ok())
    }

    /// The intent change this event asks for, if it is a payment event we act on.
    pub fn effect(&self) -> Option<ProviderEffect> {
        Some(ProviderEffect {
            provider_payment_id: self.provider_payment_id()?.to_string(),
            order_id: self.order_id(),
            outcome: self.outcome()?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderEffect {
    pub provider_payment_id: String,
    pub order_id: Option<Uuid>,
    pub outcome: PaymentOutcome,
}

/// Dedup ledger row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebhookEventRecord {
    pub event_id: String,
    pub event_type: String,
    pub received_at: DateTime<Utc>,
    pub processed: bool,
    pub processed_at: Option<DateTime<Utc>>,
}

impl WebhookEventRecord {
    pub fn received(event: &ProviderEvent, now: DateTime<Utc>) -> Self {
        Self {
            event_id: event.id.clone(),
            event_type: event.event_type.clone(),
            received_at: now,
            processed: false,
            processed_at: None,
        }
    }
}

/// What the ledger knew about an event id when a delivery arrived.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// This delivery inserted the ledger row.
    First,
    /// The row exists but its effect never landed.
    Retry,
    /// The row exists and was fully processed.
    Duplicate,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApplyResult {
    /// The ledger row was marked processed by this call. `intent` is the
    /// intent's state afterwards (`None` if the provider id is unknown) and
    /// `changed` tells whether its status moved.
    Applied {
        intent: Option<PaymentIntent>,
        changed: bool,
    },
    AlreadyProcessed,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn succeeded_event_maps_to_effect() {
        let order_id = Uuid::new_v4();
        let event: ProviderEvent = serde_json::from_value(serde_json::json!({
            "id": "evt_1",
            "type": "payment_intent.succeeded",
            "data": { "object": { "id": "pi_1", "metadata": { "order_id": order_id.to_string() } } }
        }))
        .unwrap();

        assert_eq!(
            event.effect(),
            Some(ProviderEffect {
                provider_payment_id: "pi_1".to_string(),
                order_id: Some(order_id),
                outcome: PaymentOutcome::Succeeded,
            })
        );
    }

    #[test]
    fn unrelated_event_types_have_no_effect() {
        let event: ProviderEvent = serde_json::from_value(serde_json::json!({
            "id": "evt_2",
            "type": "charge.refunded",
            "data": { "object": { "id": "ch_1" } }
        }))
        .unwrap();
        assert!(event.effect().is_none());
    }

    #[test]
    fn payment_event_without_object_id_has_no_effect() {
        let event: ProviderEvent = serde_json::from_value(serde_json::json!({
            "id": "evt_3",
            "type": "payment_intent.payment_failed"
        }))
        .unwrap();
        assert_eq!(event.outcome(), Some(PaymentOutcome::Failed));
        assert!(event.effect().is_none());
    }
}
