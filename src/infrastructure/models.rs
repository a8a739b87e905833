use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde_json::Value;
use uuid::Uuid;

use crate::domain::errors::DomainError;
use crate::domain::idempotency::ResultSnapshot;
use crate::domain::order::{OrderItem, SelectedModifier, StatusHistoryEntry};
use crate::domain::payment::PaymentIntent;
use crate::domain::webhook::WebhookEventRecord;
use crate::schema::{
    idempotency_records, order_items, order_notification_outbox, order_status_history, orders,
    payment_intents, webhook_events,
};

#[derive(Debug, Clone, Queryable, Selectable, Identifiable, Insertable)]
#[diesel(table_name = orders)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct OrderRow {
    pub id: Uuid,
    pub customer_id: Uuid,
    pub vendor_id: Uuid,
    pub driver_id: Option<Uuid>,
    pub address_id: Uuid,
    pub payment_method: String,
    pub status: String,
    pub total_cents: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Queryable, Selectable, Identifiable, Associations, Insertable)]
#[diesel(table_name = order_items)]
#[diesel(belongs_to(OrderRow, foreign_key = order_id))]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct OrderItemRow {
    pub id: Uuid,
    pub order_id: Uuid,
    pub position: i32,
    pub menu_item_id: Uuid,
    pub quantity: i32,
    pub unit_price_cents: i64,
    pub selected_modifiers: Value,
}

impl OrderItemRow {
    pub fn from_item(order_id: Uuid, position: usize, item: &OrderItem) -> Result<Self, DomainError> {
        Ok(Self {
            id: Uuid::new_v4(),
            order_id,
            position: i32::try_from(position)
                .map_err(|_| DomainError::InvalidInput("too many items".to_string()))?,
            menu_item_id: item.menu_item_id,
            quantity: item.quantity,
            unit_price_cents: item.unit_price_cents,
            selected_modifiers: serde_json::to_value(&item.selected_modifiers)
                .map_err(|e| DomainError::Internal(e.to_string()))?,
        })
    }

    pub fn into_item(self) -> Result<OrderItem, DomainError> {
        let selected_modifiers: Vec<SelectedModifier> =
            serde_json::from_value(self.selected_modifiers)
                .map_err(|e| DomainError::Internal(format!("corrupt modifiers: {}", e)))?;
        Ok(OrderItem {
            menu_item_id: self.menu_item_id,
            quantity: self.quantity,
            unit_price_cents: self.unit_price_cents,
            selected_modifiers,
        })
    }
}

#[derive(Debug, Clone, Queryable, Selectable, Identifiable, Associations)]
#[diesel(table_name = order_status_history)]
#[diesel(belongs_to(OrderRow, foreign_key = order_id))]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct StatusHistoryRow {
    pub id: i64,
    pub order_id: Uuid,
    pub status: String,
    pub note: Option<String>,
    pub actor_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

impl StatusHistoryRow {
    pub fn into_entry(self) -> Result<StatusHistoryEntry, DomainError> {
        Ok(StatusHistoryEntry {
            status: self.status.parse()?,
            note: self.note,
            actor_id: self.actor_id,
            timestamp: self.created_at,
        })
    }
}

#[derive(Debug, Insertable)]
#[diesel(table_name = order_status_history)]
pub struct NewStatusHistoryRow {
    pub order_id: Uuid,
    pub status: String,
    pub note: Option<String>,
    pub actor_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

impl NewStatusHistoryRow {
    pub fn from_entry(order_id: Uuid, entry: &StatusHistoryEntry) -> Self {
        Self {
            order_id,
            status: entry.status.as_str().to_string(),
            note: entry.note.clone(),
            actor_id: entry.actor_id,
            created_at: entry.timestamp,
        }
    }
}

#[derive(Debug, Clone, Queryable, Selectable, Identifiable, Insertable)]
#[diesel(table_name = payment_intents)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct PaymentIntentRow {
    pub id: Uuid,
    pub order_id: Uuid,
    pub provider_payment_id: String,
    pub amount_cents: i64,
    pub currency: String,
    pub status: String,
    pub client_secret: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&PaymentIntent> for PaymentIntentRow {
    fn from(intent: &PaymentIntent) -> Self {
        Self {
            id: intent.id,
            order_id: intent.order_id,
            provider_payment_id: intent.provider_payment_id.clone(),
            amount_cents: intent.amount_cents,
            currency: intent.currency.clone(),
            status: intent.status.as_str().to_string(),
            client_secret: intent.client_secret.clone(),
            created_at: intent.created_at,
            updated_at: intent.updated_at,
        }
    }
}

impl TryFrom<PaymentIntentRow> for PaymentIntent {
    type Error = DomainError;

    fn try_from(row: PaymentIntentRow) -> Result<Self, Self::Error> {
        Ok(PaymentIntent {
            id: row.id,
            order_id: row.order_id,
            provider_payment_id: row.provider_payment_id,
            amount_cents: row.amount_cents,
            currency: row.currency,
            status: row.status.parse()?,
            client_secret: row.client_secret,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Debug, Clone, Queryable, Selectable, Identifiable, Insertable)]
#[diesel(table_name = webhook_events)]
#[diesel(primary_key(event_id))]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct WebhookEventRow {
    pub event_id: String,
    pub event_type: String,
    pub received_at: DateTime<Utc>,
    pub processed: bool,
    pub processed_at: Option<DateTime<Utc>>,
}

impl From<&WebhookEventRecord> for WebhookEventRow {
    fn from(record: &WebhookEventRecord) -> Self {
        Self {
            event_id: record.event_id.clone(),
            event_type: record.event_type.clone(),
            received_at: record.received_at,
            processed: record.processed,
            processed_at: record.processed_at,
        }
    }
}

impl From<WebhookEventRow> for WebhookEventRecord {
    fn from(row: WebhookEventRow) -> Self {
        Self {
            event_id: row.event_id,
            event_type: row.event_type,
            received_at: row.received_at,
            processed: row.processed,
            processed_at: row.processed_at,
        }
    }
}

#[derive(Debug, Clone, Queryable, Selectable, Insertable)]
#[diesel(table_name = idempotency_records)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct IdempotencyRow {
    pub key: String,
    pub endpoint_fingerprint: String,
    pub response_status: Option<i32>,
    pub response_body: Option<Value>,
    pub created_at: DateTime<Utc>,
}

impl IdempotencyRow {
    /// The stored response, or `None` while the claim is still in flight.
    pub fn snapshot(&self) -> Result<Option<ResultSnapshot>, DomainError> {
        match (self.response_status, &self.response_body) {
            (Some(status), Some(body)) => {
                let status = u16::try_from(status).map_err(|_| {
                    DomainError::Internal(format!("stored status {} is not an HTTP status", status))
                })?;
                Ok(Some(ResultSnapshot::new(status, body.clone())))
            }
            _ => Ok(None),
        }
    }
}

#[derive(Debug, Clone, Queryable, Selectable, Identifiable)]
#[diesel(table_name = order_notification_outbox)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct OutboxEventRow {
    pub id: Uuid,
    pub aggregate_type: String,
    pub aggregate_id: String,
    pub event_type: String,
    pub payload: Value,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = order_notification_outbox)]
pub struct NewOutboxEventRow {
    pub id: Uuid,
    pub aggregate_type: String,
    pub aggregate_id: String,
    pub event_type: String,
    pub payload: Value,
}
