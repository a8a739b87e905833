use std::time::Duration;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::errors::DomainError;
use super::idempotency::{Claim, ResultSnapshot};
use super::order::{Order, OrderStatus};
use super::payment::{PaymentIntent, PaymentOutcome, ProviderPayment};
use super::webhook::{ApplyResult, Delivery, ProviderEffect, WebhookEventRecord};

pub trait OrderRepository: Send + Sync + 'static {
    fn insert(&self, order: &Order) -> Result<(), DomainError>;
    fn find_by_id(&self, id: Uuid) -> Result<Option<Order>, DomainError>;
    /// Runs `mutate` while holding the order's single-writer lock and persists
    /// the result. Nothing is written when `mutate` fails. Gives up with
    /// `DomainError::Busy` if the lock is not acquired within `lock_timeout`.
    fn update_locked(
        &self,
        id: Uuid,
        lock_timeout: Duration,
        mutate: &mut dyn FnMut(&mut Order) -> Result<(), DomainError>,
    ) -> Result<Order, DomainError>;
    /// `update_locked` for driver assignment. Assignments of one driver are
    /// serialised, and `mutate` receives that driver's active delivery count
    /// taken inside the same critical section.
    fn assign_locked(
        &self,
        id: Uuid,
        driver_id: Uuid,
        lock_timeout: Duration,
        mutate: &mut dyn FnMut(&mut Order, usize) -> Result<(), DomainError>,
    ) -> Result<Order, DomainError>;
    fn count_active_for_driver(&self, driver_id: Uuid) -> Result<usize, DomainError>;
}

/// Payment intents and the webhook dedup ledger. They share one store so that
/// marking an event processed and applying its effect commit together.
pub trait PaymentStore: Send + Sync + 'static {
    /// Fails with `PaymentAlreadyActive` if the order has a non-failed intent.
    fn insert_intent(&self, intent: &PaymentIntent) -> Result<(), DomainError>;
    fn find_intent(&self, id: Uuid) -> Result<Option<PaymentIntent>, DomainError>;
    fn has_captured_intent(&self, order_id: Uuid) -> Result<bool, DomainError>;
    /// Resolves the PENDING intent with this provider id. Returns the current
    /// intent (changed or not), or `None` if the provider id is unknown.
    fn resolve_intent(
        &self,
        provider_payment_id: &str,
        order_id: Option<Uuid>,
        outcome: PaymentOutcome,
        now: DateTime<Utc>,
    ) -> Result<Option<(PaymentIntent, bool)>, DomainError>;

    /// Conditional insert of a ledger row; the event id is the arbiter.
    fn record_delivery(&self, record: &WebhookEventRecord) -> Result<Delivery, DomainError>;
    /// Applies `effect` and marks the ledger row processed as one unit.
    fn apply_delivery(
        &self,
        event_id: &str,
        effect: Option<&ProviderEffect>,
        now: DateTime<Utc>,
    ) -> Result<ApplyResult, DomainError>;
    fn find_event(&self, event_id: &str) -> Result<Option<WebhookEventRecord>, DomainError>;
    /// Deletes processed ledger rows received before `cutoff`.
    fn prune_events(&self, cutoff: DateTime<Utc>) -> Result<usize, DomainError>;
}

pub trait IdempotencyStore: Send + Sync + 'static {
    /// Records received before `expired_before` are discarded first, so an
    /// expired key is claimed afresh.
    fn claim(
        &self,
        key: &str,
        fingerprint: &str,
        now: DateTime<Utc>,
        expired_before: DateTime<Utc>,
    ) -> Result<Claim, DomainError>;
    fn complete(
        &self,
        key: &str,
        fingerprint: &str,
        result: &ResultSnapshot,
    ) -> Result<(), DomainError>;
    /// Drops an unfinished claim so that the key can be retried.
    fn release(&self, key: &str, fingerprint: &str) -> Result<(), DomainError>;
    fn prune(&self, cutoff: DateTime<Utc>) -> Result<usize, DomainError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusNotification {
    pub order_id: Uuid,
    pub status: OrderStatus,
    pub customer_id: Uuid,
    pub vendor_id: Uuid,
    pub driver_id: Option<Uuid>,
    pub occurred_at: DateTime<Utc>,
}

/// Outbound notification channel. Best effort: callers log failures.
pub trait Notifier: Send + Sync + 'static {
    fn notify(&self, notification: &StatusNotification) -> Result<(), DomainError>;
}

pub trait PaymentGateway: Send + Sync + 'static {
    fn create_payment(
        &self,
        order_id: Uuid,
        amount_cents: i64,
        currency: &str,
    ) -> Result<ProviderPayment, DomainError>;
}
