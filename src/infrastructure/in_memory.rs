//! Process-local adapters used by `STORAGE=memory` and the test-suite.
//!
//! They honour the same guarantees as the Postgres adapters: one lock per
//! order, and a single mutex around intents plus the webhook ledger so that
//! applying an event and marking it processed happen together.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use uuid::Uuid;

use crate::domain::errors::DomainError;
use crate::domain::idempotency::{Claim, IdempotencyRecord, ResultSnapshot};
use crate::domain::order::Order;
use crate::domain::payment::{PaymentIntent, PaymentOutcome, PaymentStatus};
use crate::domain::ports::{IdempotencyStore, OrderRepository, PaymentStore};
use crate::domain::webhook::{ApplyResult, Delivery, ProviderEffect, WebhookEventRecord};

// ── Orders ───────────────────────────────────────────────────────────────────

#[derive(Default)]
pub struct InMemoryOrderRepository {
    orders: RwLock<HashMap<Uuid, Arc<Mutex<Order>>>>,
    drivers: Mutex<HashMap<Uuid, Arc<Mutex<()>>>>,
}

impl InMemoryOrderRepository {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self, id: Uuid) -> Option<Arc<Mutex<Order>>> {
        self.orders.read().get(&id).cloned()
    }

    fn driver_slot(&self, driver_id: Uuid) -> Arc<Mutex<()>> {
        self.drivers.lock().entry(driver_id).or_default().clone()
    }
}

impl OrderRepository for InMemoryOrderRepository {
    fn insert(&self, order: &Order) -> Result<(), DomainError> {
        let mut orders = self.orders.write();
        if orders.contains_key(&order.id) {
            return Err(DomainError::Internal(format!(
                "order {} already exists",
                order.id
            )));
        }
        orders.insert(order.id, Arc::new(Mutex::new(order.clone())));
        Ok(())
    }

    fn find_by_id(&self, id: Uuid) -> Result<Option<Order>, DomainError> {
        Ok(self.slot(id).map(|slot| slot.lock().clone()))
    }

    fn update_locked(
        &self,
        id: Uuid,
        lock_timeout: Duration,
        mutate: &mut dyn FnMut(&mut Order) -> Result<(), DomainError>,
    ) -> Result<Order, DomainError> {
        let slot = self.slot(id).ok_or(DomainError::NotFound("order"))?;
        let mut guard = slot.try_lock_for(lock_timeout).ok_or(DomainError::Busy)?;

        // Work on a copy so a failed mutation leaves the stored order intact.
        let mut draft = guard.clone();
        mutate(&mut draft)?;
        *guard = draft.clone();
        Ok(draft)
    }

    fn assign_locked(
        &self,
        id: Uuid,
        driver_id: Uuid,
        lock_timeout: Duration,
        mutate: &mut dyn FnMut(&mut Order, usize) -> Result<(), DomainError>,
    ) -> Result<Order, DomainError> {
        let driver = self.driver_slot(driver_id);
        let _driver_guard = driver.try_lock_for(lock_timeout).ok_or(DomainError::Busy)?;
        // Counted before the order lock is taken: counting locks every order,
        // this one included.
        let active = self.count_active_for_driver(driver_id)?;
        self.update_locked(id, lock_timeout, &mut |order| mutate(order, active))
    }

    fn count_active_for_driver(&self, driver_id: Uuid) -> Result<usize, DomainError> {
        let slots: Vec<_> = self.orders.read().values().cloned().collect();
        Ok(slots
            .iter()
            .filter(|slot| {
                let order = slot.lock();
                order.driver_id == Some(driver_id) && order.status.is_active_delivery()
            })
            .count())
    }
}

// ── Payments + webhook ledger ────────────────────────────────────────────────

#[derive(Default)]
struct PaymentTables {
    intents: HashMap<Uuid, PaymentIntent>,
    by_provider_id: HashMap<String, Uuid>,
    events: HashMap<String, WebhookEventRecord>,
}

impl PaymentTables {
    fn resolve(
        &mut self,
        provider_payment_id: &str,
        order_id: Option<Uuid>,
        outcome: PaymentOutcome,
        now: DateTime<Utc>,
    ) -> Option<(PaymentIntent, bool)> {
        let id = self.by_provider_id.get(provider_payment_id)?;
        let intent = self.intents.get_mut(id)?;
        if order_id.is_some_and(|order_id| order_id != intent.order_id) {
            log::warn!(
                "Provider payment {} belongs to order {}, not {:?}; ignoring",
                provider_payment_id,
                intent.order_id,
                order_id
            );
            return Some((intent.clone(), false));
        }
        let changed = intent.resolve(outcome, now);
        Some((intent.clone(), changed))
    }
}

#[derive(Default)]
pub struct InMemoryPaymentStore {
    tables: Mutex<PaymentTables>,
}

impl InMemoryPaymentStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PaymentStore for InMemoryPaymentStore {
    fn insert_intent(&self, intent: &PaymentIntent) -> Result<(), DomainError> {
        let mut tables = self.tables.lock();
        let active = tables
            .intents
            .values()
            .any(|i| i.order_id == intent.order_id && i.status != PaymentStatus::Failed);
        if active {
            return Err(DomainError::PaymentAlreadyActive);
        }
        if tables
            .by_provider_id
            .contains_key(&intent.provider_payment_id)
        {
            return Err(DomainError::Internal(format!(
                "duplicate provider payment id {}",
                intent.provider_payment_id
            )));
        }
        tables
            .by_provider_id
            .insert(intent.provider_payment_id.clone(), intent.id);
        tables.intents.insert(intent.id, intent.clone());
        Ok(())
    }

    fn find_intent(&self, id: Uuid) -> Result<Option<PaymentIntent>, DomainError> {
        Ok(self.tables.lock().intents.get(&id).cloned())
    }

    fn has_captured_intent(&self, order_id: Uuid) -> Result<bool, DomainError> {
        Ok(self
            .tables
            .lock()
            .intents
            .values()
            .any(|i| i.order_id == order_id && i.status == PaymentStatus::Captured))
    }

    fn resolve_intent(
        &self,
        provider_payment_id: &str,
        order_id: Option<Uuid>,
        outcome: PaymentOutcome,
        now: DateTime<Utc>,
    ) -> Result<Option<(PaymentIntent, bool)>, DomainError> {
        Ok(self
            .tables
            .lock()
            .resolve(provider_payment_id, order_id, outcome, now))
    }

    fn record_delivery(&self, record: &WebhookEventRecord) -> Result<Delivery, DomainError> {
        let mut tables = self.tables.lock();
        match tables.events.get(&record.event_id) {
            Some(existing) if existing.processed => Ok(Delivery::Duplicate),
            Some(_) => Ok(Delivery::Retry),
            None => {
                tables
                    .events
                    .insert(record.event_id.clone(), record.clone());
                Ok(Delivery::First)
            }
        }
    }

    fn apply_delivery(
        &self,
        event_id: &str,
        effect: Option<&ProviderEffect>,
        now: DateTime<Utc>,
    ) -> Result<ApplyResult, DomainError> {
        let mut tables = self.tables.lock();
        match tables.events.get(event_id) {
            None => return Err(DomainError::NotFound("webhook event")),
            Some(event) if event.processed => return Ok(ApplyResult::AlreadyProcessed),
            Some(_) => {}
        }

        let (intent, changed) = match effect.and_then(|e| {
            tables.resolve(&e.provider_payment_id, e.order_id, e.outcome, now)
        }) {
            Some((intent, changed)) => (Some(intent), changed),
            None => (None, false),
        };

        if let Some(event) = tables.events.get_mut(event_id) {
            event.processed = true;
            event.processed_at = Some(now);
        }
        Ok(ApplyResult::Applied { intent, changed })
    }

    fn find_event(&self, event_id: &str) -> Result<Option<WebhookEventRecord>, DomainError> {
        Ok(self.tables.lock().events.get(event_id).cloned())
    }

    fn prune_events(&self, cutoff: DateTime<Utc>) -> Result<usize, DomainError> {
        let mut tables = self.tables.lock();
        let before = tables.events.len();
        tables
            .events
            .retain(|_, e| !(e.processed && e.received_at < cutoff));
        Ok(before - tables.events.len())
    }
}

// ── Idempotency records ──────────────────────────────────────────────────────

#[derive(Default)]
pub struct InMemoryIdempotencyStore {
    records: Mutex<HashMap<(String, String), IdempotencyRecord>>,
}

impl InMemoryIdempotencyStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn record_key(key: &str, fingerprint: &str) -> (String, String) {
    (key.to_string(), fingerprint.to_string())
}

impl IdempotencyStore for InMemoryIdempotencyStore {
    fn claim(
        &self,
        key: &str,
        fingerprint: &str,
        now: DateTime<Utc>,
        expired_before: DateTime<Utc>,
    ) -> Result<Claim, DomainError> {
        let mut records = self.records.lock();
        let id = record_key(key, fingerprint);
        if let Some(existing) = records.get(&id) {
            if existing.created_at >= expired_before {
                return Ok(match &existing.result {
                    Some(result) => Claim::Completed(result.clone()),
                    None => Claim::InFlight,
                });
            }
        }
        records.insert(
            id,
            IdempotencyRecord {
                key: key.to_string(),
                endpoint_fingerprint: fingerprint.to_string(),
                result: None,
                created_at: now,
            },
        );
        Ok(Claim::Acquired)
    }

    fn complete(
        &self,
        key: &str,
        fingerprint: &str,
        result: &ResultSnapshot,
    ) -> Result<(), DomainError> {
        let mut records = self.records.lock();
        let record = records
            .get_mut(&record_key(key, fingerprint))
            .ok_or(DomainError::NotFound("idempotency record"))?;
        record.result = Some(result.clone());
        Ok(())
    }

    fn release(&self, key: &str, fingerprint: &str) -> Result<(), DomainError> {
        let mut records = self.records.lock();
        let id = record_key(key, fingerprint);
        if records.get(&id).is_some_and(|r| r.result.is_none()) {
            records.remove(&id);
        }
        Ok(())
    }

    fn prune(&self, cutoff: DateTime<Utc>) -> Result<usize, DomainError> {
        let mut records = self.records.lock();
        let before = records.len();
        records.retain(|_, r| r.created_at >= cutoff);
        Ok(before - records.len())
    }
}
