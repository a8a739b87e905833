use chrono::{DateTime, Utc};
use diesel::pg::PgConnection;
use diesel::prelude::*;
use uuid::Uuid;

use crate::db::DbPool;
use crate::domain::errors::DomainError;
use crate::domain::payment::{PaymentIntent, PaymentOutcome, PaymentStatus};
use crate::domain::ports::PaymentStore;
use crate::domain::webhook::{ApplyResult, Delivery, ProviderEffect, WebhookEventRecord};
use crate::schema::{payment_intents, webhook_events};

use super::models::{PaymentIntentRow, WebhookEventRow};

pub struct DieselPaymentStore {
    pool: DbPool,
}

impl DieselPaymentStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

/// Locks the intent row and settles it if it is still PENDING. Must run inside
/// a transaction.
fn resolve_locked(
    conn: &mut PgConnection,
    provider_payment_id: &str,
    order_id: Option<Uuid>,
    outcome: PaymentOutcome,
    now: DateTime<Utc>,
) -> Result<Option<(PaymentIntent, bool)>, DomainError> {
    let row = payment_intents::table
        .filter(payment_intents::provider_payment_id.eq(provider_payment_id))
        .select(PaymentIntentRow::as_select())
        .for_update()
        .first(conn)
        .optional()?;
    let Some(row) = row else {
        return Ok(None);
    };
    let mut intent = PaymentIntent::try_from(row)?;

    if order_id.is_some_and(|order_id| order_id != intent.order_id) {
        log::warn!(
            "Provider payment {} belongs to order {}, not {:?}; ignoring",
            provider_payment_id,
            intent.order_id,
            order_id
        );
        return Ok(Some((intent, false)));
    }

    let changed = intent.resolve(outcome, now);
    if changed {
        diesel::update(payment_intents::table.find(intent.id))
            .set((
                payment_intents::status.eq(intent.status.as_str()),
                payment_intents::updated_at.eq(intent.updated_at),
            ))
            .execute(conn)?;
    }
    Ok(Some((intent, changed)))
}

impl PaymentStore for DieselPaymentStore {
    fn insert_intent(&self, intent: &PaymentIntent) -> Result<(), DomainError> {
        let mut conn = self.pool.get()?;
        // The partial unique index turns a second live intent into
        // `PaymentAlreadyActive` (see the diesel error conversion).
        diesel::insert_into(payment_intents::table)
            .values(&PaymentIntentRow::from(intent))
            .execute(&mut conn)?;
        Ok(())
    }

    fn find_intent(&self, id: Uuid) -> Result<Option<PaymentIntent>, DomainError> {
        let mut conn = self.pool.get()?;
        payment_intents::table
            .find(id)
            .select(PaymentIntentRow::as_select())
            .first(&mut conn)
            .optional()?
            .map(PaymentIntent::try_from)
            .transpose()
    }

    fn has_captured_intent(&self, order_id: Uuid) -> Result<bool, DomainError> {
        let mut conn = self.pool.get()?;
        let captured = diesel::select(diesel::dsl::exists(
            payment_intents::table
                .filter(payment_intents::order_id.eq(order_id))
                .filter(payment_intents::status.eq(PaymentStatus::Captured.as_str())),
        ))
        .get_result(&mut conn)?;
        Ok(captured)
    }

    fn resolve_intent(
        &self,
        provider_payment_id: &str,
        order_id: Option<Uuid>,
        outcome: PaymentOutcome,
        now: DateTime<Utc>,
    ) -> Result<Option<(PaymentIntent, bool)>, DomainError> {
        let mut conn = self.pool.get()?;
        conn.transaction::<_, DomainError, _>(|conn| {
            resolve_locked(conn, provider_payment_id, order_id, outcome, now)
        })
    }

    fn record_delivery(&self, record: &WebhookEventRecord) -> Result<Delivery, DomainError> {
        let mut conn = self.pool.get()?;

        let inserted = diesel::insert_into(webhook_events::table)
            .values(&WebhookEventRow::from(record))
            .on_conflict(webhook_events::event_id)
            .do_nothing()
            .execute(&mut conn)?;
        if inserted == 1 {
            return Ok(Delivery::First);
        }

        let processed: bool = webhook_events::table
            .find(&record.event_id)
            .select(webhook_events::processed)
            .first(&mut conn)?;
        Ok(if processed {
            Delivery::Duplicate
        } else {
            Delivery::Retry
        })
    }

    fn apply_delivery(
        &self,
        event_id: &str,
        effect: Option<&ProviderEffect>,
        now: DateTime<Utc>,
    ) -> Result<ApplyResult, DomainError> {
        let mut conn = self.pool.get()?;

        conn.transaction::<_, DomainError, _>(|conn| {
            // Concurrent deliveries of one event queue on this row; the loser
            // sees `processed` and backs off.
            let processed: bool = webhook_events::table
                .find(event_id)
                .select(webhook_events::processed)
                .for_update()
                .first(conn)
                .optional()?
                .ok_or(DomainError::NotFound("webhook event"))?;
            if processed {
                return Ok(ApplyResult::AlreadyProcessed);
            }

            let (intent, changed) = match effect {
                Some(e) => {
                    match resolve_locked(conn, &e.provider_payment_id, e.order_id, e.outcome, now)? {
                        Some((intent, changed)) => (Some(intent), changed),
                        None => (None, false),
                    }
                }
                None => (None, false),
            };

            diesel::update(webhook_events::table.find(event_id))
                .set((
                    webhook_events::processed.eq(true),
                    webhook_events::processed_at.eq(Some(now)),
                ))
                .execute(conn)?;

            Ok(ApplyResult::Applied { intent, changed })
        })
    }

    fn find_event(&self, event_id: &str) -> Result<Option<WebhookEventRecord>, DomainError> {
        let mut conn = self.pool.get()?;
        let row = webhook_events::table
            .find(event_id)
            .select(WebhookEventRow::as_select())
            .first(&mut conn)
            .optional()?;
        Ok(row.map(WebhookEventRecord::from))
    }

    fn prune_events(&self, cutoff: DateTime<Utc>) -> Result<usize, DomainError> {
        let mut conn = self.pool.get()?;
        let deleted = diesel::delete(
            webhook_events::table
                .filter(webhook_events::processed.eq(true))
                .filter(webhook_events::received_at.lt(cutoff)),
        )
        .execute(&mut conn)?;
        Ok(deleted)
    }
}
