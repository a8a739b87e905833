use diesel::prelude::*;
use serde_json::json;
use uuid::Uuid;

use crate::db::DbPool;
use crate::domain::errors::DomainError;
use crate::domain::ports::{Notifier, StatusNotification};
use crate::schema::order_notification_outbox;

use super::models::NewOutboxEventRow;

/// Writes status changes to the log only. Used by the memory backend.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, notification: &StatusNotification) -> Result<(), DomainError> {
        log::info!(
            "Notify customer {} and vendor {}: order {} is {}",
            notification.customer_id,
            notification.vendor_id,
            notification.order_id,
            notification.status
        );
        Ok(())
    }
}

/// Best-effort outbox: one `OrderStatusChanged` row per notification, picked
/// up by an external relay. The row is written after the transition commits,
/// on its own connection, so a failed insert loses the notification but never
/// the transition.
pub struct OutboxNotifier {
    pool: DbPool,
}

impl OutboxNotifier {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

pub(crate) fn outbox_row(notification: &StatusNotification) -> NewOutboxEventRow {
    NewOutboxEventRow {
        id: Uuid::new_v4(),
        aggregate_type: "Order".to_string(),
        aggregate_id: notification.order_id.to_string(),
        event_type: "OrderStatusChanged".to_string(),
        payload: json!({
            "order_id": notification.order_id,
            "status": notification.status.as_str(),
            "customer_id": notification.customer_id,
            "vendor_id": notification.vendor_id,
            "driver_id": notification.driver_id,
            "occurred_at": notification.occurred_at,
        }),
    }
}

impl Notifier for OutboxNotifier {
    fn notify(&self, notification: &StatusNotification) -> Result<(), DomainError> {
        let mut conn = self.pool.get()?;
        diesel::insert_into(order_notification_outbox::table)
            .values(&outbox_row(notification))
            .execute(&mut conn)?;
        Ok(())
    }
}
