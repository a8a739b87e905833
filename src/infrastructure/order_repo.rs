use std::time::Duration;

use diesel::pg::PgConnection;
use diesel::prelude::*;
use diesel::result::{DatabaseErrorKind, Error as DieselError};
use diesel::sql_types::BigInt;
use uuid::Uuid;

use crate::db::DbPool;
use crate::domain::errors::DomainError;
use crate::domain::order::{Order, OrderStatus};
use crate::domain::ports::OrderRepository;
use crate::schema::{order_items, order_status_history, orders};

use super::models::{NewStatusHistoryRow, OrderItemRow, OrderRow, StatusHistoryRow};

// ── Error conversions (infrastructure concern only) ──────────────────────────

impl From<DieselError> for DomainError {
    fn from(e: DieselError) -> Self {
        match &e {
            // SQLSTATE 55P03, raised once `SET LOCAL lock_timeout` elapses.
            DieselError::DatabaseError(_, info) if info.message().contains("lock timeout") => {
                DomainError::Busy
            }
            DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, info)
                if info.constraint_name() == Some("uq_payment_intents_active_order") =>
            {
                DomainError::PaymentAlreadyActive
            }
            _ => DomainError::Internal(e.to_string()),
        }
    }
}

impl From<r2d2::Error> for DomainError {
    fn from(e: r2d2::Error) -> Self {
        DomainError::Internal(e.to_string())
    }
}

/// Bounds how long the current transaction waits for row locks.
pub(crate) fn set_lock_timeout(conn: &mut PgConnection, timeout: Duration) -> QueryResult<()> {
    // The value is a number we format ourselves; SET does not take bind params.
    diesel::sql_query(format!(
        "SET LOCAL lock_timeout = '{}ms'",
        timeout.as_millis().max(1)
    ))
    .execute(conn)
    .map(|_| ())
}

// ── Repository ────────────────────────────────────────────────────────────────

pub struct DieselOrderRepository {
    pool: DbPool,
}

impl DieselOrderRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn hydrate(conn: &mut PgConnection, row: OrderRow) -> Result<Order, DomainError> {
    let items = OrderItemRow::belonging_to(&row)
        .select(OrderItemRow::as_select())
        .order(order_items::position.asc())
        .load(conn)?
        .into_iter()
        .map(OrderItemRow::into_item)
        .collect::<Result<Vec<_>, _>>()?;
    let status_history = StatusHistoryRow::belonging_to(&row)
        .select(StatusHistoryRow::as_select())
        .order(order_status_history::id.asc())
        .load(conn)?
        .into_iter()
        .map(StatusHistoryRow::into_entry)
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Order {
        id: row.id,
        customer_id: row.customer_id,
        vendor_id: row.vendor_id,
        driver_id: row.driver_id,
        address_id: row.address_id,
        payment_method: row.payment_method.parse()?,
        status: row.status.parse()?,
        items,
        total_cents: row.total_cents,
        status_history,
        created_at: row.created_at,
        updated_at: row.updated_at,
    })
}

impl OrderRepository for DieselOrderRepository {
    fn insert(&self, order: &Order) -> Result<(), DomainError> {
        let mut conn = self.pool.get()?;

        conn.transaction::<_, DomainError, _>(|conn| {
            diesel::insert_into(orders::table)
                .values(&OrderRow {
                    id: order.id,
                    customer_id: order.customer_id,
                    vendor_id: order.vendor_id,
                    driver_id: order.driver_id,
                    address_id: order.address_id,
                    payment_method: order.payment_method.as_str().to_string(),
                    status: order.status.as_str().to_string(),
                    total_cents: order.total_cents,
                    created_at: order.created_at,
                    updated_at: order.updated_at,
                })
                .execute(conn)?;

            let items = order
                .items
                .iter()
                .enumerate()
                .map(|(position, item)| OrderItemRow::from_item(order.id, position, item))
                .collect::<Result<Vec<_>, _>>()?;
            diesel::insert_into(order_items::table)
                .values(&items)
                .execute(conn)?;

            let history: Vec<NewStatusHistoryRow> = order
                .status_history
                .iter()
                .map(|entry| NewStatusHistoryRow::from_entry(order.id, entry))
                .collect();
            diesel::insert_into(order_status_history::table)
                .values(&history)
                .execute(conn)?;

            Ok(())
        })
    }

    fn find_by_id(&self, id: Uuid) -> Result<Option<Order>, DomainError> {
        let mut conn = self.pool.get()?;

        let row = orders::table
            .find(id)
            .select(OrderRow::as_select())
            .first(&mut conn)
            .optional()?;

        let Some(row) = row else {
            return Ok(None);
        };
        hydrate(&mut conn, row).map(Some)
    }

    fn update_locked(
        &self,
        id: Uuid,
        lock_timeout: Duration,
        mutate: &mut dyn FnMut(&mut Order) -> Result<(), DomainError>,
    ) -> Result<Order, DomainError> {
        let mut conn = self.pool.get()?;

        conn.transaction::<_, DomainError, _>(|conn| {
            set_lock_timeout(conn, lock_timeout)?;
            update_row_locked(conn, id, mutate)
        })
    }

    fn assign_locked(
        &self,
        id: Uuid,
        driver_id: Uuid,
        lock_timeout: Duration,
        mutate: &mut dyn FnMut(&mut Order, usize) -> Result<(), DomainError>,
    ) -> Result<Order, DomainError> {
        let mut conn = self.pool.get()?;

        conn.transaction::<_, DomainError, _>(|conn| {
            set_lock_timeout(conn, lock_timeout)?;

            // Held until commit; `lock_timeout` bounds the wait.
            diesel::sql_query("SELECT pg_advisory_xact_lock($1)")
                .bind::<BigInt, _>(driver_lock_key(driver_id))
                .execute(conn)?;
            let active = active_deliveries(conn, driver_id)?;

            update_row_locked(conn, id, &mut |order| mutate(order, active))
        })
    }

    fn count_active_for_driver(&self, driver_id: Uuid) -> Result<usize, DomainError> {
        let mut conn = self.pool.get()?;
        active_deliveries(&mut conn, driver_id)
    }
}

/// Advisory lock key for a driver. Collisions only serialise two drivers.
fn driver_lock_key(driver_id: Uuid) -> i64 {
    let (high, low) = driver_id.as_u64_pair();
    (high ^ low) as i64
}

fn active_deliveries(conn: &mut PgConnection, driver_id: Uuid) -> Result<usize, DomainError> {
    let active: Vec<&str> = OrderStatus::ALL
        .into_iter()
        .filter(|s| s.is_active_delivery())
        .map(OrderStatus::as_str)
        .collect();
    let count: i64 = orders::table
        .filter(orders::driver_id.eq(driver_id))
        .filter(orders::status.eq_any(active))
        .count()
        .get_result(conn)?;

    usize::try_from(count).map_err(|e| DomainError::Internal(e.to_string()))
}

/// Locks the order row, applies `mutate` and writes the result. Must run
/// inside a transaction.
fn update_row_locked(
    conn: &mut PgConnection,
    id: Uuid,
    mutate: &mut dyn FnMut(&mut Order) -> Result<(), DomainError>,
) -> Result<Order, DomainError> {
    // Row lock on the order serialises every writer for this id.
    let row = orders::table
        .find(id)
        .select(OrderRow::as_select())
        .for_update()
        .first(conn)
        .optional()?
        .ok_or(DomainError::NotFound("order"))?;
    let mut order = hydrate(conn, row)?;
    let recorded = order.status_history.len();

    mutate(&mut order)?;

    diesel::update(orders::table.find(id))
        .set((
            orders::status.eq(order.status.as_str()),
            orders::driver_id.eq(order.driver_id),
            orders::updated_at.eq(order.updated_at),
        ))
        .execute(conn)?;

    let appended: Vec<NewStatusHistoryRow> = order.status_history[recorded..]
        .iter()
        .map(|entry| NewStatusHistoryRow::from_entry(order.id, entry))
        .collect();
    if !appended.is_empty() {
        diesel::insert_into(order_status_history::table)
            .values(&appended)
            .execute(conn)?;
    }

    Ok(order)
}
