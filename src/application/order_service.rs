use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use uuid::Uuid;

use crate::domain::errors::DomainError;
use crate::domain::order::{NewOrder, Order, OrderStatus, PaymentMethod, StatusHistoryEntry};
use crate::domain::policy::{Actor, DriverCapacity, Role, TransitionPolicy};
use crate::domain::ports::{Notifier, OrderRepository, PaymentStore, StatusNotification};

/// Order state machine and driver assignment.
pub struct OrderService {
    orders: Arc<dyn OrderRepository>,
    payments: Arc<dyn PaymentStore>,
    notifier: Arc<dyn Notifier>,
    capacity: Arc<dyn DriverCapacity>,
    policy: TransitionPolicy,
    lock_timeout: Duration,
}

impl OrderService {
    pub fn new(
        orders: Arc<dyn OrderRepository>,
        payments: Arc<dyn PaymentStore>,
        notifier: Arc<dyn Notifier>,
        capacity: Arc<dyn DriverCapacity>,
        policy: TransitionPolicy,
        lock_timeout: Duration,
    ) -> Self {
        Self {
            orders,
            payments,
            notifier,
            capacity,
            policy,
            lock_timeout,
        }
    }

    pub fn create_order(&self, actor: &Actor, new: NewOrder) -> Result<Order, DomainError> {
        if actor.role != Role::Customer || new.customer_id != actor.id {
            return Err(DomainError::Forbidden(
                "only customers may place orders for themselves".to_string(),
            ));
        }
        let order = Order::place(new, Utc::now())?;
        self.orders.insert(&order)?;
        log::info!(
            "Order {} placed by customer {} for {} cents",
            order.id,
            order.customer_id,
            order.total_cents
        );
        Ok(order)
    }

    pub fn get_order(&self, id: Uuid) -> Result<Order, DomainError> {
        self.orders
            .find_by_id(id)?
            .ok_or(DomainError::NotFound("order"))
    }

    /// Reads an order on behalf of `actor`. Orders the actor is not a party to
    /// are reported as missing.
    pub fn get_order_for(&self, actor: &Actor, id: Uuid) -> Result<Order, DomainError> {
        let order = self.get_order(id)?;
        let visible = match actor.role {
            Role::Admin => true,
            Role::Customer => order.customer_id == actor.id,
            Role::Vendor => order.vendor_id == actor.id,
            Role::Driver => order.driver_id == Some(actor.id),
        };
        if visible {
            Ok(order)
        } else {
            Err(DomainError::NotFound("order"))
        }
    }

    pub fn status_history(
        &self,
        actor: &Actor,
        id: Uuid,
    ) -> Result<Vec<StatusHistoryEntry>, DomainError> {
        Ok(self.get_order_for(actor, id)?.status_history)
    }

    pub fn accept(&self, order_id: Uuid, actor: &Actor) -> Result<Order, DomainError> {
        self.transition(order_id, OrderStatus::Accepted, actor, None)
    }

    /// Validates the edge, the actor's right to drive it and, for card orders
    /// entering PREPARING, that payment was captured. All of it runs under the
    /// order's lock; nothing is written if any check fails.
    pub fn transition(
        &self,
        order_id: Uuid,
        target: OrderStatus,
        actor: &Actor,
        note: Option<String>,
    ) -> Result<Order, DomainError> {
        if target == OrderStatus::Assigned {
            // Assignment carries a driver and goes through `assign_driver`.
            let current = self.get_order(order_id)?;
            return Err(DomainError::InvalidTransition {
                from: current.status,
                to: target,
            });
        }

        // CAPTURED is terminal, so reading it ahead of the order lock cannot
        // admit an unpaid order. It also keeps the locked section on a single
        // connection.
        let captured =
            target == OrderStatus::Preparing && self.payments.has_captured_intent(order_id)?;

        let order = self
            .orders
            .update_locked(order_id, self.lock_timeout, &mut |order| {
                if !order.status.can_transition_to(target) {
                    return Err(DomainError::InvalidTransition {
                        from: order.status,
                        to: target,
                    });
                }
                self.policy.authorize_transition(order, target, actor)?;
                if target == OrderStatus::Preparing
                    && order.payment_method == PaymentMethod::Card
                    && !captured
                {
                    return Err(DomainError::PaymentNotCaptured);
                }
                order.transition(target, Some(actor.id), note.clone(), Utc::now())
            })?;

        log::info!(
            "Order {} moved to {} by {} {}",
            order.id,
            order.status,
            actor.role,
            actor.id
        );
        self.dispatch_notification(&order);
        Ok(order)
    }

    pub fn assign_driver(
        &self,
        order_id: Uuid,
        driver_id: Uuid,
        actor: &Actor,
    ) -> Result<Order, DomainError> {
        let order = self.orders.assign_locked(
            order_id,
            driver_id,
            self.lock_timeout,
            &mut |order, active| {
                self.policy.authorize_assignment(order, driver_id, actor)?;
                if order.status != OrderStatus::Ready {
                    return Err(DomainError::OrderNotReady(order.status));
                }
                if !self.capacity.has_capacity(driver_id, active) {
                    return Err(DomainError::DriverUnavailable(driver_id));
                }
                order.assign_driver(driver_id, Some(actor.id), Utc::now())
            },
        )?;

        log::info!("Order {} assigned to driver {}", order.id, driver_id);
        self.dispatch_notification(&order);
        Ok(order)
    }

    fn dispatch_notification(&self, order: &Order) {
        if !order.status.notifies() {
            return;
        }
        let notification = StatusNotification {
            order_id: order.id,
            status: order.status,
            customer_id: order.customer_id,
            vendor_id: order.vendor_id,
            driver_id: order.driver_id,
            occurred_at: order.updated_at,
        };
        if let Err(e) = self.notifier.notify(&notification) {
            log::warn!(
                "Notification for order {} ({}) failed: {}",
                order.id,
                order.status,
                e
            );
        }
    }
}
