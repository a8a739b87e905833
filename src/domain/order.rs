use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::errors::DomainError;

/// Lifecycle of a delivery order. Variants are declared in fulfilment order;
/// `Cancelled` sits outside the forward sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OrderStatus {
    Placed,
    Accepted,
    Preparing,
    Ready,
    Assigned,
    PickedUp,
    Enroute,
    Delivered,
    Cancelled,
}

impl OrderStatus {
    pub const ALL: [OrderStatus; 9] = [
        OrderStatus::Placed,
        OrderStatus::Accepted,
        OrderStatus::Preparing,
        OrderStatus::Ready,
        OrderStatus::Assigned,
        OrderStatus::PickedUp,
        OrderStatus::Enroute,
        OrderStatus::Delivered,
        OrderStatus::Cancelled,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            OrderStatus::Placed => "PLACED",
            OrderStatus::Accepted => "ACCEPTED",
            OrderStatus::Preparing => "PREPARING",
            OrderStatus::Ready => "READY",
            OrderStatus::Assigned => "ASSIGNED",
            OrderStatus::PickedUp => "PICKED_UP",
            OrderStatus::Enroute => "ENROUTE",
            OrderStatus::Delivered => "DELIVERED",
            OrderStatus::Cancelled => "CANCELLED",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, OrderStatus::Delivered | OrderStatus::Cancelled)
    }

    /// The single forward successor in the fulfilment sequence.
    pub fn successor(self) -> Option<OrderStatus> {
        match self {
            OrderStatus::Placed => Some(OrderStatus::Accepted),
            OrderStatus::Accepted => Some(OrderStatus::Preparing),
            OrderStatus::Preparing => Some(OrderStatus::Ready),
            OrderStatus::Ready => Some(OrderStatus::Assigned),
            OrderStatus::Assigned => Some(OrderStatus::PickedUp),
            OrderStatus::PickedUp => Some(OrderStatus::Enroute),
            OrderStatus::Enroute => Some(OrderStatus::Delivered),
            OrderStatus::Delivered | OrderStatus::Cancelled => None,
        }
    }

    /// Adjacency table: the forward successor, or `Cancelled` from any
    /// non-terminal status.
    pub fn can_transition_to(self, target: OrderStatus) -> bool {
        if target == OrderStatus::Cancelled {
            return !self.is_terminal();
        }
        self.successor() == Some(target)
    }

    /// Statuses whose arrival is pushed to the notification service.
    pub fn notifies(self) -> bool {
        matches!(
            self,
            OrderStatus::Ready
                | OrderStatus::Assigned
                | OrderStatus::PickedUp
                | OrderStatus::Enroute
                | OrderStatus::Delivered
        )
    }

    /// Statuses in which an assigned driver is still carrying the order.
    pub fn is_active_delivery(self) -> bool {
        matches!(
            self,
            OrderStatus::Assigned | OrderStatus::PickedUp | OrderStatus::Enroute
        )
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_uppercase();
        OrderStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == wanted)
            .ok_or_else(|| DomainError::InvalidInput(format!("unknown order status '{}'", s)))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentMethod {
    Card,
    Cash,
}

impl PaymentMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            PaymentMethod::Card => "card",
            PaymentMethod::Cash => "cash",
        }
    }
}

impl FromStr for PaymentMethod {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "card" => Ok(PaymentMethod::Card),
            "cash" => Ok(PaymentMethod::Cash),
            other => Err(DomainError::InvalidInput(format!(
                "unsupported payment method '{}'",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectedModifier {
    pub modifier_id: Uuid,
    pub name: String,
    pub price_cents: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderItem {
    pub menu_item_id: Uuid,
    pub quantity: i32,
    pub unit_price_cents: i64,
    pub selected_modifiers: Vec<SelectedModifier>,
}

impl OrderItem {
    /// `(unit price + modifiers) * quantity`, or `None` on overflow.
    pub fn line_total_cents(&self) -> Option<i64> {
        let per_unit = self
            .selected_modifiers
            .iter()
            .try_fold(self.unit_price_cents, |acc, m| acc.checked_add(m.price_cents))?;
        per_unit.checked_mul(i64::from(self.quantity))
    }

    fn validate(&self, position: usize) -> Result<(), DomainError> {
        if self.quantity <= 0 {
            return Err(DomainError::InvalidInput(format!(
                "item {} must have a positive quantity",
                position
            )));
        }
        if self.unit_price_cents < 0 {
            return Err(DomainError::InvalidInput(format!(
                "item {} has a negative unit price",
                position
            )));
        }
        if self.selected_modifiers.iter().any(|m| m.price_cents < 0) {
            return Err(DomainError::InvalidInput(format!(
                "item {} has a modifier with a negative price",
                position
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusHistoryEntry {
    pub status: OrderStatus,
    pub note: Option<String>,
    pub actor_id: Option<Uuid>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewOrder {
    pub customer_id: Uuid,
    pub vendor_id: Uuid,
    pub address_id: Uuid,
    pub payment_method: PaymentMethod,
    pub items: Vec<OrderItem>,
}

impl NewOrder {
    /// Validates the items and returns the order total in cents.
    pub fn total_cents(&self) -> Result<i64, DomainError> {
        if self.items.is_empty() {
            return Err(DomainError::InvalidInput(
                "an order needs at least one item".to_string(),
            ));
        }
        let mut total: i64 = 0;
        for (position, item) in self.items.iter().enumerate() {
            item.validate(position)?;
            total = item
                .line_total_cents()
                .and_then(|line| total.checked_add(line))
                .ok_or_else(|| DomainError::InvalidInput("order total overflows".to_string()))?;
        }
        if total <= 0 {
            return Err(DomainError::InvalidInput(
                "order total must be greater than zero".to_string(),
            ));
        }
        Ok(total)
    }
}

#[derive(Debug, Clone)]
pub struct Order {
    pub id: Uuid,
    pub customer_id: Uuid,
    pub vendor_id: Uuid,
    pub driver_id: Option<Uuid>,
    pub address_id: Uuid,
    pub payment_method: PaymentMethod,
    pub status: OrderStatus,
    pub items: Vec<OrderItem>,
    pub total_cents: i64,
    pub status_history: Vec<StatusHistoryEntry>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    /// Builds a PLACED order with its initial history entry.
    pub fn place(new: NewOrder, now: DateTime<Utc>) -> Result<Self, DomainError> {
        let total_cents = new.total_cents()?;
        Ok(Self {
            id: Uuid::new_v4(),
            customer_id: new.customer_id,
            vendor_id: new.vendor_id,
            driver_id: None,
            address_id: new.address_id,
            payment_method: new.payment_method,
            status: OrderStatus::Placed,
            items: new.items,
            total_cents,
            status_history: vec![StatusHistoryEntry {
                status: OrderStatus::Placed,
                note: None,
                actor_id: Some(new.customer_id),
                timestamp: now,
            }],
            created_at: now,
            updated_at: now,
        })
    }

    /// Moves the order along one edge of the adjacency table. The order is
    /// left untouched when the edge is illegal.
    pub fn transition(
        &mut self,
        target: OrderStatus,
        actor_id: Option<Uuid>,
        note: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<(), DomainError> {
        if !self.status.can_transition_to(target) {
            return Err(DomainError::InvalidTransition {
                from: self.status,
                to: target,
            });
        }
        self.record(target, actor_id, note, now);
        Ok(())
    }

    /// READY -> ASSIGNED together with the driver reference.
    pub fn assign_driver(
        &mut self,
        driver_id: Uuid,
        actor_id: Option<Uuid>,
        now: DateTime<Utc>,
    ) -> Result<(), DomainError> {
        if self.status != OrderStatus::Ready {
            return Err(DomainError::OrderNotReady(self.status));
        }
        self.driver_id = Some(driver_id);
        self.record(
            OrderStatus::Assigned,
            actor_id,
            Some(format!("assigned to driver {}", driver_id)),
            now,
        );
        Ok(())
    }

    fn record(
        &mut self,
        status: OrderStatus,
        actor_id: Option<Uuid>,
        note: Option<String>,
        now: DateTime<Utc>,
    ) {
        self.status = status;
        self.updated_at = now;
        self.status_history.push(StatusHistoryEntry {
            status,
            note,
            actor_id,
            timestamp: now,
        });
    }
}
