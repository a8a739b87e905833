use std::collections::{HashMap, HashSet};
use std::fmt;
use std::str::FromStr;

use uuid::Uuid;

use super::errors::DomainError;
use super::order::{Order, OrderStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    Customer,
    Vendor,
    Driver,
    Admin,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::Customer => "customer",
            Role::Vendor => "vendor",
            Role::Driver => "driver",
            Role::Admin => "admin",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "customer" => Ok(Role::Customer),
            "vendor" => Ok(Role::Vendor),
            "driver" => Ok(Role::Driver),
            "admin" => Ok(Role::Admin),
            other => Err(DomainError::InvalidInput(format!("unknown role '{}'", other))),
        }
    }
}

/// An authenticated caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Actor {
    pub id: Uuid,
    pub role: Role,
}

impl Actor {
    pub fn new(role: Role, id: Uuid) -> Self {
        Self { id, role }
    }

    /// Whether this actor is the party of `order` that its role refers to.
    fn owns(&self, order: &Order) -> bool {
        match self.role {
            Role::Admin => true,
            Role::Customer => order.customer_id == self.id,
            Role::Vendor => order.vendor_id == self.id,
            Role::Driver => order.driver_id == Some(self.id),
        }
    }
}

/// Which roles may cancel from which statuses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CancellationPolicy {
    allowed: HashMap<Role, HashSet<OrderStatus>>,
}

impl CancellationPolicy {
    pub fn allows(&self, role: Role, from: OrderStatus) -> bool {
        self.allowed
            .get(&role)
            .is_some_and(|statuses| statuses.contains(&from))
    }

    /// Parses `role=STATUS,STATUS;role=*` where `*` stands for every
    /// non-terminal status. Roles that are not listed may not cancel.
    pub fn parse(raw: &str) -> Result<Self, DomainError> {
        let mut allowed = HashMap::new();
        for clause in raw.split(';').map(str::trim).filter(|c| !c.is_empty()) {
            let (role, statuses) = clause.split_once('=').ok_or_else(|| {
                DomainError::InvalidInput(format!("cancellation clause '{}' lacks '='", clause))
            })?;
            let role: Role = role.parse()?;
            let mut set = HashSet::new();
            for status in statuses.split(',').map(str::trim).filter(|s| !s.is_empty()) {
                if status == "*" {
                    set.extend(OrderStatus::ALL.into_iter().filter(|s| !s.is_terminal()));
                    continue;
                }
                let status: OrderStatus = status.parse()?;
                if status.is_terminal() {
                    return Err(DomainError::InvalidInput(format!(
                        "cannot cancel from terminal status {}",
                        status
                    )));
                }
                set.insert(status);
            }
            allowed.insert(role, set);
        }
        Ok(Self { allowed })
    }
}

impl Default for CancellationPolicy {
    fn default() -> Self {
        Self::parse(DEFAULT_CANCELLATION_POLICY).unwrap_or_else(|_| Self {
            allowed: HashMap::new(),
        })
    }
}

pub const DEFAULT_CANCELLATION_POLICY: &str =
    "customer=PLACED;vendor=PLACED,ACCEPTED,PREPARING,READY;driver=;admin=*";

/// Role checks for every status edge.
#[derive(Debug, Clone, Default)]
pub struct TransitionPolicy {
    pub cancellation: CancellationPolicy,
}

impl TransitionPolicy {
    pub fn new(cancellation: CancellationPolicy) -> Self {
        Self { cancellation }
    }

    /// Assumes the edge itself is already known to be legal.
    pub fn authorize_transition(
        &self,
        order: &Order,
        target: OrderStatus,
        actor: &Actor,
    ) -> Result<(), DomainError> {
        let permitted = match target {
            OrderStatus::Cancelled => self.cancellation.allows(actor.role, order.status),
            OrderStatus::Accepted | OrderStatus::Preparing | OrderStatus::Ready => {
                matches!(actor.role, Role::Vendor | Role::Admin)
            }
            OrderStatus::PickedUp | OrderStatus::Enroute | OrderStatus::Delivered => {
                matches!(actor.role, Role::Driver | Role::Admin)
            }
            OrderStatus::Placed | OrderStatus::Assigned => false,
        };
        if !permitted {
            return Err(DomainError::Forbidden(format!(
                "{} may not move an order from {} to {}",
                actor.role, order.status, target
            )));
        }
        if !actor.owns(order) {
            return Err(DomainError::Forbidden(format!(
                "{} {} is not a party to order {}",
                actor.role, actor.id, order.id
            )));
        }
        Ok(())
    }

    pub fn authorize_assignment(
        &self,
        order: &Order,
        driver_id: Uuid,
        actor: &Actor,
    ) -> Result<(), DomainError> {
        let permitted = match actor.role {
            Role::Admin => true,
            Role::Vendor => order.vendor_id == actor.id,
            Role::Driver => driver_id == actor.id,
            Role::Customer => false,
        };
        if permitted {
            Ok(())
        } else {
            Err(DomainError::Forbidden(format!(
                "{} {} may not assign drivers to order {}",
                actor.role, actor.id, order.id
            )))
        }
    }
}

/// Driver capacity rule consulted before an assignment.
pub trait DriverCapacity: Send + Sync + 'static {
    fn has_capacity(&self, driver_id: Uuid, active_deliveries: usize) -> bool;
}

#[derive(Debug, Clone, Copy)]
pub struct MaxActiveDeliveries(pub usize);

impl DriverCapacity for MaxActiveDeliveries {
    fn has_capacity(&self, _driver_id: Uuid, active_deliveries: usize) -> bool {
        active_deliveries < self.0
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::domain::order::{NewOrder, OrderItem, PaymentMethod};

    fn order_at(status: OrderStatus) -> Order {
        let mut order = Order::place(
            NewOrder {
                customer_id: Uuid::new_v4(),
                vendor_id: Uuid::new_v4(),
                address_id: Uuid::new_v4(),
                payment_method: PaymentMethod::Cash,
                items: vec![OrderItem {
                    menu_item_id: Uuid::new_v4(),
                    quantity: 1,
                    unit_price_cents: 500,
                    selected_modifiers: vec![],
                }],
            },
            Utc::now(),
        )
        .unwrap();
        order.status = status;
        order
    }

    #[test]
    fn default_policy_matches_documented_table() {
        let policy = CancellationPolicy::default();
        assert!(policy.allows(Role::Customer, OrderStatus::Placed));
        assert!(!policy.allows(Role::Customer, OrderStatus::Accepted));
        assert!(policy.allows(Role::Vendor, OrderStatus::Ready));
        assert!(!policy.allows(Role::Vendor, OrderStatus::Assigned));
        assert!(!policy.allows(Role::Driver, OrderStatus::Enroute));
        assert!(policy.allows(Role::Admin, OrderStatus::Enroute));
        assert!(!policy.allows(Role::Admin, OrderStatus::Delivered));
    }

    #[test]
    fn parse_rejects_terminal_sources_and_bad_roles() {
        assert!(CancellationPolicy::parse("vendor=DELIVERED").is_err());
        assert!(CancellationPolicy::parse("courier=PLACED").is_err());
        assert!(CancellationPolicy::parse("vendor").is_err());
    }

    #[test]
    fn vendor_drives_kitchen_edges_of_own_orders_only() {
        let policy = TransitionPolicy::default();
        let order = order_at(OrderStatus::Placed);
        let owner = Actor::new(Role::Vendor, order.vendor_id);
        let stranger = Actor::new(Role::Vendor, Uuid::new_v4());

        assert!(policy
            .authorize_transition(&order, OrderStatus::Accepted, &owner)
            .is_ok());
        assert!(matches!(
            policy.authorize_transition(&order, OrderStatus::Accepted, &stranger),
            Err(DomainError::Forbidden(_))
        ));
    }

    #[test]
    fn driver_edges_require_the_assigned_driver() {
        let policy = TransitionPolicy::default();
        let mut order = order_at(OrderStatus::Assigned);
        let driver = Uuid::new_v4();
        order.driver_id = Some(driver);

        assert!(policy
            .authorize_transition(&order, OrderStatus::PickedUp, &Actor::new(Role::Driver, driver))
            .is_ok());
        assert!(policy
            .authorize_transition(
                &order,
                OrderStatus::PickedUp,
                &Actor::new(Role::Driver, Uuid::new_v4())
            )
            .is_err());
        assert!(policy
            .authorize_transition(
                &order,
                OrderStatus::PickedUp,
                &Actor::new(Role::Vendor, order.vendor_id)
            )
            .is_err());
    }

    #[test]
    fn customers_cannot_drive_forward_edges() {
        let policy = TransitionPolicy::default();
        let order = order_at(OrderStatus::Placed);
        let customer = Actor::new(Role::Customer, order.customer_id);
        assert!(policy
            .authorize_transition(&order, OrderStatus::Accepted, &customer)
            .is_err());
        assert!(policy
            .authorize_transition(&order, OrderStatus::Cancelled, &customer)
            .is_ok());
    }

    #[test]
    fn drivers_may_only_assign_themselves() {
        let policy = TransitionPolicy::default();
        let order = order_at(OrderStatus::Ready);
        let driver = Uuid::new_v4();
        let actor = Actor::new(Role::Driver, driver);
        assert!(policy.authorize_assignment(&order, driver, &actor).is_ok());
        assert!(policy
            .authorize_assignment(&order, Uuid::new_v4(), &actor)
            .is_err());
    }

    #[test]
    fn capacity_limit_is_exclusive() {
        let capacity = MaxActiveDeliveries(2);
        assert!(capacity.has_capacity(Uuid::new_v4(), 1));
        assert!(!capacity.has_capacity(Uuid::new_v4(), 2));
    }
}
