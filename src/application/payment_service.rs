use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;

use crate::domain::errors::DomainError;
use crate::domain::payment::{normalize_currency, PaymentIntent, PaymentOutcome, PaymentStatus};
use crate::domain::policy::{Actor, Role};
use crate::domain::ports::{OrderRepository, PaymentGateway, PaymentStore};
use crate::domain::webhook::{ApplyResult, ProviderEffect};

/// Tracks payment intents against orders. Intent status is independent of
/// order status: capture never moves the order.
pub struct PaymentService {
    orders: Arc<dyn OrderRepository>,
    store: Arc<dyn PaymentStore>,
    gateway: Arc<dyn PaymentGateway>,
}

impl PaymentService {
    pub fn new(
        orders: Arc<dyn OrderRepository>,
        store: Arc<dyn PaymentStore>,
        gateway: Arc<dyn PaymentGateway>,
    ) -> Self {
        Self {
            orders,
            store,
            gateway,
        }
    }

    pub fn create_intent(
        &self,
        actor: &Actor,
        order_id: Uuid,
        amount_cents: i64,
        currency: &str,
    ) -> Result<PaymentIntent, DomainError> {
        let currency = normalize_currency(currency)?;
        let order = self
            .orders
            .find_by_id(order_id)?
            .ok_or(DomainError::NotFound("order"))?;

        let may_pay = match actor.role {
            Role::Admin => true,
            Role::Customer => order.customer_id == actor.id,
            Role::Vendor | Role::Driver => false,
        };
        if !may_pay {
            return Err(DomainError::Forbidden(
                "only the ordering customer may pay for an order".to_string(),
            ));
        }
        if order.status.is_terminal() {
            return Err(DomainError::OrderNotPayable(order.status));
        }
        if amount_cents != order.total_cents {
            return Err(DomainError::AmountMismatch {
                expected: order.total_cents,
                requested: amount_cents,
            });
        }

        let provider = self
            .gateway
            .create_payment(order.id, amount_cents, &currency)?;
        let now = Utc::now();
        let intent = PaymentIntent {
            id: Uuid::new_v4(),
            order_id: order.id,
            provider_payment_id: provider.provider_payment_id,
            amount_cents,
            currency,
            status: PaymentStatus::Pending,
            client_secret: provider.client_secret,
            created_at: now,
            updated_at: now,
        };
        self.store.insert_intent(&intent)?;
        log::info!(
            "Payment intent {} ({}) created for order {}: {} {}",
            intent.id,
            intent.provider_payment_id,
            intent.order_id,
            intent.amount_cents,
            intent.currency
        );
        Ok(intent)
    }

    /// Reads an intent. Customers only see intents of their own orders.
    pub fn get_intent(&self, actor: &Actor, id: Uuid) -> Result<PaymentIntent, DomainError> {
        let intent = self
            .store
            .find_intent(id)?
            .ok_or(DomainError::NotFound("payment intent"))?;
        if actor.role == Role::Admin {
            return Ok(intent);
        }
        let order = self
            .orders
            .find_by_id(intent.order_id)?
            .ok_or(DomainError::NotFound("order"))?;
        let visible = match actor.role {
            Role::Customer => order.customer_id == actor.id,
            Role::Vendor => order.vendor_id == actor.id,
            Role::Driver | Role::Admin => false,
        };
        if visible {
            Ok(intent)
        } else {
            Err(DomainError::NotFound("payment intent"))
        }
    }

    /// Applies a provider outcome to the matching PENDING intent. Unknown or
    /// already resolved intents are a no-op that reports the current state.
    pub fn apply_provider_event(
        &self,
        order_id: Option<Uuid>,
        provider_payment_id: &str,
        outcome: PaymentOutcome,
    ) -> Result<Option<PaymentIntent>, DomainError> {
        let resolved =
            self.store
                .resolve_intent(provider_payment_id, order_id, outcome, Utc::now())?;
        Ok(resolved.map(|(intent, changed)| {
            log_resolution(&intent, changed);
            intent
        }))
    }

    /// Applies a webhook's effect and marks its ledger row processed together.
    pub fn apply_webhook_event(
        &self,
        event_id: &str,
        effect: Option<&ProviderEffect>,
    ) -> Result<ApplyResult, DomainError> {
        let result = self.store.apply_delivery(event_id, effect, Utc::now())?;
        match (&result, effect) {
            (ApplyResult::Applied { intent: Some(intent), changed }, _) => {
                log_resolution(intent, *changed)
            }
            (ApplyResult::Applied { intent: None, .. }, Some(effect)) => log::warn!(
                "Webhook {} references unknown provider payment {}",
                event_id,
                effect.provider_payment_id
            ),
            _ => {}
        }
        Ok(result)
    }
}

fn log_resolution(intent: &PaymentIntent, changed: bool) {
    if changed {
        log::info!(
            "Payment intent {} for order {} is now {}",
            intent.id,
            intent.order_id,
            intent.status.as_str()
        );
    } else {
        log::debug!(
            "Payment intent {} already {}, provider outcome ignored",
            intent.id,
            intent.status.as_str()
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::order::{NewOrder, Order, OrderItem, OrderStatus, PaymentMethod};
    use crate::infrastructure::gateway::LocalPaymentGateway;
    use crate::infrastructure::in_memory::{InMemoryOrderRepository, InMemoryPaymentStore};

    struct Fixture {
        service: PaymentService,
        orders: Arc<InMemoryOrderRepository>,
        customer: Actor,
    }

    fn fixture() -> Fixture {
        let orders = Arc::new(InMemoryOrderRepository::new());
        let service = PaymentService::new(
            orders.clone(),
            Arc::new(InMemoryPaymentStore::new()),
            Arc::new(LocalPaymentGateway),
        );
        Fixture {
            service,
            orders,
            customer: Actor::new(Role::Customer, Uuid::new_v4()),
        }
    }

    impl Fixture {
        fn order(&self, unit_price_cents: i64) -> Order {
            let order = Order::place(
                NewOrder {
                    customer_id: self.customer.id,
                    vendor_id: Uuid::new_v4(),
                    address_id: Uuid::new_v4(),
                    payment_method: PaymentMethod::Card,
                    items: vec![OrderItem {
                        menu_item_id: Uuid::new_v4(),
                        quantity: 1,
                        unit_price_cents,
                        selected_modifiers: vec![],
                    }],
                },
                Utc::now(),
            )
            .unwrap();
            self.orders.insert(&order).unwrap();
            order
        }
    }

    #[test]
    fn intent_for_matching_amount_is_pending() {
        let f = fixture();
        let order = f.order(2599);
        let intent = f
            .service
            .create_intent(&f.customer, order.id, 2599, "USD")
            .unwrap();
        assert_eq!(intent.status, PaymentStatus::Pending);
        assert_eq!(intent.currency, "usd");
        assert!(intent.provider_payment_id.starts_with("pi_"));
        assert!(intent.client_secret.starts_with(&intent.provider_payment_id));
    }

    #[test]
    fn amount_mismatch_is_rejected_before_creation() {
        let f = fixture();
        let order = f.order(2599);
        let err = f
            .service
            .create_intent(&f.customer, order.id, 2500, "usd")
            .unwrap_err();
        assert!(matches!(
            err,
            DomainError::AmountMismatch {
                expected: 2599,
                requested: 2500
            }
        ));
        // No intent was stored, so a correct one can still be created.
        f.service
            .create_intent(&f.customer, order.id, 2599, "usd")
            .unwrap();
    }

    #[test]
    fn other_customers_cannot_pay() {
        let f = fixture();
        let order = f.order(1000);
        let stranger = Actor::new(Role::Customer, Uuid::new_v4());
        assert!(matches!(
            f.service.create_intent(&stranger, order.id, 1000, "usd"),
            Err(DomainError::Forbidden(_))
        ));
    }

    #[test]
    fn cancelled_orders_cannot_be_paid() {
        let f = fixture();
        let mut order = f.order(1000);
        order
            .transition(OrderStatus::Cancelled, None, None, Utc::now())
            .unwrap();
        f.orders
            .update_locked(order.id, std::time::Duration::from_millis(50), &mut |o| {
                *o = order.clone();
                Ok(())
            })
            .unwrap();
        assert!(matches!(
            f.service.create_intent(&f.customer, order.id, 1000, "usd"),
            Err(DomainError::OrderNotPayable(OrderStatus::Cancelled))
        ));
    }

    #[test]
    fn provider_outcome_applies_once() {
        let f = fixture();
        let order = f.order(2599);
        let intent = f
            .service
            .create_intent(&f.customer, order.id, 2599, "usd")
            .unwrap();

        let captured = f
            .service
            .apply_provider_event(Some(order.id), &intent.provider_payment_id, PaymentOutcome::Succeeded)
            .unwrap()
            .unwrap();
        assert_eq!(captured.status, PaymentStatus::Captured);

        let again = f
            .service
            .apply_provider_event(Some(order.id), &intent.provider_payment_id, PaymentOutcome::Failed)
            .unwrap()
            .unwrap();
        assert_eq!(again.status, PaymentStatus::Captured);
    }

    #[test]
    fn unknown_provider_payment_is_a_no_op() {
        let f = fixture();
        let result = f
            .service
            .apply_provider_event(None, "pi_unknown", PaymentOutcome::Succeeded)
            .unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn failed_payment_allows_a_new_intent() {
        let f = fixture();
        let order = f.order(1500);
        let first = f
            .service
            .create_intent(&f.customer, order.id, 1500, "usd")
            .unwrap();
        assert!(matches!(
            f.service.create_intent(&f.customer, order.id, 1500, "usd"),
            Err(DomainError::PaymentAlreadyActive)
        ));

        f.service
            .apply_provider_event(None, &first.provider_payment_id, PaymentOutcome::Failed)
            .unwrap();
        let retry = f
            .service
            .create_intent(&f.customer, order.id, 1500, "usd")
            .unwrap();
        assert_ne!(retry.id, first.id);
        assert_eq!(
            f.orders.find_by_id(order.id).unwrap().unwrap().status,
            OrderStatus::Placed
        );
    }

    #[test]
    fn intents_are_hidden_from_unrelated_customers() {
        let f = fixture();
        let order = f.order(900);
        let intent = f
            .service
            .create_intent(&f.customer, order.id, 900, "eur")
            .unwrap();
        let stranger = Actor::new(Role::Customer, Uuid::new_v4());
        assert!(matches!(
            f.service.get_intent(&stranger, intent.id),
            Err(DomainError::NotFound(_))
        ));
        assert_eq!(f.service.get_intent(&f.customer, intent.id).unwrap().id, intent.id);
    }
}
