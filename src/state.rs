use std::sync::Arc;
use std::time::Duration;

use actix_web::web;
use chrono::Utc;

use crate::application::idempotency_guard::IdempotencyGuard;
use crate::application::order_service::OrderService;
use crate::application::payment_service::PaymentService;
use crate::application::signature::WebhookVerifier;
use crate::application::webhook_ingestor::WebhookIngestor;
use crate::auth::TokenSigner;
use crate::config::Settings;
use crate::db::DbPool;
use crate::domain::errors::DomainError;
use crate::domain::policy::{MaxActiveDeliveries, TransitionPolicy};
use crate::domain::ports::{
    IdempotencyStore, Notifier, OrderRepository, PaymentGateway, PaymentStore,
};
use crate::infrastructure::gateway::LocalPaymentGateway;
use crate::infrastructure::idempotency_repo::DieselIdempotencyStore;
use crate::infrastructure::in_memory::{
    InMemoryIdempotencyStore, InMemoryOrderRepository, InMemoryPaymentStore,
};
use crate::infrastructure::notifier::{LogNotifier, OutboxNotifier};
use crate::infrastructure::order_repo::DieselOrderRepository;
use crate::infrastructure::payment_repo::DieselPaymentStore;

/// Storage adapters the services are wired from.
pub struct Adapters {
    pub orders: Arc<dyn OrderRepository>,
    pub payments: Arc<dyn PaymentStore>,
    pub idempotency: Arc<dyn IdempotencyStore>,
    pub notifier: Arc<dyn Notifier>,
    pub gateway: Arc<dyn PaymentGateway>,
}

impl Adapters {
    pub fn in_memory() -> Self {
        Self {
            orders: Arc::new(InMemoryOrderRepository::new()),
            payments: Arc::new(InMemoryPaymentStore::new()),
            idempotency: Arc::new(InMemoryIdempotencyStore::new()),
            notifier: Arc::new(LogNotifier),
            gateway: Arc::new(LocalPaymentGateway),
        }
    }

    pub fn postgres(pool: DbPool) -> Self {
        Self {
            orders: Arc::new(DieselOrderRepository::new(pool.clone())),
            payments: Arc::new(DieselPaymentStore::new(pool.clone())),
            idempotency: Arc::new(DieselIdempotencyStore::new(pool.clone())),
            notifier: Arc::new(OutboxNotifier::new(pool)),
            gateway: Arc::new(LocalPaymentGateway),
        }
    }
}

pub struct AppState {
    pub orders: Arc<OrderService>,
    pub payments: Arc<PaymentService>,
    pub webhooks: Arc<WebhookIngestor>,
    pub idempotency: Arc<IdempotencyGuard>,
    pub tokens: TokenSigner,
    payment_store: Arc<dyn PaymentStore>,
    webhook_retention: Duration,
}

impl AppState {
    pub fn new(settings: &Settings, adapters: Adapters) -> Self {
        let orders = Arc::new(OrderService::new(
            adapters.orders.clone(),
            adapters.payments.clone(),
            adapters.notifier,
            Arc::new(MaxActiveDeliveries(settings.max_active_deliveries)),
            TransitionPolicy::new(settings.cancellation_policy.clone()),
            settings.order_lock_timeout,
        ));
        let payments = Arc::new(PaymentService::new(
            adapters.orders,
            adapters.payments.clone(),
            adapters.gateway,
        ));
        let webhooks = Arc::new(WebhookIngestor::new(
            WebhookVerifier::new(settings.webhook_secret.as_bytes(), settings.webhook_tolerance_secs),
            adapters.payments.clone(),
            payments.clone(),
            settings.webhook_timeout,
        ));

        Self {
            orders,
            payments,
            webhooks,
            idempotency: Arc::new(IdempotencyGuard::new(
                adapters.idempotency,
                settings.idempotency_retention,
            )),
            tokens: TokenSigner::new(settings.auth_secret.as_bytes()),
            payment_store: adapters.payments,
            webhook_retention: settings.webhook_retention,
        }
    }

    /// Deletes expired idempotency records and processed webhook ledger rows.
    /// Returns how many of each were removed.
    pub fn prune_expired(&self) -> Result<(usize, usize), DomainError> {
        let keys = self.idempotency.prune_expired()?;
        let retention = chrono::Duration::from_std(self.webhook_retention)
            .map_err(|e| DomainError::Internal(format!("retention out of range: {}", e)))?;
        let events = self.payment_store.prune_events(Utc::now() - retention)?;
        Ok((keys, events))
    }
}

/// Runs `prune_expired` every `period` until the runtime shuts down.
pub fn spawn_pruner(state: web::Data<AppState>, period: Duration) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        // The first tick completes immediately.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let state = state.clone();
            match tokio::task::spawn_blocking(move || state.prune_expired()).await {
                Ok(Ok((keys, events))) if keys + events > 0 => log::info!(
                    "Pruned {} idempotency records and {} webhook events",
                    keys,
                    events
                ),
                Ok(Ok(_)) => {}
                Ok(Err(e)) => log::error!("Ledger pruning failed: {}", e),
                Err(e) => log::error!("Ledger pruning task crashed: {}", e),
            }
        }
    })
}
