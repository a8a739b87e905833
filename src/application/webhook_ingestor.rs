use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use thiserror::Error;

use super::payment_service::PaymentService;
use super::signature::{SignatureError, WebhookVerifier};
use crate::domain::errors::DomainError;
use crate::domain::ports::PaymentStore;
use crate::domain::webhook::{ApplyResult, Delivery, ProviderEvent, WebhookEventRecord};

#[derive(Debug, Error)]
pub enum WebhookError {
    #[error("invalid signature: {0}")]
    Signature(#[from] SignatureError),
    #[error("malformed event payload: {0}")]
    MalformedPayload(String),
    #[error("could not record delivery: {0}")]
    Ledger(DomainError),
}

/// How a verified delivery was handled. All of these are acknowledged to the
/// provider with a success status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngestOutcome {
    /// The event's effect landed during this delivery.
    Processed { event_id: String },
    /// The event had already been processed; nothing was reapplied.
    Duplicate { event_id: String },
    /// Recorded, but the apply step timed out or failed. The ledger row stays
    /// unprocessed so the provider's redelivery retries it.
    Deferred { event_id: String },
}

/// Verify → deduplicate → apply → acknowledge, per inbound delivery.
pub struct WebhookIngestor {
    verifier: WebhookVerifier,
    store: Arc<dyn PaymentStore>,
    payments: Arc<PaymentService>,
    apply_timeout: Duration,
}

impl WebhookIngestor {
    pub fn new(
        verifier: WebhookVerifier,
        store: Arc<dyn PaymentStore>,
        payments: Arc<PaymentService>,
        apply_timeout: Duration,
    ) -> Self {
        Self {
            verifier,
            store,
            payments,
            apply_timeout,
        }
    }

    pub async fn ingest(
        &self,
        payload: &[u8],
        signature: Option<&str>,
    ) -> Result<IngestOutcome, WebhookError> {
        if let Err(e) = self
            .verifier
            .verify(payload, signature, Utc::now().timestamp())
        {
            log::warn!("Rejected webhook delivery: {}", e);
            return Err(e.into());
        }

        let event: ProviderEvent = serde_json::from_slice(payload)
            .map_err(|e| WebhookError::MalformedPayload(e.to_string()))?;
        if event.id.trim().is_empty() {
            return Err(WebhookError::MalformedPayload("empty event id".to_string()));
        }
        let event_id = event.id.clone();

        let record = WebhookEventRecord::received(&event, Utc::now());
        let store = self.store.clone();
        let delivery = tokio::task::spawn_blocking(move || store.record_delivery(&record))
            .await
            .map_err(|e| WebhookError::Ledger(DomainError::Internal(e.to_string())))?
            .map_err(WebhookError::Ledger)?;

        if delivery == Delivery::Duplicate {
            log::info!("Webhook {} already processed, acknowledging", event_id);
            return Ok(IngestOutcome::Duplicate { event_id });
        }
        if delivery == Delivery::Retry {
            log::info!("Webhook {} redelivered before it was applied, retrying", event_id);
        }

        let payments = self.payments.clone();
        let apply_event_id = event_id.clone();
        let effect = event.effect();
        let apply = tokio::task::spawn_blocking(move || {
            payments.apply_webhook_event(&apply_event_id, effect.as_ref())
        });

        // The blocking task keeps running if we stop waiting for it.
        match tokio::time::timeout(self.apply_timeout, apply).await {
            Ok(Ok(Ok(ApplyResult::Applied { .. }))) => {
                Ok(IngestOutcome::Processed { event_id })
            }
            Ok(Ok(Ok(ApplyResult::AlreadyProcessed))) => {
                Ok(IngestOutcome::Duplicate { event_id })
            }
            Ok(Ok(Err(e))) => {
                log::error!(
                    "ALERT webhook {} ({}) failed to apply, awaiting redelivery: {}",
                    event_id,
                    event.event_type,
                    e
                );
                Ok(IngestOutcome::Deferred { event_id })
            }
            Ok(Err(join_err)) => {
                log::error!(
                    "ALERT webhook {} apply task crashed, awaiting redelivery: {}",
                    event_id,
                    join_err
                );
                Ok(IngestOutcome::Deferred { event_id })
            }
            Err(_) => {
                log::warn!(
                    "Webhook {} still applying after {:?}, acknowledging early",
                    event_id,
                    self.apply_timeout
                );
                Ok(IngestOutcome::Deferred { event_id })
            }
        }
    }
}
