use uuid::Uuid;

use crate::domain::errors::DomainError;
use crate::domain::payment::ProviderPayment;
use crate::domain::ports::PaymentGateway;

/// Mints provider identifiers locally. The real provider learns about the
/// payment when the client confirms it with the returned secret.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalPaymentGateway;

impl PaymentGateway for LocalPaymentGateway {
    fn create_payment(
        &self,
        order_id: Uuid,
        amount_cents: i64,
        currency: &str,
    ) -> Result<ProviderPayment, DomainError> {
        let provider_payment_id = format!("pi_{}", Uuid::new_v4().simple());
        let client_secret = format!("{}_secret_{}", provider_payment_id, Uuid::new_v4().simple());
        log::debug!(
            "Minted {} for order {} ({} {})",
            provider_payment_id,
            order_id,
            amount_cents,
            currency
        );
        Ok(ProviderPayment {
            provider_payment_id,
            client_secret,
        })
    }
}
