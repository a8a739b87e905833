use std::str::FromStr;

use bigdecimal::{BigDecimal, ToPrimitive};
use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::errors::DomainError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentStatus {
    Pending,
    Captured,
    Failed,
}

impl PaymentStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            PaymentStatus::Pending => "PENDING",
            PaymentStatus::Captured => "CAPTURED",
            PaymentStatus::Failed => "FAILED",
        }
    }
}

impl FromStr for PaymentStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(PaymentStatus::Pending),
            "CAPTURED" => Ok(PaymentStatus::Captured),
            "FAILED" => Ok(PaymentStatus::Failed),
            other => Err(DomainError::Internal(format!(
                "unknown payment status '{}'",
                other
            ))),
        }
    }
}

/// Result reported by the payment provider for one intent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentOutcome {
    Succeeded,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentIntent {
    pub id: Uuid,
    pub order_id: Uuid,
    pub provider_payment_id: String,
    pub amount_cents: i64,
    pub currency: String,
    pub status: PaymentStatus,
    pub client_secret: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PaymentIntent {
    /// Settles a PENDING intent. Returns `false` (and changes nothing) when the
    /// intent was already resolved.
    pub fn resolve(&mut self, outcome: PaymentOutcome, now: DateTime<Utc>) -> bool {
        if self.status != PaymentStatus::Pending {
            return false;
        }
        self.status = match outcome {
            PaymentOutcome::Succeeded => PaymentStatus::Captured,
            PaymentOutcome::Failed => PaymentStatus::Failed,
        };
        self.updated_at = now;
        true
    }
}

/// Identifiers minted by the payment provider for a new intent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderPayment {
    pub provider_payment_id: String,
    pub client_secret: String,
}

/// Converts a major-unit amount (e.g. `25.99`) into cents, refusing
/// sub-cent precision and non-positive values.
pub fn amount_to_cents(amount: &BigDecimal) -> Result<i64, DomainError> {
    let cents = amount.clone() * BigDecimal::from(100_i64);
    if cents.with_scale(0) != cents {
        return Err(DomainError::InvalidInput(format!(
            "amount {} has more than two decimal places",
            amount
        )));
    }
    let cents = cents
        .to_i64()
        .ok_or_else(|| DomainError::InvalidInput(format!("amount {} is out of range", amount)))?;
    if cents <= 0 {
        return Err(DomainError::InvalidInput(
            "amount must be greater than zero".to_string(),
        ));
    }
    Ok(cents)
}

/// ISO-4217 style three letter code, stored lowercase.
pub fn normalize_currency(currency: &str) -> Result<String, DomainError> {
    let currency = currency.trim();
    if currency.len() != 3 || !currency.chars().all(|c| c.is_ascii_alphabetic()) {
        return Err(DomainError::InvalidInput(format!(
            "'{}' is not a three letter currency code",
            currency
        )));
    }
    Ok(currency.to_ascii_lowercase())
}
