use chrono::{DateTime, Utc};
use serde_json::Value;

use super::errors::DomainError;

pub const MAX_KEY_LEN: usize = 255;

/// The response produced by the first execution of an idempotent request.
#[derive(Debug, Clone, PartialEq)]
pub struct ResultSnapshot {
    pub status: u16,
    pub body: Value,
}

impl ResultSnapshot {
    pub fn new(status: u16, body: Value) -> Self {
        Self { status, body }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct IdempotencyRecord {
    pub key: String,
    pub endpoint_fingerprint: String,
    /// `None` while the first execution is still running.
    pub result: Option<ResultSnapshot>,
    pub created_at: DateTime<Utc>,
}

/// Outcome of trying to claim `(key, endpoint_fingerprint)`.
#[derive(Debug, Clone, PartialEq)]
pub enum Claim {
    /// The caller owns the key and must execute the operation.
    Acquired,
    /// A previous execution finished; replay its result.
    Completed(ResultSnapshot),
    /// Another execution holds the key right now.
    InFlight,
}

pub fn validate_key(key: &str) -> Result<(), DomainError> {
    if key.trim().is_empty() {
        return Err(DomainError::InvalidInput(
            "Idempotency-Key must not be blank".to_string(),
        ));
    }
    if key.len() > MAX_KEY_LEN {
        return Err(DomainError::InvalidInput(format!(
            "Idempotency-Key must be at most {} bytes",
            MAX_KEY_LEN
        )));
    }
    Ok(())
}
