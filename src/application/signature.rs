//! `X-Webhook-Signature: t=<unix_seconds>,v1=<hex hmac_sha256>` verification.
//!
//! The MAC covers the raw payload bytes only. `t` is checked against the
//! tolerance window and is not part of the signed material.

use hmac::{Hmac, Mac};
use sha2::Sha256;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SignatureError {
    #[error("signature header is missing")]
    Missing,
    #[error("malformed signature header: {0}")]
    Malformed(String),
    #[error("timestamp {timestamp} is outside the {tolerance}s tolerance window")]
    Stale { timestamp: i64, tolerance: i64 },
    #[error("signature does not match payload")]
    Mismatch,
}

#[derive(Clone)]
pub struct WebhookVerifier {
    secret: Vec<u8>,
    tolerance_secs: i64,
}

impl WebhookVerifier {
    pub fn new(secret: impl Into<Vec<u8>>, tolerance_secs: i64) -> Self {
        Self {
            secret: secret.into(),
            tolerance_secs,
        }
    }

    fn mac(&self, payload: &[u8]) -> HmacSha256 {
        // HMAC accepts keys of any length.
        let mut mac = match HmacSha256::new_from_slice(&self.secret) {
            Ok(mac) => mac,
            Err(_) => unreachable!("HMAC-SHA256 takes keys of any size"),
        };
        mac.update(payload);
        mac
    }

    /// Header value a provider would send for `payload` at `timestamp`.
    pub fn sign(&self, payload: &[u8], timestamp: i64) -> String {
        let digest = self.mac(payload).finalize().into_bytes();
        format!("t={},v1={}", timestamp, hex::encode(digest))
    }

    pub fn verify(
        &self,
        payload: &[u8],
        header: Option<&str>,
        now: i64,
    ) -> Result<(), SignatureError> {
        let header = header.ok_or(SignatureError::Missing)?;

        let mut timestamp = None;
        let mut candidates = Vec::new();
        for part in header.split(',') {
            match part.trim().split_once('=') {
                Some(("t", value)) => {
                    timestamp = Some(value.parse::<i64>().map_err(|_| {
                        SignatureError::Malformed(format!("bad timestamp '{}'", value))
                    })?)
                }
                Some(("v1", value)) => candidates.push(value),
                _ => {}
            }
        }
        let timestamp =
            timestamp.ok_or_else(|| SignatureError::Malformed("missing t=".to_string()))?;
        if candidates.is_empty() {
            return Err(SignatureError::Malformed("missing v1=".to_string()));
        }

        // `t` is attacker-controlled; abs_diff cannot overflow.
        if now.abs_diff(timestamp) > self.tolerance_secs.unsigned_abs() {
            return Err(SignatureError::Stale {
                timestamp,
                tolerance: self.tolerance_secs,
            });
        }

        let expected = self.mac(payload);
        let matched = candidates.iter().any(|candidate| {
            hex::decode(candidate)
                .map(|digest| expected.clone().verify_slice(&digest).is_ok())
                .unwrap_or(false)
        });
        if matched {
            Ok(())
        } else {
            Err(SignatureError::Mismatch)
        }
    }
}
