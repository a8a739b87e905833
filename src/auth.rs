//! Bearer tokens of the form `<role>.<actor-uuid>.<expires-unix>.<hex hmac>`.

use std::future::{ready, Ready};

use actix_web::{dev::Payload, http::header, web, FromRequest, HttpRequest};
use chrono::Utc;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use thiserror::Error;
use uuid::Uuid;

use crate::domain::policy::{Actor, Role};
use crate::errors::AppError;

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AuthError {
    #[error("missing bearer token")]
    Missing,
    #[error("malformed bearer token")]
    Malformed,
    #[error("invalid token signature")]
    BadSignature,
    #[error("token expired")]
    Expired,
}

#[derive(Clone)]
pub struct TokenSigner {
    secret: Vec<u8>,
}

impl TokenSigner {
    pub fn new(secret: impl Into<Vec<u8>>) -> Self {
        Self {
            secret: secret.into(),
        }
    }

    fn mac(&self, claims: &str) -> HmacSha256 {
        let mut mac = match HmacSha256::new_from_slice(&self.secret) {
            Ok(mac) => mac,
            Err(_) => unreachable!("HMAC-SHA256 takes keys of any size"),
        };
        mac.update(claims.as_bytes());
        mac
    }

    pub fn issue(&self, actor: &Actor, expires_at: i64) -> String {
        let claims = format!("{}.{}.{}", actor.role, actor.id, expires_at);
        let digest = self.mac(&claims).finalize().into_bytes();
        format!("{}.{}", claims, hex::encode(digest))
    }

    pub fn verify(&self, token: &str, now: i64) -> Result<Actor, AuthError> {
        let (claims, signature) = token.rsplit_once('.').ok_or(AuthError::Malformed)?;
        let mut parts = claims.splitn(3, '.');
        let (Some(role), Some(id), Some(expires_at)) = (parts.next(), parts.next(), parts.next())
        else {
            return Err(AuthError::Malformed);
        };

        let signature = hex::decode(signature).map_err(|_| AuthError::Malformed)?;
        self.mac(claims)
            .verify_slice(&signature)
            .map_err(|_| AuthError::BadSignature)?;

        let expires_at: i64 = expires_at.parse().map_err(|_| AuthError::Malformed)?;
        if expires_at <= now {
            return Err(AuthError::Expired);
        }
        let role: Role = role.parse().map_err(|_| AuthError::Malformed)?;
        let id = Uuid::parse_str(id).map_err(|_| AuthError::Malformed)?;
        Ok(Actor::new(role, id))
    }
}

/// Extracts and verifies the caller from `Authorization: Bearer <token>`.
pub struct AuthenticatedActor(pub Actor);

impl FromRequest for AuthenticatedActor {
    type Error = AppError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        ready(authenticate(req).map(AuthenticatedActor))
    }
}

fn authenticate(req: &HttpRequest) -> Result<Actor, AppError> {
    let signer = req
        .app_data::<web::Data<TokenSigner>>()
        .ok_or_else(|| AppError::Internal("token signer is not configured".to_string()))?;
    let token = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .ok_or(AuthError::Missing)?;
    let actor = signer.verify(token, Utc::now().timestamp())?;
    Ok(actor)
}
