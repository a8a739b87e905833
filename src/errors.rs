use actix_web::http::StatusCode;
use actix_web::HttpResponse;
use thiserror::Error;

use crate::application::signature::SignatureError;
use crate::application::webhook_ingestor::WebhookError;
use crate::auth::AuthError;
use crate::domain::errors::DomainError;
use crate::handlers::ApiResponse;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    ServiceUnavailable(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<DomainError> for AppError {
    fn from(e: DomainError) -> Self {
        let message = e.to_string();
        match e {
            DomainError::NotFound(_) => AppError::NotFound(message),
            DomainError::InvalidInput(_)
            | DomainError::InvalidTransition { .. }
            | DomainError::OrderNotReady(_)
            | DomainError::AmountMismatch { .. } => AppError::BadRequest(message),
            DomainError::Forbidden(_) => AppError::Forbidden(message),
            DomainError::DriverUnavailable(_)
            | DomainError::PaymentAlreadyActive
            | DomainError::PaymentNotCaptured
            | DomainError::OrderNotPayable(_)
            | DomainError::IdempotencyConflict => AppError::Conflict(message),
            DomainError::Busy => AppError::ServiceUnavailable(message),
            DomainError::Internal(msg) => AppError::Internal(msg),
        }
    }
}

impl From<AuthError> for AppError {
    fn from(e: AuthError) -> Self {
        AppError::Unauthorized(e.to_string())
    }
}

impl From<WebhookError> for AppError {
    fn from(e: WebhookError) -> Self {
        match e {
            WebhookError::Signature(SignatureError::Malformed(_)) => {
                AppError::BadRequest(e.to_string())
            }
            WebhookError::Signature(_) => AppError::Unauthorized(e.to_string()),
            WebhookError::MalformedPayload(_) => AppError::BadRequest(e.to_string()),
            WebhookError::Ledger(inner) => inner.into(),
        }
    }
}

impl From<actix_web::error::BlockingError> for AppError {
    fn from(e: actix_web::error::BlockingError) -> Self {
        AppError::Internal(e.to_string())
    }
}

impl actix_web::ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let message = match self {
            AppError::Internal(detail) => {
                log::error!("Request failed: {}", detail);
                "Internal server error".to_string()
            }
            other => other.to_string(),
        };
        HttpResponse::build(self.status_code()).json(ApiResponse::<()>::failure(message))
    }
}
