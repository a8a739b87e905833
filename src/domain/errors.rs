use thiserror::Error;
use uuid::Uuid;

use super::order::OrderStatus;

#[derive(Debug, Error)]
pub enum DomainError {
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    #[error("Invalid transition from {from} to {to}")]
    InvalidTransition { from: OrderStatus, to: OrderStatus },
    #[error("Order is {0}, drivers can only be assigned to READY orders")]
    OrderNotReady(OrderStatus),
    #[error("Driver {0} has no free delivery capacity")]
    DriverUnavailable(Uuid),
    #[error("Forbidden: {0}")]
    Forbidden(String),
    #[error("Amount mismatch: order total is {expected} cents, requested {requested} cents")]
    AmountMismatch { expected: i64, requested: i64 },
    #[error("Order already has an active payment intent")]
    PaymentAlreadyActive,
    #[error("Payment has not been captured for this order")]
    PaymentNotCaptured,
    #[error("Order is {0} and can no longer be paid")]
    OrderNotPayable(OrderStatus),
    #[error("A request with this idempotency key is still in progress")]
    IdempotencyConflict,
    #[error("Order is busy, retry later")]
    Busy,
    #[error("Internal error: {0}")]
    Internal(String),
}
