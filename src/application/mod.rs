pub mod idempotency_guard;
pub mod order_service;
pub mod payment_service;
pub mod signature;
pub mod webhook_ingestor;
