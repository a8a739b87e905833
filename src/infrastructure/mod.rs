pub mod gateway;
pub mod idempotency_repo;
pub mod in_memory;
pub mod models;
pub mod notifier;
pub mod order_repo;
pub mod payment_repo;
