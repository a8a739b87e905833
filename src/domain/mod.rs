pub mod errors;
pub mod idempotency;
pub mod order;
pub mod payment;
pub mod policy;
pub mod ports;
pub mod webhook;
