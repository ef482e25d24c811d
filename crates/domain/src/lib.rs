pub mod applications;
pub mod auth;
pub mod error;
pub mod idempotency;
pub mod identity;
pub mod permissions;
pub mod ports;
pub mod util;
pub mod workflow;

pub type DomainResult<T> = Result<T, error::DomainError>;
