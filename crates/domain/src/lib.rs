pub mod auth;
pub mod error;
pub mod identity;
pub mod intake;
pub mod plan;
pub mod ports;
pub mod util;

pub type DomainResult<T> = Result<T, error::DomainError>;
