use thiserror::Error;

#[derive(Debug, Error)]
pub enum DomainError {
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("not found")]
    NotFound,
    #[error("plan generator failed: {0}")]
    Upstream(String),
    #[error("storage failure: {0}")]
    Storage(String),
}
