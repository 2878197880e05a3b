use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DomainError {
    #[error("validation error: {0}")]
    Validation(String),
    #[error("state error: {0}")]
    State(String),
}
