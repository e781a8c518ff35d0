//! Actuation error types.

use thiserror::Error;

/// Errors that can occur while wiring up actuation components.
#[derive(Debug, Error)]
pub enum ActuationError {
    #[error("no tokio runtime available: {0}")]
    NoRuntime(#[from] tokio::runtime::TryCurrentError),
}

pub type ActuationResult<T> = Result<T, ActuationError>;
