//! Error type returned by units of work run under the flow launcher.

use std::time::Duration;

use thiserror::Error;

use warmsend_core::DomainError;

use crate::store::StoreError;
use crate::transport::TransportError;
use crate::validation::ValidationError;

#[derive(Debug, Error)]
pub enum FlowError {
    /// Configuration or data precondition not met; the next tick retries.
    #[error("precondition failed: {0}")]
    Precondition(String),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// The run's context was cancelled.
    #[error("run cancelled")]
    Cancelled,

    #[error("timed out after {0:?}")]
    TimedOut(Duration),
}

impl FlowError {
    pub fn precondition(msg: impl Into<String>) -> Self {
        Self::Precondition(msg.into())
    }
}
