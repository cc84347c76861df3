//! Address validation capability.

pub mod zerobounce;

use std::collections::HashMap;

use thiserror::Error;

pub use zerobounce::ZeroBounceValidator;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("http error: {0}")]
    Http(String),

    #[error("validator returned {status}: {body}")]
    Rejected { status: u16, body: String },

    #[error("unreadable validator response: {0}")]
    Decode(String),
}

/// Verdict on one address.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Validation {
    pub valid: bool,
    /// Probable intended address when the input looks like a typo.
    pub suggestion: Option<String>,
}

impl Validation {
    pub fn valid() -> Self {
        Self {
            valid: true,
            suggestion: None,
        }
    }

    pub fn invalid() -> Self {
        Self::default()
    }

    pub fn typo(suggestion: impl Into<String>) -> Self {
        Self {
            valid: false,
            suggestion: Some(suggestion.into()),
        }
    }
}

#[async_trait::async_trait]
pub trait EmailValidator: Send + Sync {
    async fn validate(&self, address: &str) -> Result<Validation, ValidationError>;
}

#[async_trait::async_trait]
impl<V> EmailValidator for std::sync::Arc<V>
where
    V: EmailValidator + ?Sized,
{
    async fn validate(&self, address: &str) -> Result<Validation, ValidationError> {
        (**self).validate(address).await
    }
}

/// Used when no validation service is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct AcceptAllValidator;

#[async_trait::async_trait]
impl EmailValidator for AcceptAllValidator {
    async fn validate(&self, _address: &str) -> Result<Validation, ValidationError> {
        Ok(Validation::valid())
    }
}

/// Fixed verdicts keyed by lowercase address; unknown addresses get `fallback`.
#[derive(Debug, Clone, Default)]
pub struct StaticValidator {
    verdicts: HashMap<String, Validation>,
    fallback: Validation,
}

impl StaticValidator {
    pub fn new(fallback: Validation) -> Self {
        Self {
            verdicts: HashMap::new(),
            fallback,
        }
    }

    pub fn with(mut self, address: &str, verdict: Validation) -> Self {
        self.verdicts.insert(address.to_ascii_lowercase(), verdict);
        self
    }
}

#[async_trait::async_trait]
impl EmailValidator for StaticValidator {
    async fn validate(&self, address: &str) -> Result<Validation, ValidationError> {
        Ok(self
            .verdicts
            .get(&address.to_ascii_lowercase())
            .cloned()
            .unwrap_or_else(|| self.fallback.clone()))
    }
}
