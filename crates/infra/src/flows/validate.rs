//! Address validation flow: one unvalidated recipient per tick.

use chrono::Utc;
use tracing::{debug, info};

use warmsend_core::{Recipient, RecipientId, looks_like_email};

use crate::error::FlowError;
use crate::store::{DataStore, StoreError};
use crate::validation::EmailValidator;
use crate::workers::RunContext;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidateOutcome {
    Idle,
    Validated(RecipientId),
    /// The validator suggested a fix; the address was replaced and accepted.
    Corrected { id: RecipientId, email: String },
    Disabled(RecipientId),
}

pub struct ValidateFlow<S, V> {
    store: S,
    validator: V,
}

impl<S: DataStore, V: EmailValidator> ValidateFlow<S, V> {
    pub fn new(store: S, validator: V) -> Self {
        Self { store, validator }
    }

    pub async fn run(&self, ctx: &RunContext) -> Result<(), FlowError> {
        let outcome = self.validate_next().await?;
        if outcome != ValidateOutcome::Idle {
            debug!(flow = ctx.name(), outcome = ?outcome, "recipient checked");
        }
        Ok(())
    }

    pub async fn validate_next(&self) -> Result<ValidateOutcome, FlowError> {
        let Some(recipient) = self.store.next_unvalidated_recipient().await? else {
            return Ok(ValidateOutcome::Idle);
        };

        if !looks_like_email(&recipient.email) {
            return self.disable(&recipient, "implausible address").await;
        }

        let verdict = self.validator.validate(&recipient.email).await?;
        let mut corrected = None;
        let mut valid = verdict.valid;

        if let (false, Some(suggestion)) = (valid, verdict.suggestion) {
            if looks_like_email(&suggestion) {
                match self.store.update_recipient_email(recipient.id, &suggestion).await {
                    Ok(()) => {
                        info!(
                            recipient_id = %recipient.id,
                            from = %recipient.email,
                            to = %suggestion,
                            "address corrected"
                        );
                        corrected = Some(suggestion);
                        valid = true;
                    }
                    // The corrected address already belongs to someone else.
                    Err(StoreError::Conflict(_)) => {
                        return self.disable(&recipient, "corrected address already registered").await;
                    }
                    Err(err) => return Err(err.into()),
                }
            }
        }

        if !valid {
            return self.disable(&recipient, "rejected by validator").await;
        }

        self.store
            .mark_recipient_validated(recipient.id, Utc::now())
            .await?;
        Ok(match corrected {
            Some(email) => ValidateOutcome::Corrected {
                id: recipient.id,
                email,
            },
            None => ValidateOutcome::Validated(recipient.id),
        })
    }

    async fn disable(
        &self,
        recipient: &Recipient,
        reason: &'static str,
    ) -> Result<ValidateOutcome, FlowError> {
        self.store
            .mark_recipient_disabled(recipient.id, Utc::now())
            .await?;
        info!(recipient_id = %recipient.id, reason, "recipient disabled");
        Ok(ValidateOutcome::Disabled(recipient.id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::store::InMemoryStore;
    use crate::validation::{AcceptAllValidator, StaticValidator, Validation};

    async fn add(store: &InMemoryStore, email: &str) -> Recipient {
        let r = Recipient::new(email, false, Utc::now());
        store.insert_recipient(&r).await.unwrap();
        r
    }

    fn validator() -> StaticValidator {
        StaticValidator::new(Validation::valid())
            .with("bad@example.com", Validation::invalid())
            .with("jane@gmial.com", Validation::typo("jane@gmail.com"))
            .with("taken@gmial.com", Validation::typo("taken@gmail.com"))
    }

    #[tokio::test]
    async fn idle_without_candidates() {
        let flow = ValidateFlow::new(InMemoryStore::arc(), AcceptAllValidator);
        assert_eq!(flow.validate_next().await.unwrap(), ValidateOutcome::Idle);
    }

    #[tokio::test]
    async fn valid_addresses_are_marked_validated_once() {
        let store = InMemoryStore::arc();
        let r = add(&store, "ok@example.com").await;
        let flow = ValidateFlow::new(store.clone(), validator());

        assert_eq!(flow.validate_next().await.unwrap(), ValidateOutcome::Validated(r.id));
        assert!(store.recipient(r.id).await.unwrap().is_validated());
        assert_eq!(flow.validate_next().await.unwrap(), ValidateOutcome::Idle);
    }

    #[tokio::test]
    async fn implausible_and_rejected_addresses_are_disabled() {
        let store = InMemoryStore::arc();
        let junk = add(&store, "not-an-address").await;
        let flow = ValidateFlow::new(store.clone(), validator());
        assert_eq!(flow.validate_next().await.unwrap(), ValidateOutcome::Disabled(junk.id));

        let bad = add(&store, "bad@example.com").await;
        assert_eq!(flow.validate_next().await.unwrap(), ValidateOutcome::Disabled(bad.id));
        let stored = store.recipient(bad.id).await.unwrap();
        assert!(stored.is_disabled());
        assert!(!stored.is_validated());
    }

    #[tokio::test]
    async fn typo_suggestion_replaces_address() {
        let store = InMemoryStore::arc();
        let r = add(&store, "jane@gmial.com").await;
        let flow = ValidateFlow::new(store.clone(), validator());

        assert_eq!(
            flow.validate_next().await.unwrap(),
            ValidateOutcome::Corrected {
                id: r.id,
                email: "jane@gmail.com".into()
            }
        );
        let stored = store.recipient(r.id).await.unwrap();
        assert_eq!(stored.email, "jane@gmail.com");
        assert!(stored.is_validated());
    }

    #[tokio::test]
    async fn suggestion_colliding_with_existing_recipient_disables() {
        let store = InMemoryStore::arc();
        let mut existing = Recipient::new("taken@gmail.com", false, Utc::now());
        existing.validated_at = Some(Utc::now());
        store.insert_recipient(&existing).await.unwrap();
        let r = add(&store, "taken@gmial.com").await;
        let flow = ValidateFlow::new(store.clone(), validator());

        assert_eq!(flow.validate_next().await.unwrap(), ValidateOutcome::Disabled(r.id));
        assert_eq!(store.recipient(r.id).await.unwrap().email, "taken@gmial.com");
    }

    #[tokio::test]
    async fn validator_errors_propagate() {
        struct Down;

        #[async_trait::async_trait]
        impl EmailValidator for Down {
            async fn validate(&self, _address: &str) -> Result<Validation, crate::validation::ValidationError> {
                Err(crate::validation::ValidationError::Http("connection refused".into()))
            }
        }

        let store = Arc::new(InMemoryStore::new());
        let r = add(&store, "ok@example.com").await;
        let flow = ValidateFlow::new(store.clone(), Down);

        assert!(matches!(flow.validate_next().await, Err(FlowError::Validation(_))));
        let stored = store.recipient(r.id).await.unwrap();
        assert!(!stored.is_validated() && !stored.is_disabled());
    }
}
