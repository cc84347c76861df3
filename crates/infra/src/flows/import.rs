//! Recipient import handler, fed by the admin import channel.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use warmsend_core::{Recipient, RecipientId};

use crate::error::FlowError;
use crate::store::{DataStore, StoreError};

/// One address queued for import.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecipientImport {
    pub email: String,
    #[serde(default)]
    pub warmup: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportOutcome {
    Created(RecipientId),
    /// The address is already registered; nothing changed.
    Duplicate,
}

/// Register the address as a new, unvalidated recipient.
///
/// Plausibility is left to the validation flow, which disables bad addresses.
pub async fn import_recipient<S>(store: &S, import: &RecipientImport) -> Result<ImportOutcome, FlowError>
where
    S: DataStore + ?Sized,
{
    let email = import.email.trim();
    if email.is_empty() {
        return Err(FlowError::precondition("empty address"));
    }

    if store.recipient_by_email(email).await?.is_some() {
        debug!(email, "recipient already registered");
        return Ok(ImportOutcome::Duplicate);
    }

    let recipient = Recipient::new(email, import.warmup, Utc::now());
    match store.insert_recipient(&recipient).await {
        Ok(()) => {
            info!(recipient_id = %recipient.id, warmup = import.warmup, "recipient imported");
            Ok(ImportOutcome::Created(recipient.id))
        }
        Err(StoreError::Conflict(_)) => Ok(ImportOutcome::Duplicate),
        Err(err) => Err(err.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryStore;
    use warmsend_core::RecipientFlag;

    fn import(email: &str, warmup: bool) -> RecipientImport {
        RecipientImport {
            email: email.into(),
            warmup,
        }
    }

    #[tokio::test]
    async fn creates_unvalidated_recipient_with_warmup_flag() {
        let store = InMemoryStore::new();
        let outcome = import_recipient(&store, &import(" Seed@Example.com ", true)).await.unwrap();

        let ImportOutcome::Created(id) = outcome else {
            panic!("expected a new recipient, got {outcome:?}");
        };
        let stored = store.recipient(id).await.unwrap();
        assert_eq!(stored.email, "Seed@Example.com");
        assert!(stored.flags.contains(RecipientFlag::Warmup));
        assert!(!stored.is_validated());
        assert_eq!(stored.token.len(), 64);
    }

    #[tokio::test]
    async fn duplicates_are_ignored_case_insensitively() {
        let store = InMemoryStore::new();
        import_recipient(&store, &import("pat@example.com", false)).await.unwrap();
        let again = import_recipient(&store, &import("PAT@example.com", true)).await.unwrap();
        assert_eq!(again, ImportOutcome::Duplicate);
    }

    #[tokio::test]
    async fn blank_address_is_rejected() {
        let store = InMemoryStore::new();
        let err = import_recipient(&store, &import("   ", false)).await.unwrap_err();
        assert!(matches!(err, FlowError::Precondition(_)));
    }

    #[test]
    fn warmup_defaults_to_false() {
        let parsed: RecipientImport = serde_json::from_str(r#"{"email":"a@b.co"}"#).unwrap();
        assert!(!parsed.warmup);
    }
}
