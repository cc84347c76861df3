//! Recipient standing: flag updates with immediate do-not-email disablement.

use chrono::Utc;
use tracing::info;

use warmsend_core::{FlagSet, Recipient, RecipientFlag};

use crate::store::{DataStore, StoreError};

/// Add `flags` to the recipient and disable it if it is now do-not-email.
///
/// Skips the write when every flag is already present. Returns the recipient
/// as stored after the update.
pub async fn flag_recipient<S>(
    store: &S,
    recipient: &Recipient,
    flags: FlagSet<RecipientFlag>,
) -> Result<Recipient, StoreError>
where
    S: DataStore + ?Sized,
{
    let mut updated = if recipient.flags.contains_all(flags) {
        recipient.clone()
    } else {
        store.add_recipient_flags(recipient.id, flags).await?
    };

    if updated.is_do_not_email() && !updated.is_disabled() {
        let now = Utc::now();
        store.mark_recipient_disabled(updated.id, now).await?;
        updated.disabled_at = Some(now);
        info!(
            recipient_id = %updated.id,
            flags = ?updated.flags,
            "recipient disabled"
        );
    }

    Ok(updated)
}

/// Remove `flags` from the recipient. Never re-enables a disabled recipient.
pub async fn unflag_recipient<S>(
    store: &S,
    recipient: &Recipient,
    flags: FlagSet<RecipientFlag>,
) -> Result<Recipient, StoreError>
where
    S: DataStore + ?Sized,
{
    if !recipient.flags.intersects(flags) {
        return Ok(recipient.clone());
    }
    store.remove_recipient_flags(recipient.id, flags).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryStore;
    use warmsend_core::do_not_email;

    async fn stored(store: &InMemoryStore) -> Recipient {
        let mut r = Recipient::new("pat@example.com", false, Utc::now());
        r.validated_at = Some(Utc::now());
        store.insert_recipient(&r).await.unwrap();
        r
    }

    #[tokio::test]
    async fn every_do_not_email_flag_disables() {
        for flag in do_not_email().iter() {
            let store = InMemoryStore::new();
            let recipient = stored(&store).await;

            let updated = flag_recipient(&store, &recipient, flag.into()).await.unwrap();

            assert!(updated.is_disabled(), "{flag:?} should disable");
            let reloaded = store.recipient(recipient.id).await.unwrap();
            assert!(reloaded.disabled_at.is_some());
            assert!(reloaded.flags.contains(flag));
        }
    }

    #[tokio::test]
    async fn engagement_flags_do_not_disable() {
        let store = InMemoryStore::new();
        let recipient = stored(&store).await;
        let flags = FlagSet::of(&[
            RecipientFlag::Delivered,
            RecipientFlag::Open,
            RecipientFlag::Click,
            RecipientFlag::Deferred,
        ]);
        let updated = flag_recipient(&store, &recipient, flags).await.unwrap();
        assert!(!updated.is_disabled());
        assert!(store.recipient(recipient.id).await.unwrap().disabled_at.is_none());
    }

    #[tokio::test]
    async fn removing_flags_keeps_disablement() {
        let store = InMemoryStore::new();
        let recipient = stored(&store).await;
        let flagged = flag_recipient(&store, &recipient, RecipientFlag::Unsubscribe.into())
            .await
            .unwrap();
        let cleared = unflag_recipient(&store, &flagged, RecipientFlag::Unsubscribe.into())
            .await
            .unwrap();
        assert!(!cleared.flags.contains(RecipientFlag::Unsubscribe));
        assert!(cleared.is_disabled());
    }
}
