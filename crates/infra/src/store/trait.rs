use std::sync::Arc;

use chrono::{DateTime, Utc};
use thiserror::Error;

use warmsend_core::{
    Email, EmailId, EmailStatus, FlagSet, IdentityFlag, IdentityId, PerformanceSample, Recipient,
    RecipientFlag, RecipientId, SendingIdentity, Template, TemplateId,
};

/// Store-level error.
///
/// `NotFound` is kept separate so flows can tell a missing row apart from a
/// failing backend.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// A uniqueness or state precondition was not met.
    #[error("conflict: {0}")]
    Conflict(String),

    #[error("storage error: {0}")]
    Backend(String),
}

impl StoreError {
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn backend(msg: impl Into<String>) -> Self {
        Self::Backend(msg.into())
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

/// Domain queries over the dispatch data.
///
/// Point lookups by id fail with [`StoreError::NotFound`]; lookups by a
/// secondary key return `Ok(None)` when nothing matches. Flag updates are
/// atomic OR / AND-NOT operations and return the updated row.
#[async_trait::async_trait]
pub trait DataStore: Send + Sync {
    /// Cheap round-trip used by readiness checks.
    async fn ping(&self) -> Result<(), StoreError>;

    async fn insert_identity(&self, identity: &SendingIdentity) -> Result<(), StoreError>;

    async fn identity(&self, id: IdentityId) -> Result<SendingIdentity, StoreError>;

    /// Identities that are neither deleted nor paused, oldest first.
    async fn active_identities(&self) -> Result<Vec<SendingIdentity>, StoreError>;

    async fn add_identity_flags(
        &self,
        id: IdentityId,
        flags: FlagSet<IdentityFlag>,
    ) -> Result<SendingIdentity, StoreError>;

    async fn insert_template(&self, template: &Template) -> Result<(), StoreError>;

    async fn template(&self, id: TemplateId) -> Result<Template, StoreError>;

    /// Templates that are neither deleted nor paused, in creation order.
    async fn active_templates(&self) -> Result<Vec<Template>, StoreError>;

    /// Fails with `Conflict` when the address is already registered.
    async fn insert_recipient(&self, recipient: &Recipient) -> Result<(), StoreError>;

    async fn recipient(&self, id: RecipientId) -> Result<Recipient, StoreError>;

    async fn recipient_by_email(&self, email: &str) -> Result<Option<Recipient>, StoreError>;

    async fn recipient_by_token(&self, token: &str) -> Result<Option<Recipient>, StoreError>;

    /// Enabled recipients carrying every flag in `flags` and none of the
    /// do-not-email flags.
    async fn recipients_with_flags(
        &self,
        flags: FlagSet<RecipientFlag>,
    ) -> Result<Vec<Recipient>, StoreError>;

    /// Validated, enabled recipients that have never been sent an email.
    async fn unreached_recipients(&self, limit: usize) -> Result<Vec<Recipient>, StoreError>;

    /// Oldest recipient that is neither validated nor disabled.
    async fn next_unvalidated_recipient(&self) -> Result<Option<Recipient>, StoreError>;

    async fn update_recipient_email(&self, id: RecipientId, email: &str) -> Result<(), StoreError>;

    async fn add_recipient_flags(
        &self,
        id: RecipientId,
        flags: FlagSet<RecipientFlag>,
    ) -> Result<Recipient, StoreError>;

    async fn remove_recipient_flags(
        &self,
        id: RecipientId,
        flags: FlagSet<RecipientFlag>,
    ) -> Result<Recipient, StoreError>;

    async fn mark_recipient_validated(
        &self,
        id: RecipientId,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    /// Keeps the first disable time if the recipient is already disabled.
    async fn mark_recipient_disabled(
        &self,
        id: RecipientId,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    async fn insert_email(&self, email: &Email) -> Result<(), StoreError>;

    /// Emails of the identity that have not been sent yet.
    async fn pending_email_count(&self, identity: IdentityId) -> Result<u64, StoreError>;

    /// The unsent email with the oldest target time before `now`.
    async fn next_due_email(&self, now: DateTime<Utc>) -> Result<Option<Email>, StoreError>;

    /// Stamp the email sent and set its status to `processed`.
    ///
    /// Fails with `Conflict` if it was already sent.
    async fn mark_email_sent(&self, id: EmailId, at: DateTime<Utc>) -> Result<(), StoreError>;

    async fn email_by_message_id(&self, message_id: &str) -> Result<Option<Email>, StoreError>;

    /// The recipient's email with the latest send time.
    async fn latest_sent_email_for(
        &self,
        recipient: RecipientId,
    ) -> Result<Option<Email>, StoreError>;

    async fn set_email_message_id(&self, id: EmailId, message_id: &str) -> Result<(), StoreError>;

    async fn set_email_status(&self, id: EmailId, status: EmailStatus) -> Result<(), StoreError>;

    /// Per (day, status) counts of the identity's sent emails, newest day first.
    async fn performance_samples(
        &self,
        identity: IdentityId,
        limit: usize,
    ) -> Result<Vec<PerformanceSample>, StoreError>;
}

#[async_trait::async_trait]
impl<S> DataStore for Arc<S>
where
    S: DataStore + ?Sized,
{
    async fn ping(&self) -> Result<(), StoreError> {
        (**self).ping().await
    }

    async fn insert_identity(&self, identity: &SendingIdentity) -> Result<(), StoreError> {
        (**self).insert_identity(identity).await
    }

    async fn identity(&self, id: IdentityId) -> Result<SendingIdentity, StoreError> {
        (**self).identity(id).await
    }

    async fn active_identities(&self) -> Result<Vec<SendingIdentity>, StoreError> {
        (**self).active_identities().await
    }

    async fn add_identity_flags(
        &self,
        id: IdentityId,
        flags: FlagSet<IdentityFlag>,
    ) -> Result<SendingIdentity, StoreError> {
        (**self).add_identity_flags(id, flags).await
    }

    async fn insert_template(&self, template: &Template) -> Result<(), StoreError> {
        (**self).insert_template(template).await
    }

    async fn template(&self, id: TemplateId) -> Result<Template, StoreError> {
        (**self).template(id).await
    }

    async fn active_templates(&self) -> Result<Vec<Template>, StoreError> {
        (**self).active_templates().await
    }

    async fn insert_recipient(&self, recipient: &Recipient) -> Result<(), StoreError> {
        (**self).insert_recipient(recipient).await
    }

    async fn recipient(&self, id: RecipientId) -> Result<Recipient, StoreError> {
        (**self).recipient(id).await
    }

    async fn recipient_by_email(&self, email: &str) -> Result<Option<Recipient>, StoreError> {
        (**self).recipient_by_email(email).await
    }

    async fn recipient_by_token(&self, token: &str) -> Result<Option<Recipient>, StoreError> {
        (**self).recipient_by_token(token).await
    }

    async fn recipients_with_flags(
        &self,
        flags: FlagSet<RecipientFlag>,
    ) -> Result<Vec<Recipient>, StoreError> {
        (**self).recipients_with_flags(flags).await
    }

    async fn unreached_recipients(&self, limit: usize) -> Result<Vec<Recipient>, StoreError> {
        (**self).unreached_recipients(limit).await
    }

    async fn next_unvalidated_recipient(&self) -> Result<Option<Recipient>, StoreError> {
        (**self).next_unvalidated_recipient().await
    }

    async fn update_recipient_email(&self, id: RecipientId, email: &str) -> Result<(), StoreError> {
        (**self).update_recipient_email(id, email).await
    }

    async fn add_recipient_flags(
        &self,
        id: RecipientId,
        flags: FlagSet<RecipientFlag>,
    ) -> Result<Recipient, StoreError> {
        (**self).add_recipient_flags(id, flags).await
    }

    async fn remove_recipient_flags(
        &self,
        id: RecipientId,
        flags: FlagSet<RecipientFlag>,
    ) -> Result<Recipient, StoreError> {
        (**self).remove_recipient_flags(id, flags).await
    }

    async fn mark_recipient_validated(
        &self,
        id: RecipientId,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        (**self).mark_recipient_validated(id, at).await
    }

    async fn mark_recipient_disabled(
        &self,
        id: RecipientId,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        (**self).mark_recipient_disabled(id, at).await
    }

    async fn insert_email(&self, email: &Email) -> Result<(), StoreError> {
        (**self).insert_email(email).await
    }

    async fn pending_email_count(&self, identity: IdentityId) -> Result<u64, StoreError> {
        (**self).pending_email_count(identity).await
    }

    async fn next_due_email(&self, now: DateTime<Utc>) -> Result<Option<Email>, StoreError> {
        (**self).next_due_email(now).await
    }

    async fn mark_email_sent(&self, id: EmailId, at: DateTime<Utc>) -> Result<(), StoreError> {
        (**self).mark_email_sent(id, at).await
    }

    async fn email_by_message_id(&self, message_id: &str) -> Result<Option<Email>, StoreError> {
        (**self).email_by_message_id(message_id).await
    }

    async fn latest_sent_email_for(
        &self,
        recipient: RecipientId,
    ) -> Result<Option<Email>, StoreError> {
        (**self).latest_sent_email_for(recipient).await
    }

    async fn set_email_message_id(&self, id: EmailId, message_id: &str) -> Result<(), StoreError> {
        (**self).set_email_message_id(id, message_id).await
    }

    async fn set_email_status(&self, id: EmailId, status: EmailStatus) -> Result<(), StoreError> {
        (**self).set_email_status(id, status).await
    }

    async fn performance_samples(
        &self,
        identity: IdentityId,
        limit: usize,
    ) -> Result<Vec<PerformanceSample>, StoreError> {
        (**self).performance_samples(identity, limit).await
    }
}
