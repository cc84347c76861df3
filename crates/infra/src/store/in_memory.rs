//! In-memory data store for tests/dev.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, NaiveDate, Utc};

use warmsend_core::{
    Email, EmailId, EmailStatus, FlagSet, IdentityFlag, IdentityId, PerformanceSample, Recipient,
    RecipientFlag, RecipientId, SendingIdentity, Template, TemplateId, do_not_email,
};

use super::r#trait::{DataStore, StoreError};

/// In-memory store backed by `RwLock<HashMap>` tables.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    identities: RwLock<HashMap<IdentityId, SendingIdentity>>,
    templates: RwLock<HashMap<TemplateId, Template>>,
    recipients: RwLock<HashMap<RecipientId, Recipient>>,
    emails: RwLock<HashMap<EmailId, Email>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arc() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Snapshot of every email, ordered by target time.
    pub fn emails(&self) -> Vec<Email> {
        let Ok(emails) = self.emails.read() else {
            return Vec::new();
        };
        let mut all: Vec<Email> = emails.values().cloned().collect();
        all.sort_by_key(|e| (e.target_at, e.id));
        all
    }
}

fn read<T>(lock: &RwLock<T>) -> Result<RwLockReadGuard<'_, T>, StoreError> {
    lock.read()
        .map_err(|_| StoreError::backend("in-memory store lock poisoned"))
}

fn write<T>(lock: &RwLock<T>) -> Result<RwLockWriteGuard<'_, T>, StoreError> {
    lock.write()
        .map_err(|_| StoreError::backend("in-memory store lock poisoned"))
}

#[async_trait::async_trait]
impl DataStore for InMemoryStore {
    async fn ping(&self) -> Result<(), StoreError> {
        read(&self.identities).map(|_| ())
    }

    async fn insert_identity(&self, identity: &SendingIdentity) -> Result<(), StoreError> {
        let mut identities = write(&self.identities)?;
        if identities.contains_key(&identity.id) {
            return Err(StoreError::conflict(format!("identity {} exists", identity.id)));
        }
        identities.insert(identity.id, identity.clone());
        Ok(())
    }

    async fn identity(&self, id: IdentityId) -> Result<SendingIdentity, StoreError> {
        read(&self.identities)?
            .get(&id)
            .cloned()
            .ok_or_else(|| StoreError::not_found("identity", id))
    }

    async fn active_identities(&self) -> Result<Vec<SendingIdentity>, StoreError> {
        let identities = read(&self.identities)?;
        let mut active: Vec<_> = identities
            .values()
            .filter(|i| i.is_active())
            .cloned()
            .collect();
        active.sort_by_key(|i| (i.created_at, i.id));
        Ok(active)
    }

    async fn add_identity_flags(
        &self,
        id: IdentityId,
        flags: FlagSet<IdentityFlag>,
    ) -> Result<SendingIdentity, StoreError> {
        let mut identities = write(&self.identities)?;
        let identity = identities
            .get_mut(&id)
            .ok_or_else(|| StoreError::not_found("identity", id))?;
        identity.flags = identity.flags | flags;
        Ok(identity.clone())
    }

    async fn insert_template(&self, template: &Template) -> Result<(), StoreError> {
        let mut templates = write(&self.templates)?;
        if templates.contains_key(&template.id) {
            return Err(StoreError::conflict(format!("template {} exists", template.id)));
        }
        templates.insert(template.id, template.clone());
        Ok(())
    }

    async fn template(&self, id: TemplateId) -> Result<Template, StoreError> {
        read(&self.templates)?
            .get(&id)
            .cloned()
            .ok_or_else(|| StoreError::not_found("template", id))
    }

    async fn active_templates(&self) -> Result<Vec<Template>, StoreError> {
        let templates = read(&self.templates)?;
        let mut active: Vec<_> = templates
            .values()
            .filter(|t| t.is_active())
            .cloned()
            .collect();
        active.sort_by_key(|t| (t.created_at, t.id));
        Ok(active)
    }

    async fn insert_recipient(&self, recipient: &Recipient) -> Result<(), StoreError> {
        let mut recipients = write(&self.recipients)?;
        if recipients
            .values()
            .any(|r| r.email.eq_ignore_ascii_case(&recipient.email) || r.id == recipient.id)
        {
            return Err(StoreError::conflict(format!(
                "recipient {} exists",
                recipient.email
            )));
        }
        recipients.insert(recipient.id, recipient.clone());
        Ok(())
    }

    async fn recipient(&self, id: RecipientId) -> Result<Recipient, StoreError> {
        read(&self.recipients)?
            .get(&id)
            .cloned()
            .ok_or_else(|| StoreError::not_found("recipient", id))
    }

    async fn recipient_by_email(&self, email: &str) -> Result<Option<Recipient>, StoreError> {
        let email = email.trim();
        Ok(read(&self.recipients)?
            .values()
            .find(|r| r.email.eq_ignore_ascii_case(email))
            .cloned())
    }

    async fn recipient_by_token(&self, token: &str) -> Result<Option<Recipient>, StoreError> {
        Ok(read(&self.recipients)?
            .values()
            .find(|r| r.token == token)
            .cloned())
    }

    async fn recipients_with_flags(
        &self,
        flags: FlagSet<RecipientFlag>,
    ) -> Result<Vec<Recipient>, StoreError> {
        let recipients = read(&self.recipients)?;
        let mut matching: Vec<_> = recipients
            .values()
            .filter(|r| {
                r.flags.contains_all(flags)
                    && !r.flags.intersects(do_not_email())
                    && !r.is_disabled()
            })
            .cloned()
            .collect();
        matching.sort_by_key(|r| (r.created_at, r.id));
        Ok(matching)
    }

    async fn unreached_recipients(&self, limit: usize) -> Result<Vec<Recipient>, StoreError> {
        let contacted: HashSet<RecipientId> = read(&self.emails)?
            .values()
            .map(|e| e.recipient_id)
            .collect();
        let recipients = read(&self.recipients)?;
        let mut unreached: Vec<_> = recipients
            .values()
            .filter(|r| r.is_validated() && !r.is_disabled() && !contacted.contains(&r.id))
            .cloned()
            .collect();
        unreached.sort_by_key(|r| (r.created_at, r.id));
        unreached.truncate(limit);
        Ok(unreached)
    }

    async fn next_unvalidated_recipient(&self) -> Result<Option<Recipient>, StoreError> {
        Ok(read(&self.recipients)?
            .values()
            .filter(|r| !r.is_validated() && !r.is_disabled())
            .min_by_key(|r| (r.created_at, r.id))
            .cloned())
    }

    async fn update_recipient_email(&self, id: RecipientId, email: &str) -> Result<(), StoreError> {
        let mut recipients = write(&self.recipients)?;
        if recipients
            .values()
            .any(|r| r.id != id && r.email.eq_ignore_ascii_case(email))
        {
            return Err(StoreError::conflict(format!("recipient {email} exists")));
        }
        let recipient = recipients
            .get_mut(&id)
            .ok_or_else(|| StoreError::not_found("recipient", id))?;
        recipient.email = email.trim().to_string();
        Ok(())
    }

    async fn add_recipient_flags(
        &self,
        id: RecipientId,
        flags: FlagSet<RecipientFlag>,
    ) -> Result<Recipient, StoreError> {
        let mut recipients = write(&self.recipients)?;
        let recipient = recipients
            .get_mut(&id)
            .ok_or_else(|| StoreError::not_found("recipient", id))?;
        recipient.flags = recipient.flags | flags;
        Ok(recipient.clone())
    }

    async fn remove_recipient_flags(
        &self,
        id: RecipientId,
        flags: FlagSet<RecipientFlag>,
    ) -> Result<Recipient, StoreError> {
        let mut recipients = write(&self.recipients)?;
        let recipient = recipients
            .get_mut(&id)
            .ok_or_else(|| StoreError::not_found("recipient", id))?;
        recipient.flags = recipient.flags.difference(flags);
        Ok(recipient.clone())
    }

    async fn mark_recipient_validated(
        &self,
        id: RecipientId,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let mut recipients = write(&self.recipients)?;
        let recipient = recipients
            .get_mut(&id)
            .ok_or_else(|| StoreError::not_found("recipient", id))?;
        recipient.validated_at = Some(at);
        Ok(())
    }

    async fn mark_recipient_disabled(
        &self,
        id: RecipientId,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let mut recipients = write(&self.recipients)?;
        let recipient = recipients
            .get_mut(&id)
            .ok_or_else(|| StoreError::not_found("recipient", id))?;
        recipient.disabled_at.get_or_insert(at);
        Ok(())
    }

    async fn insert_email(&self, email: &Email) -> Result<(), StoreError> {
        let mut emails = write(&self.emails)?;
        if emails.contains_key(&email.id) {
            return Err(StoreError::conflict(format!("email {} exists", email.id)));
        }
        emails.insert(email.id, email.clone());
        Ok(())
    }

    async fn pending_email_count(&self, identity: IdentityId) -> Result<u64, StoreError> {
        Ok(read(&self.emails)?
            .values()
            .filter(|e| e.identity_id == identity && !e.is_sent())
            .count() as u64)
    }

    async fn next_due_email(&self, now: DateTime<Utc>) -> Result<Option<Email>, StoreError> {
        Ok(read(&self.emails)?
            .values()
            .filter(|e| e.is_due(now))
            .min_by_key(|e| (e.target_at, e.id))
            .cloned())
    }

    async fn mark_email_sent(&self, id: EmailId, at: DateTime<Utc>) -> Result<(), StoreError> {
        let mut emails = write(&self.emails)?;
        let email = emails
            .get_mut(&id)
            .ok_or_else(|| StoreError::not_found("email", id))?;
        if email.is_sent() {
            return Err(StoreError::conflict(format!("email {id} already sent")));
        }
        email.sent_at = Some(at);
        email.status = Some(EmailStatus::Processed);
        Ok(())
    }

    async fn email_by_message_id(&self, message_id: &str) -> Result<Option<Email>, StoreError> {
        Ok(read(&self.emails)?
            .values()
            .find(|e| e.message_id.as_deref() == Some(message_id))
            .cloned())
    }

    async fn latest_sent_email_for(
        &self,
        recipient: RecipientId,
    ) -> Result<Option<Email>, StoreError> {
        Ok(read(&self.emails)?
            .values()
            .filter(|e| e.recipient_id == recipient && e.is_sent())
            .max_by_key(|e| (e.sent_at, e.id))
            .cloned())
    }

    async fn set_email_message_id(&self, id: EmailId, message_id: &str) -> Result<(), StoreError> {
        let mut emails = write(&self.emails)?;
        if emails
            .values()
            .any(|e| e.id != id && e.message_id.as_deref() == Some(message_id))
        {
            return Err(StoreError::conflict(format!(
                "message id {message_id} already assigned"
            )));
        }
        let email = emails
            .get_mut(&id)
            .ok_or_else(|| StoreError::not_found("email", id))?;
        email.message_id = Some(message_id.to_string());
        Ok(())
    }

    async fn set_email_status(&self, id: EmailId, status: EmailStatus) -> Result<(), StoreError> {
        let mut emails = write(&self.emails)?;
        let email = emails
            .get_mut(&id)
            .ok_or_else(|| StoreError::not_found("email", id))?;
        email.status = Some(status);
        Ok(())
    }

    async fn performance_samples(
        &self,
        identity: IdentityId,
        limit: usize,
    ) -> Result<Vec<PerformanceSample>, StoreError> {
        let emails = read(&self.emails)?;
        let mut counts: BTreeMap<(NaiveDate, Option<&'static str>), (Option<EmailStatus>, i64)> =
            BTreeMap::new();
        for email in emails.values().filter(|e| e.identity_id == identity) {
            let Some(sent_at) = email.sent_at else {
                continue;
            };
            let key = (sent_at.date_naive(), email.status.map(EmailStatus::as_str));
            counts.entry(key).or_insert((email.status, 0)).1 += 1;
        }

        Ok(counts
            .into_iter()
            .rev()
            .take(limit)
            .map(|((day, _), (status, count))| PerformanceSample::new(day, status, count))
            .collect())
    }
}
