//! Scheduled and sent emails.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::id::{EmailId, IdentityId, RecipientId, TemplateId};
use crate::status::EmailStatus;

/// One message to one recipient, sent through one identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Email {
    pub id: EmailId,
    pub identity_id: IdentityId,
    pub template_id: TemplateId,
    pub recipient_id: RecipientId,
    /// Earliest time the dispatch worker may pick the email up.
    pub target_at: DateTime<Utc>,
    pub sent_at: Option<DateTime<Utc>>,
    /// Provider message id, learned from the first delivery webhook.
    pub message_id: Option<String>,
    pub status: Option<EmailStatus>,
}

impl Email {
    pub fn schedule(
        identity_id: IdentityId,
        template_id: TemplateId,
        recipient_id: RecipientId,
        target_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: EmailId::new(),
            identity_id,
            template_id,
            recipient_id,
            target_at,
            sent_at: None,
            message_id: None,
            status: None,
        }
    }

    pub fn is_sent(&self) -> bool {
        self.sent_at.is_some()
    }

    /// Unsent and past its target time.
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        !self.is_sent() && self.target_at < now
    }
}
