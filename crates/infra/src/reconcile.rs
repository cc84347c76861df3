//! Delivery-status reconciliation.
//!
//! Provider webhook events update two things independently: the email the
//! event is about (status, moved along the priority ladder only) and the
//! recipient it was sent to (engagement and compliance flags).
//!
//! ## Correlation
//!
//! Emails are looked up by provider message id. The id is only learned from
//! webhooks, so the first event for a message usually misses; it then falls
//! back to the recipient's most recently sent email and backfills the id.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, error, warn};

use warmsend_core::{
    DomainError, EmailId, EmailStatus, RecipientId, StatusChange, looks_like_email, next_status,
};

use crate::standing::flag_recipient;
use crate::store::{DataStore, StoreError};

/// One event of a provider webhook batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeliveryEvent {
    #[serde(default)]
    pub email: String,
    pub event: String,
    #[serde(default)]
    pub sg_event_id: Option<String>,
    #[serde(default)]
    pub sg_message_id: Option<String>,
    /// A single category or a list of them.
    #[serde(default)]
    pub category: Option<Value>,
}

impl DeliveryEvent {
    fn message_id(&self) -> Option<&str> {
        self.sg_message_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReconcileError {
    #[error("unknown email status: {0}")]
    UnknownStatus(String),

    #[error("status {0} has no place in the priority order")]
    UnrankedStatus(String),

    /// The fallback candidate already carries a different message id.
    #[error("email {email_id} already has message id {existing}, event carries {incoming}")]
    MessageIdConflict {
        email_id: EmailId,
        existing: String,
        incoming: String,
    },

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<DomainError> for ReconcileError {
    fn from(err: DomainError) -> Self {
        match err {
            DomainError::UnknownStatus(s) => ReconcileError::UnknownStatus(s),
            DomainError::UnrankedStatus(s) => ReconcileError::UnrankedStatus(s),
            other => ReconcileError::Store(StoreError::backend(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EmailUpdate {
    Applied { email_id: EmailId, status: EmailStatus },
    /// The current status outranks or equals the incoming one.
    Unchanged { email_id: EmailId },
    /// No email could be correlated with the event.
    Unmatched,
    /// The event carries no message id.
    Skipped,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecipientUpdate {
    Flagged { recipient_id: RecipientId, disabled: bool },
    /// The status maps to no recipient flag.
    Unchanged,
    Unknown,
    /// The event address is not plausible.
    Skipped,
}

/// Result of applying one event to both sides.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reconciliation {
    pub email: Result<EmailUpdate, ReconcileError>,
    pub recipient: Result<RecipientUpdate, ReconcileError>,
}

/// Summary of one webhook batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BatchReport {
    pub received: usize,
    pub processed: usize,
    pub unmatched: usize,
    pub skipped: usize,
    pub failed: usize,
}

pub struct Reconciler<S> {
    store: S,
}

impl<S: DataStore> Reconciler<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Apply one event to its email and its recipient concurrently.
    ///
    /// Fails only when the event status is not recognised; failures of either
    /// side are reported in the returned [`Reconciliation`].
    pub async fn apply(&self, event: &DeliveryEvent) -> Result<Reconciliation, ReconcileError> {
        let status: EmailStatus = event.event.parse()?;
        let (email, recipient) = tokio::join!(
            self.update_email(event, status),
            self.update_recipient(event, status),
        );
        Ok(Reconciliation { email, recipient })
    }

    pub async fn reconcile_email(&self, event: &DeliveryEvent) -> Result<EmailUpdate, ReconcileError> {
        let status: EmailStatus = event.event.parse()?;
        self.update_email(event, status).await
    }

    pub async fn reconcile_recipient(
        &self,
        event: &DeliveryEvent,
    ) -> Result<RecipientUpdate, ReconcileError> {
        let status: EmailStatus = event.event.parse()?;
        self.update_recipient(event, status).await
    }

    /// Apply a raw webhook body. Malformed events are skipped; nothing here
    /// aborts the batch.
    pub async fn apply_batch(&self, events: &[Value]) -> BatchReport {
        let mut report = BatchReport {
            received: events.len(),
            ..BatchReport::default()
        };

        for raw in events {
            let event: DeliveryEvent = match serde_json::from_value(raw.clone()) {
                Ok(event) => event,
                Err(err) => {
                    warn!(error = %err, event = %raw, "malformed delivery event skipped");
                    report.skipped += 1;
                    continue;
                }
            };

            match self.apply(&event).await {
                Err(err) => {
                    error!(error = %err, event = ?event, "delivery event rejected");
                    report.failed += 1;
                }
                Ok(Reconciliation { email, recipient }) => {
                    let mut failed = false;
                    if let Err(err) = &email {
                        error!(error = %err, event = ?event, "email status update failed");
                        failed = true;
                    }
                    if let Err(err) = &recipient {
                        error!(error = %err, event = ?event, "recipient update failed");
                        failed = true;
                    }

                    if failed {
                        report.failed += 1;
                    } else if email == Ok(EmailUpdate::Unmatched) {
                        report.unmatched += 1;
                    } else {
                        report.processed += 1;
                    }
                }
            }
        }

        debug!(?report, "delivery batch reconciled");
        report
    }

    async fn update_email(
        &self,
        event: &DeliveryEvent,
        status: EmailStatus,
    ) -> Result<EmailUpdate, ReconcileError> {
        let Some(message_id) = event.message_id() else {
            return Ok(EmailUpdate::Skipped);
        };

        let email = match self.store.email_by_message_id(message_id).await? {
            Some(email) => email,
            None => {
                let Some(recipient) = self.store.recipient_by_email(&event.email).await? else {
                    warn!(email = %event.email, message_id, "no recipient for delivery event");
                    return Ok(EmailUpdate::Unmatched);
                };
                let Some(mut email) = self.store.latest_sent_email_for(recipient.id).await? else {
                    warn!(
                        recipient_id = %recipient.id,
                        message_id,
                        "delivery event for a recipient that was never sent an email"
                    );
                    return Ok(EmailUpdate::Unmatched);
                };
                if let Some(existing) = email.message_id.take() {
                    return Err(ReconcileError::MessageIdConflict {
                        email_id: email.id,
                        existing,
                        incoming: message_id.to_string(),
                    });
                }
                self.store.set_email_message_id(email.id, message_id).await?;
                email.message_id = Some(message_id.to_string());
                email
            }
        };

        match next_status(email.status, status)? {
            StatusChange::Apply(next) => {
                self.store.set_email_status(email.id, next).await?;
                Ok(EmailUpdate::Applied {
                    email_id: email.id,
                    status: next,
                })
            }
            StatusChange::Keep => Ok(EmailUpdate::Unchanged { email_id: email.id }),
        }
    }

    async fn update_recipient(
        &self,
        event: &DeliveryEvent,
        status: EmailStatus,
    ) -> Result<RecipientUpdate, ReconcileError> {
        if !looks_like_email(&event.email) {
            warn!(email = %event.email, "delivery event with implausible address");
            return Ok(RecipientUpdate::Skipped);
        }

        let Some(recipient) = self.store.recipient_by_email(&event.email).await? else {
            warn!(email = %event.email, "delivery event for unknown recipient");
            return Ok(RecipientUpdate::Unknown);
        };
        let Some(flag) = status.recipient_flag() else {
            return Ok(RecipientUpdate::Unchanged);
        };

        let updated = flag_recipient(&self.store, &recipient, flag.into()).await?;
        Ok(RecipientUpdate::Flagged {
            recipient_id: updated.id,
            disabled: updated.is_disabled(),
        })
    }
}
