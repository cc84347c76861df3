//! Mail transmission.
//!
//! ## Components
//!
//! - `MailTransport`: one best-effort send, returning the provider message id
//! - `SendGridTransport`: v3 `mail/send` over HTTPS
//! - `RecordingTransport`: in-memory transport for tests/dev
//! - `SendPool`: bounded background pool that owns in-flight transmissions

pub mod pool;
pub mod sendgrid;

use std::sync::Mutex;

use thiserror::Error;

use warmsend_core::{EmailId, SendingIdentity};

pub use pool::SendPool;
pub use sendgrid::SendGridTransport;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("identity has no api token")]
    MissingCredentials,

    #[error("http error: {0}")]
    Http(String),

    #[error("provider rejected message ({status}): {body}")]
    Rejected { status: u16, body: String },

    #[error("transmission timed out")]
    Timeout,
}

/// A fully rendered message ready for the provider.
#[derive(Clone, PartialEq, Eq)]
pub struct OutboundMessage {
    pub email_id: EmailId,
    pub api_token: String,
    pub to: String,
    pub subject: String,
    pub text: String,
    pub html: Option<String>,
    pub category: String,
    pub ip_pool: String,
    pub from_email: String,
    pub from_name: String,
    pub reply_email: String,
    pub reply_name: String,
}

impl OutboundMessage {
    pub fn new(
        identity: &SendingIdentity,
        email_id: EmailId,
        to: impl Into<String>,
        subject: impl Into<String>,
        text: impl Into<String>,
        html: Option<String>,
    ) -> Self {
        let attrs = &identity.attrs;
        Self {
            email_id,
            api_token: attrs.api_token.clone(),
            to: to.into(),
            subject: subject.into(),
            text: text.into(),
            html: html.filter(|h| !h.trim().is_empty()),
            category: attrs.category.clone(),
            ip_pool: attrs.ip_pool.clone(),
            from_email: attrs.from_email.clone(),
            from_name: attrs.from_name.clone(),
            reply_email: attrs.reply_email.clone(),
            reply_name: attrs.reply_name.clone(),
        }
    }
}

impl std::fmt::Debug for OutboundMessage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OutboundMessage")
            .field("email_id", &self.email_id)
            .field("to", &self.to)
            .field("subject", &self.subject)
            .field("has_html", &self.html.is_some())
            .field("category", &self.category)
            .field("from_email", &self.from_email)
            .finish_non_exhaustive()
    }
}

/// Single-shot message transmission. The core never retries a send.
#[async_trait::async_trait]
pub trait MailTransport: Send + Sync {
    async fn send(&self, message: &OutboundMessage) -> Result<Option<String>, TransportError>;
}

/// Transport that records messages instead of sending them.
#[derive(Debug, Default)]
pub struct RecordingTransport {
    sent: Mutex<Vec<OutboundMessage>>,
    fail_with: Option<TransportError>,
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every send records the message and then fails with `err`.
    pub fn failing(err: TransportError) -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            fail_with: Some(err),
        }
    }

    pub fn sent(&self) -> Vec<OutboundMessage> {
        self.sent
            .lock()
            .map(|sent| sent.clone())
            .unwrap_or_default()
    }
}

#[async_trait::async_trait]
impl MailTransport for RecordingTransport {
    async fn send(&self, message: &OutboundMessage) -> Result<Option<String>, TransportError> {
        if let Ok(mut sent) = self.sent.lock() {
            sent.push(message.clone());
        }
        match &self.fail_with {
            Some(err) => Err(err.clone()),
            None => Ok(Some(format!("recorded-{}", message.email_id))),
        }
    }
}
