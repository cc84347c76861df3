//! Dispatch flow: claims the next due email and hands it to the send pool.

use std::time::Duration;

use chrono::Utc;
use tracing::{debug, error, info, warn};

use warmsend_core::{DomainResult, EmailId, Recipient, RenderContext, SendingIdentity, Template};

use crate::error::FlowError;
use crate::store::DataStore;
use crate::transport::{OutboundMessage, SendPool};
use crate::workers::RunContext;

#[derive(Debug, Clone)]
pub struct DispatchConfig {
    /// Pause after a tick that found nothing to send.
    pub idle_sleep: Duration,
    /// Base URL used for unsubscribe links.
    pub public_url: String,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            idle_sleep: Duration::from_secs(3),
            public_url: "http://localhost:8080".to_string(),
        }
    }
}

impl DispatchConfig {
    pub fn unsubscribe_url(&self, recipient: &Recipient) -> String {
        format!(
            "{}/unsubscribe/{}",
            self.public_url.trim_end_matches('/'),
            recipient.token
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    Idle,
    /// Marked sent and handed to the send pool.
    Submitted(EmailId),
    /// Marked sent without transmission because the recipient is excluded.
    Suppressed(EmailId),
    /// Marked sent without transmission because its template failed to render.
    Unrenderable(EmailId),
}

struct Rendered {
    subject: String,
    text: String,
    html: Option<String>,
}

fn render_email(template: &Template, identity: &SendingIdentity, vars: &RenderContext) -> DomainResult<Rendered> {
    let html = if identity.sends_html() {
        Some(template.render_html(vars)?)
    } else {
        None
    };
    Ok(Rendered {
        subject: template.render_subject(vars)?,
        text: template.render_text(vars)?,
        html,
    })
}

pub struct DispatchFlow<S> {
    store: S,
    pool: SendPool,
    config: DispatchConfig,
}

impl<S: DataStore> DispatchFlow<S> {
    pub fn new(store: S, pool: SendPool, config: DispatchConfig) -> Self {
        Self {
            store,
            pool,
            config,
        }
    }

    pub async fn run(&self, ctx: &RunContext) -> Result<(), FlowError> {
        match self.dispatch_next().await? {
            DispatchOutcome::Idle => {
                debug!(flow = ctx.name(), "nothing due");
                // Never idle past the run deadline.
                ctx.sleep(self.config.idle_sleep.min(ctx.remaining())).await
            }
            DispatchOutcome::Submitted(email_id) => {
                debug!(flow = ctx.name(), email_id = %email_id, "email submitted");
                Ok(())
            }
            DispatchOutcome::Suppressed(_) | DispatchOutcome::Unrenderable(_) => Ok(()),
        }
    }

    /// Claim and send at most one due email.
    ///
    /// The email is stamped sent before transmission starts; a failed send
    /// is never retried. An email whose template cannot be rendered is
    /// stamped sent as well so it does not hold up the queue.
    pub async fn dispatch_next(&self) -> Result<DispatchOutcome, FlowError> {
        let now = Utc::now();
        let Some(email) = self.store.next_due_email(now).await? else {
            return Ok(DispatchOutcome::Idle);
        };

        let recipient = self.store.recipient(email.recipient_id).await?;
        let template = self.store.template(email.template_id).await?;
        let identity = self.store.identity(email.identity_id).await?;

        let vars = RenderContext::new()
            .with("email", recipient.email.as_str())
            .with("unsubscribe_url", self.config.unsubscribe_url(&recipient));
        let rendered = render_email(&template, &identity, &vars);

        self.store.mark_email_sent(email.id, now).await?;

        let Rendered { subject, text, html } = match rendered {
            Ok(rendered) => rendered,
            Err(err) => {
                error!(
                    email_id = %email.id,
                    template_id = %template.id,
                    error = %err,
                    "template failed to render, email skipped"
                );
                return Ok(DispatchOutcome::Unrenderable(email.id));
            }
        };

        if recipient.is_disabled() || recipient.is_do_not_email() {
            info!(
                email_id = %email.id,
                recipient_id = %recipient.id,
                "recipient excluded, transmission suppressed"
            );
            return Ok(DispatchOutcome::Suppressed(email.id));
        }

        let message = OutboundMessage::new(&identity, email.id, recipient.email, subject, text, html);
        if !self.pool.submit(message) {
            warn!(email_id = %email.id, "email marked sent but not transmitted");
        }
        Ok(DispatchOutcome::Submitted(email.id))
    }
}
