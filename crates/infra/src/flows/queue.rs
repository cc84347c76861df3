//! Queueing flow: warm-up batches for cold identities, paced volume batches
//! for warm ones.

use std::str::FromStr;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{error, info, warn};

use warmsend_core::{
    DomainError, Email, IdentityFlag, RecipientFlag, SendingIdentity, performance,
    recommended_delay,
};

use crate::error::FlowError;
use crate::store::DataStore;
use crate::workers::RunContext;

/// Where the volume scheduler starts in the template list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TemplateRotation {
    /// Every scheduling call starts at the first template.
    #[default]
    PerRun,
    /// Rotation continues where the previous call stopped, for the life of
    /// the process.
    Persistent,
}

impl FromStr for TemplateRotation {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "per-run" | "per_run" => Ok(TemplateRotation::PerRun),
            "persistent" => Ok(TemplateRotation::Persistent),
            other => Err(DomainError::validation(format!(
                "unknown template rotation `{other}`, expected per-run or persistent"
            ))),
        }
    }
}

#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Emails per warm-up batch.
    pub warmup_batch: usize,
    pub min_warmup_recipients: usize,
    /// Recipients per volume batch.
    pub volume_batch: usize,
    pub rotation: TemplateRotation,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            warmup_batch: 30,
            min_warmup_recipients: 5,
            volume_batch: 20,
            rotation: TemplateRotation::PerRun,
        }
    }
}

impl QueueConfig {
    pub fn with_rotation(mut self, rotation: TemplateRotation) -> Self {
        self.rotation = rotation;
        self
    }
}

/// What one scheduling call did for one identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueueOutcome {
    /// The identity still has unsent emails; nothing was scheduled.
    AlreadyQueued { pending: u64 },
    Warmup { phase: IdentityFlag, scheduled: usize },
    Volume { scheduled: usize, delay: Duration },
    /// Every eligible recipient has been contacted already.
    NoAudience,
}

pub struct QueueFlow<S> {
    store: S,
    config: QueueConfig,
    rng: Mutex<StdRng>,
    cursor: AtomicUsize,
}

impl<S: DataStore> QueueFlow<S> {
    pub fn new(store: S, config: QueueConfig) -> Self {
        Self::with_rng(store, config, StdRng::from_entropy())
    }

    pub fn with_rng(store: S, config: QueueConfig, rng: StdRng) -> Self {
        Self {
            store,
            config,
            rng: Mutex::new(rng),
            cursor: AtomicUsize::new(0),
        }
    }

    /// One pass over every active identity.
    ///
    /// A failing identity is logged and skipped so the others still get
    /// scheduled; the next tick retries it.
    pub async fn run(&self, ctx: &RunContext) -> Result<(), FlowError> {
        let identities = self.store.active_identities().await?;

        for identity in &identities {
            ctx.checkpoint()?;
            match self.queue_identity(identity, Utc::now()).await {
                Ok(QueueOutcome::AlreadyQueued { .. }) => {}
                Ok(outcome) => info!(
                    flow = ctx.name(),
                    identity_id = %identity.id,
                    outcome = ?outcome,
                    "identity queued"
                ),
                Err(err) => error!(
                    flow = ctx.name(),
                    identity_id = %identity.id,
                    error = %err,
                    "queueing identity failed"
                ),
            }
        }
        Ok(())
    }

    /// Schedule the next batch for `identity`, starting at `now`.
    pub async fn queue_identity(
        &self,
        identity: &SendingIdentity,
        now: DateTime<Utc>,
    ) -> Result<QueueOutcome, FlowError> {
        let pending = self.store.pending_email_count(identity.id).await?;
        if pending > 0 {
            return Ok(QueueOutcome::AlreadyQueued { pending });
        }

        if identity.is_fully_warm() {
            self.queue_volume(identity, now).await
        } else {
            self.queue_warmup(identity, now).await
        }
    }

    async fn queue_warmup(
        &self,
        identity: &SendingIdentity,
        now: DateTime<Utc>,
    ) -> Result<QueueOutcome, FlowError> {
        let recipients = self
            .store
            .recipients_with_flags(RecipientFlag::Warmup.into())
            .await?;
        if recipients.len() < self.config.min_warmup_recipients {
            return Err(FlowError::precondition(format!(
                "not enough warmup users, found {} and need at least {}",
                recipients.len(),
                self.config.min_warmup_recipients
            )));
        }

        let templates = self.store.active_templates().await?;
        let template = templates
            .iter()
            .find(|t| t.is_warmup())
            .or_else(|| templates.first())
            .ok_or_else(|| FlowError::precondition("no templates for warmup"))?;

        let phase = identity
            .next_warmup_phase()
            .ok_or_else(|| DomainError::invariant("identity is already fully warm"))?;
        self.store.add_identity_flags(identity.id, phase.into()).await?;

        let gaps = self.draw(self.config.warmup_batch, |rng| {
            chrono::Duration::minutes(rng.gen_range(50..60))
        });

        let mut target = now;
        for (recipient, gap) in recipients.iter().cycle().zip(gaps) {
            let email = Email::schedule(identity.id, template.id, recipient.id, target);
            self.store.insert_email(&email).await?;
            target += gap;
        }

        Ok(QueueOutcome::Warmup {
            phase,
            scheduled: self.config.warmup_batch,
        })
    }

    async fn queue_volume(
        &self,
        identity: &SendingIdentity,
        now: DateTime<Utc>,
    ) -> Result<QueueOutcome, FlowError> {
        let templates: Vec<_> = self
            .store
            .active_templates()
            .await?
            .into_iter()
            .filter(|t| !t.is_warmup())
            .collect();
        if templates.is_empty() {
            return Err(FlowError::precondition(format!(
                "no templates for identity {}",
                identity.id
            )));
        }

        let recipients = self
            .store
            .unreached_recipients(self.config.volume_batch)
            .await?;
        if recipients.is_empty() {
            warn!(identity_id = %identity.id, "no more recipients to send to");
            return Ok(QueueOutcome::NoAudience);
        }

        let samples = self
            .store
            .performance_samples(identity.id, performance::SAMPLE_LIMIT)
            .await?;
        let delay = recommended_delay(&samples);
        let base = chrono::Duration::seconds(delay.as_secs() as i64);

        let jitter = self.draw(recipients.len(), |rng| {
            chrono::Duration::seconds(rng.gen_range(0..20))
        });
        let start = match self.config.rotation {
            TemplateRotation::PerRun => 0,
            TemplateRotation::Persistent => {
                self.cursor.fetch_add(recipients.len(), Ordering::Relaxed)
            }
        };

        let mut target = now;
        for (i, (recipient, jitter)) in recipients.iter().zip(jitter).enumerate() {
            let template = &templates[(start + i) % templates.len()];
            let email = Email::schedule(identity.id, template.id, recipient.id, target);
            self.store.insert_email(&email).await?;
            target += base + jitter;
        }

        Ok(QueueOutcome::Volume {
            scheduled: recipients.len(),
            delay,
        })
    }

    /// Draw `n` values from the shared generator without holding it across
    /// an await.
    fn draw<T>(&self, n: usize, mut f: impl FnMut(&mut StdRng) -> T) -> Vec<T> {
        let mut rng = match self.rng.lock() {
            Ok(rng) => rng,
            Err(poisoned) => poisoned.into_inner(),
        };
        (0..n).map(|_| f(&mut rng)).collect()
    }
}
