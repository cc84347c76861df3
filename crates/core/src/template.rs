//! Message templates and placeholder rendering.
//!
//! Subjects and bodies are Tera templates, usually just `{{ name }}`
//! placeholders filled from a [`RenderContext`]. An unknown name or a
//! malformed tag is a render error rather than silently shipped.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tera::{Context as TeraContext, Tera};

use crate::error::{DomainError, DomainResult};
use crate::flags::{Flag, FlagSet};
use crate::id::TemplateId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TemplateFlag {
    Deleted,
    Paused,
    /// Safe to send from identities that are still warming up.
    Warmup,
}

impl Flag for TemplateFlag {
    const ALL: &'static [Self] = &[TemplateFlag::Deleted, TemplateFlag::Paused, TemplateFlag::Warmup];

    fn bit(self) -> i64 {
        match self {
            TemplateFlag::Deleted => 1,
            TemplateFlag::Paused => 1 << 1,
            TemplateFlag::Warmup => 1 << 2,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Template {
    pub id: TemplateId,
    pub subject: String,
    /// Inbox preview text.
    pub preview: String,
    pub body_text: String,
    pub body_html: String,
    pub flags: FlagSet<TemplateFlag>,
    pub created_at: DateTime<Utc>,
}

impl Template {
    pub fn new(
        subject: impl Into<String>,
        body_text: impl Into<String>,
        body_html: impl Into<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: TemplateId::new(),
            subject: subject.into(),
            preview: String::new(),
            body_text: body_text.into(),
            body_html: body_html.into(),
            flags: FlagSet::empty(),
            created_at,
        }
    }

    pub fn inactive_flags() -> FlagSet<TemplateFlag> {
        FlagSet::of(&[TemplateFlag::Deleted, TemplateFlag::Paused])
    }

    pub fn is_active(&self) -> bool {
        !self.flags.intersects(Self::inactive_flags())
    }

    pub fn is_warmup(&self) -> bool {
        self.flags.contains(TemplateFlag::Warmup)
    }

    pub fn render_subject(&self, ctx: &RenderContext) -> DomainResult<String> {
        render(&self.subject, ctx)
    }

    pub fn render_text(&self, ctx: &RenderContext) -> DomainResult<String> {
        render(&self.body_text, ctx)
    }

    pub fn render_html(&self, ctx: &RenderContext) -> DomainResult<String> {
        render(&self.body_html, ctx)
    }
}

/// Values available to placeholders.
#[derive(Debug, Clone, Default)]
pub struct RenderContext {
    vars: TeraContext,
}

impl RenderContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: &str, value: impl Into<String>) -> Self {
        self.vars.insert(name, &value.into());
        self
    }
}

// Values are inserted verbatim; links in HTML bodies must survive unescaped.
fn render(source: &str, ctx: &RenderContext) -> DomainResult<String> {
    Tera::one_off(source, &ctx.vars, false).map_err(|err| DomainError::render(describe(&err)))
}

/// Tera nests the useful message (missing variable, parse position) in the
/// source chain.
fn describe(err: &tera::Error) -> String {
    let mut message = err.to_string();
    let mut source = std::error::Error::source(err);
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}
