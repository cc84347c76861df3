//! `warmsend-core`: domain building blocks for the dispatch backend.
//!
//! This crate contains **pure domain** primitives (no I/O, no async). Sending
//! identities, templates, recipients and emails live here together with the
//! rules that govern them: flag sets, the delivery-status ladder and the
//! send-cadence estimator.

pub mod email;
pub mod error;
pub mod flags;
pub mod id;
pub mod identity;
pub mod performance;
pub mod recipient;
pub mod status;
pub mod template;

pub use email::Email;
pub use error::{DomainError, DomainResult};
pub use flags::{Flag, FlagSet};
pub use id::{EmailId, IdentityId, RecipientId, TemplateId};
pub use identity::{IdentityAttrs, IdentityFlag, SendingIdentity};
pub use performance::{PerformanceSample, recommended_delay};
pub use recipient::{Recipient, RecipientFlag, do_not_email, looks_like_email};
pub use status::{EmailStatus, StatusChange, next_status};
pub use template::{RenderContext, Template, TemplateFlag};
