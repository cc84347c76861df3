//! Recurring units of work driven by the flow launcher, plus the import
//! handler fed by the recipient channel.

pub mod dispatch;
pub mod import;
pub mod queue;
pub mod validate;

pub use dispatch::{DispatchConfig, DispatchFlow, DispatchOutcome};
pub use import::{ImportOutcome, RecipientImport, import_recipient};
pub use queue::{QueueConfig, QueueFlow, QueueOutcome, TemplateRotation};
pub use validate::{ValidateFlow, ValidateOutcome};
