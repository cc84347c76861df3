//! Infrastructure layer: persistence, provider clients, background flows.
//!
//! The dispatch backend is three recurring flows (queueing, dispatch and
//! address validation) plus the reconciler that feeds provider webhooks back
//! into the store. Everything here talks to the outside world through the
//! [`store::DataStore`], [`transport::MailTransport`] and
//! [`validation::EmailValidator`] traits.

pub mod error;
pub mod flows;
pub mod reconcile;
pub mod standing;
pub mod store;
pub mod transport;
pub mod validation;
pub mod workers;

pub use error::FlowError;

#[cfg(test)]
mod integration_tests;
