//! Persistence for identities, templates, recipients and emails.
//!
//! ## Components
//!
//! - `DataStore`: async domain queries used by every flow and by the HTTP layer
//! - `InMemoryStore`: `RwLock<HashMap>` backend for tests and local runs
//! - `PostgresStore`: SQLx backend with the schema under `migrations/`

pub mod in_memory;
pub mod postgres;
mod r#trait;

pub use in_memory::InMemoryStore;
pub use postgres::PostgresStore;
pub use r#trait::{DataStore, StoreError};
