//! Infrastructure construction from [`AppConfig`].

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tracing::{info, warn};

use warmsend_infra::store::{DataStore, InMemoryStore, PostgresStore, StoreError};
use warmsend_infra::transport::{MailTransport, SendGridTransport, TransportError};
use warmsend_infra::validation::{
    AcceptAllValidator, EmailValidator, ValidationError, ZeroBounceValidator,
};

use crate::config::AppConfig;

const VALIDATION_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("http server: {0}")]
    Io(#[from] std::io::Error),
}

/// The configured persistence backend.
#[derive(Debug, Clone)]
pub enum StoreBackend {
    InMemory(Arc<InMemoryStore>),
    Postgres(PostgresStore),
}

impl StoreBackend {
    pub fn shared(&self) -> Arc<dyn DataStore> {
        match self {
            Self::InMemory(store) => Arc::clone(store) as Arc<dyn DataStore>,
            Self::Postgres(store) => Arc::new(store.clone()),
        }
    }

    pub async fn close(&self) {
        if let Self::Postgres(store) = self {
            store.close().await;
            info!("database pool closed");
        }
    }
}

/// Connect and migrate Postgres, or fall back to memory without `DATABASE_URL`.
pub async fn connect_store(config: &AppConfig) -> Result<StoreBackend, ServiceError> {
    match config.database_url.as_deref() {
        Some(url) => {
            let store = PostgresStore::connect(url, config.database_max_connections).await?;
            store.migrate().await?;
            info!(max_connections = config.database_max_connections, "connected to postgres");
            Ok(StoreBackend::Postgres(store))
        }
        None => {
            warn!("DATABASE_URL not set; using in-memory store, nothing will persist");
            Ok(StoreBackend::InMemory(InMemoryStore::arc()))
        }
    }
}

pub fn build_transport(config: &AppConfig) -> Result<Arc<dyn MailTransport>, ServiceError> {
    Ok(Arc::new(SendGridTransport::new(config.send_timeout)?))
}

pub fn build_validator(config: &AppConfig) -> Result<Arc<dyn EmailValidator>, ServiceError> {
    match config.zerobounce_api_key.as_deref() {
        Some(key) => Ok(Arc::new(ZeroBounceValidator::new(key, VALIDATION_TIMEOUT)?)),
        None => {
            info!("ZEROBOUNCE_API_KEY not set; every address will be accepted");
            Ok(Arc::new(AcceptAllValidator))
        }
    }
}
