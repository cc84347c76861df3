//! Process configuration read from the environment.

use std::fmt;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

use warmsend_infra::flows::TemplateRotation;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value for {key}: {message}")]
    Invalid { key: &'static str, message: String },
}

impl ConfigError {
    fn invalid(key: &'static str, message: impl ToString) -> Self {
        Self::Invalid {
            key,
            message: message.to_string(),
        }
    }
}

#[derive(Clone)]
pub struct AppConfig {
    pub bind: SocketAddr,
    /// `None` runs against the in-memory store.
    pub database_url: Option<String>,
    pub database_max_connections: u32,
    /// Bearer token for admin routes; admin routes answer 503 without one.
    pub admin_token: Option<String>,
    pub zerobounce_api_key: Option<String>,
    pub public_url: String,
    pub send_pool: usize,
    pub import_buffer: usize,
    pub rotation: TemplateRotation,
    pub queue_interval: Duration,
    pub dispatch_interval: Duration,
    pub validate_interval: Duration,
    pub run_timeout: Duration,
    pub send_timeout: Duration,
    pub shutdown_grace: Duration,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from(([0, 0, 0, 0], 8080)),
            database_url: None,
            database_max_connections: 10,
            admin_token: None,
            zerobounce_api_key: None,
            public_url: "http://localhost:8080".to_string(),
            send_pool: 16,
            import_buffer: 1024,
            rotation: TemplateRotation::default(),
            queue_interval: Duration::from_secs(60),
            dispatch_interval: Duration::from_secs(5),
            validate_interval: Duration::from_secs(3),
            run_timeout: Duration::from_secs(50),
            send_timeout: Duration::from_secs(60),
            shutdown_grace: Duration::from_secs(5),
        }
    }
}

// Secrets stay out of logs.
impl fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppConfig")
            .field("bind", &self.bind)
            .field("database", &self.database_url.as_ref().map(|_| "<set>"))
            .field("admin_token", &self.admin_token.as_ref().map(|_| "<set>"))
            .field("zerobounce", &self.zerobounce_api_key.as_ref().map(|_| "<set>"))
            .field("public_url", &self.public_url)
            .field("send_pool", &self.send_pool)
            .field("rotation", &self.rotation)
            .field("queue_interval", &self.queue_interval)
            .field("dispatch_interval", &self.dispatch_interval)
            .field("validate_interval", &self.validate_interval)
            .field("run_timeout", &self.run_timeout)
            .field("send_timeout", &self.send_timeout)
            .field("shutdown_grace", &self.shutdown_grace)
            .finish()
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a config from any key lookup. Blank values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let defaults = Self::default();

        Ok(Self {
            bind: parse_or(&get, "WARMSEND_BIND", defaults.bind)?,
            database_url: get("DATABASE_URL"),
            database_max_connections: parse_or(
                &get,
                "WARMSEND_DB_MAX_CONNECTIONS",
                defaults.database_max_connections,
            )?,
            admin_token: get("WARMSEND_ADMIN_TOKEN"),
            zerobounce_api_key: get("ZEROBOUNCE_API_KEY"),
            public_url: get("WARMSEND_PUBLIC_URL").unwrap_or(defaults.public_url),
            send_pool: positive(parse_or(&get, "WARMSEND_SEND_POOL", defaults.send_pool)?, "WARMSEND_SEND_POOL")?,
            import_buffer: positive(
                parse_or(&get, "WARMSEND_IMPORT_BUFFER", defaults.import_buffer)?,
                "WARMSEND_IMPORT_BUFFER",
            )?,
            rotation: parse_or(&get, "WARMSEND_ROTATION", defaults.rotation)?,
            queue_interval: secs_or(&get, "WARMSEND_QUEUE_SECS", defaults.queue_interval)?,
            dispatch_interval: secs_or(&get, "WARMSEND_DISPATCH_SECS", defaults.dispatch_interval)?,
            validate_interval: secs_or(&get, "WARMSEND_VALIDATE_SECS", defaults.validate_interval)?,
            run_timeout: secs_or(&get, "WARMSEND_RUN_TIMEOUT_SECS", defaults.run_timeout)?,
            send_timeout: secs_or(&get, "WARMSEND_SEND_TIMEOUT_SECS", defaults.send_timeout)?,
            shutdown_grace: secs_or(&get, "WARMSEND_GRACE_SECS", defaults.shutdown_grace)?,
        })
    }
}

fn parse_or<T>(
    get: &impl Fn(&str) -> Option<String>,
    key: &'static str,
    default: T,
) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    match get(key) {
        Some(raw) => raw.parse().map_err(|e| ConfigError::invalid(key, e)),
        None => Ok(default),
    }
}

fn secs_or(
    get: &impl Fn(&str) -> Option<String>,
    key: &'static str,
    default: Duration,
) -> Result<Duration, ConfigError> {
    let secs: u64 = parse_or(get, key, default.as_secs())?;
    if secs == 0 {
        return Err(ConfigError::invalid(key, "must be at least one second"));
    }
    Ok(Duration::from_secs(secs))
}

fn positive(value: usize, key: &'static str) -> Result<usize, ConfigError> {
    if value == 0 {
        return Err(ConfigError::invalid(key, "must be greater than zero"));
    }
    Ok(value)
}
