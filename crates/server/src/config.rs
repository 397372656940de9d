//! Server configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Required
//! - `STUDYPASS_DATABASE_URL` - `PostgreSQL` connection string, or `memory://`
//!   for the in-process store (falls back to `DATABASE_URL`)
//! - `STUDYPASS_CATALOG_PATH` - JSON file listing the module catalog in order
//! - `STUDYPASS_BASE_URL` - Public URL the gateway redirects back to
//! - `GATEWAY_API_BASE_URL` - Payment gateway API base URL
//! - `GATEWAY_API_KEY` - Payment gateway API key (high entropy)
//! - `GATEWAY_WEBHOOK_SECRET` - Callback signing secret (high entropy)
//!
//! ## Optional
//! - `STUDYPASS_HOST` - Bind address (default: 127.0.0.1)
//! - `STUDYPASS_PORT` - Listen port (default: 3000)
//! - `STUDYPASS_CURRENCY` - Checkout currency, `USD` or `EUR` (default: USD)
//! - `GATEWAY_SIGNATURE_TOLERANCE_SECS` - Callback timestamp tolerance (default: 300)
//! - `SENTRY_DSN` - Sentry error tracking DSN
//! - `SENTRY_ENVIRONMENT` - Sentry environment name

use std::collections::BTreeMap;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::str::FromStr;

use secrecy::{ExposeSecret, SecretString};
use thiserror::Error;
use url::Url;

use studypass_core::CurrencyCode;

/// Gateway credentials are random strings; anything below this is hand-typed.
const MIN_ENTROPY_BITS_PER_CHAR: f64 = 3.3;

/// Database URL selecting the in-memory document store.
pub const MEMORY_STORE_URL: &str = "memory://";

/// Default callback timestamp tolerance in seconds.
pub const DEFAULT_SIGNATURE_TOLERANCE_SECS: i64 = 300;

/// Substrings of copy-pasted sample values, matched case-insensitively.
const PLACEHOLDER_PATTERNS: &[&str] = &[
    "your-",
    "changeme",
    "replace",
    "placeholder",
    "example",
    "secret",
    "password",
    "xxx",
    "todo",
    "fixme",
    "insert",
    "enter-",
    "put-your",
    "add-your",
];

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
    #[error("Insecure secret in {0}: {1}")]
    InsecureSecret(String, String),
}

/// Where user documents live.
#[derive(Clone)]
pub enum StoreBackend {
    /// In-process map, lost on restart.
    Memory,
    /// `PostgreSQL` connection URL (contains password).
    Postgres(SecretString),
}

impl std::fmt::Debug for StoreBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Memory => f.write_str("Memory"),
            Self::Postgres(_) => f.write_str("Postgres([REDACTED])"),
        }
    }
}

/// Server application configuration.
#[derive(Debug, Clone)]
pub struct StudyPassConfig {
    /// Document store backend
    pub store: StoreBackend,
    /// IP address to bind the server to
    pub host: IpAddr,
    /// Port to listen on
    pub port: u16,
    /// Public base URL of the site
    pub base_url: Url,
    /// Catalog file
    pub catalog_path: PathBuf,
    /// Currency checkout prices are quoted in
    pub currency: CurrencyCode,
    /// Payment gateway configuration
    pub gateway: GatewayConfig,
    /// Sentry DSN for error tracking
    pub sentry_dsn: Option<String>,
    /// Sentry environment name
    pub sentry_environment: Option<String>,
}

/// Payment gateway configuration.
///
/// Implements `Debug` manually to redact secret fields.
#[derive(Clone)]
pub struct GatewayConfig {
    /// API base URL
    pub api_base_url: Url,
    /// API key sent as a bearer token
    pub api_key: SecretString,
    /// Shared secret for callback signatures
    pub webhook_secret: SecretString,
    /// Accepted callback timestamp skew in seconds
    pub signature_tolerance_secs: i64,
}

impl std::fmt::Debug for GatewayConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewayConfig")
            .field("api_base_url", &self.api_base_url.as_str())
            .field("api_key", &"[REDACTED]")
            .field("webhook_secret", &"[REDACTED]")
            .field("signature_tolerance_secs", &self.signature_tolerance_secs)
            .finish()
    }
}

impl StudyPassConfig {
    /// Load configuration from the environment, reading `.env` first if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if a required variable is missing or malformed,
    /// or if a gateway secret looks like a placeholder or is too predictable.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let database_url = database_url()?;
        let store = if database_url.expose_secret() == MEMORY_STORE_URL {
            StoreBackend::Memory
        } else {
            StoreBackend::Postgres(database_url)
        };

        Ok(Self {
            store,
            host: parsed_or("STUDYPASS_HOST", IpAddr::V4(Ipv4Addr::LOCALHOST))?,
            port: parsed_or("STUDYPASS_PORT", 3000)?,
            base_url: required_url("STUDYPASS_BASE_URL")?,
            catalog_path: PathBuf::from(required("STUDYPASS_CATALOG_PATH")?),
            currency: parsed_or("STUDYPASS_CURRENCY", CurrencyCode::USD)?,
            gateway: GatewayConfig::from_env()?,
            sentry_dsn: optional("SENTRY_DSN"),
            sentry_environment: optional("SENTRY_ENVIRONMENT"),
        })
    }

    /// Address the HTTP listener binds to.
    #[must_use]
    pub const fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }
}

impl GatewayConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let key = "GATEWAY_SIGNATURE_TOLERANCE_SECS";
        let signature_tolerance_secs: i64 = parsed_or(key, DEFAULT_SIGNATURE_TOLERANCE_SECS)?;
        if signature_tolerance_secs <= 0 {
            return Err(ConfigError::InvalidEnvVar(
                key.to_string(),
                "must be a positive number of seconds".to_string(),
            ));
        }

        Ok(Self {
            api_base_url: required_url("GATEWAY_API_BASE_URL")?,
            api_key: gateway_secret("GATEWAY_API_KEY")?,
            webhook_secret: gateway_secret("GATEWAY_WEBHOOK_SECRET")?,
            signature_tolerance_secs,
        })
    }
}

/// A set, non-empty variable.
fn optional(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}

fn required(key: &str) -> Result<String, ConfigError> {
    optional(key).ok_or_else(|| ConfigError::MissingEnvVar(key.to_string()))
}

fn required_url(key: &str) -> Result<Url, ConfigError> {
    Url::parse(&required(key)?)
        .map_err(|e| ConfigError::InvalidEnvVar(key.to_string(), e.to_string()))
}

/// Parse a variable, or use `default` when it is unset.
fn parsed_or<T>(key: &str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    optional(key).map_or(Ok(default), |raw| {
        raw.trim()
            .parse()
            .map_err(|e: T::Err| ConfigError::InvalidEnvVar(key.to_string(), e.to_string()))
    })
}

/// `STUDYPASS_DATABASE_URL`, falling back to the `DATABASE_URL` that hosted
/// Postgres add-ons inject.
fn database_url() -> Result<SecretString, ConfigError> {
    optional("STUDYPASS_DATABASE_URL")
        .or_else(|| optional("DATABASE_URL"))
        .map(SecretString::from)
        .ok_or_else(|| ConfigError::MissingEnvVar("STUDYPASS_DATABASE_URL".to_string()))
}

/// Read a gateway credential and reject obvious placeholders.
fn gateway_secret(key: &str) -> Result<SecretString, ConfigError> {
    let value = required(key)?;
    check_secret(key, &value)?;
    Ok(SecretString::from(value))
}

/// Average information per character, in bits.
fn bits_per_char(s: &str) -> f64 {
    let mut counts: BTreeMap<char, u32> = BTreeMap::new();
    let mut total = 0_u32;
    for c in s.chars() {
        *counts.entry(c).or_default() += 1;
        total += 1;
    }
    if total == 0 {
        return 0.0;
    }

    let total = f64::from(total);
    counts
        .into_values()
        .map(|n| {
            let p = f64::from(n) / total;
            -p * p.log2()
        })
        .sum()
}

fn check_secret(key: &str, value: &str) -> Result<(), ConfigError> {
    let lower = value.to_lowercase();
    if let Some(pattern) = PLACEHOLDER_PATTERNS.iter().find(|p| lower.contains(*p)) {
        return Err(ConfigError::InsecureSecret(
            key.to_string(),
            format!("looks like a placeholder (contains '{pattern}')"),
        ));
    }

    let bits = bits_per_char(value);
    if bits < MIN_ENTROPY_BITS_PER_CHAR {
        return Err(ConfigError::InsecureSecret(
            key.to_string(),
            format!(
                "too predictable ({bits:.2} bits/char, need {MIN_ENTROPY_BITS_PER_CHAR:.1}); copy the value from the gateway dashboard"
            ),
        ));
    }

    Ok(())
}
