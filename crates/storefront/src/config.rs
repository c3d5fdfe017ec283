//! Storefront configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Required
//! - `STOREFRONT_BASE_URL` - Public URL for the storefront (`https://` enables secure cookies)
//! - `STOREFRONT_DATABASE_URL` - `PostgreSQL` connection string (falls back to
//!   `DATABASE_URL`; only required with the `postgres` store)
//! - `STRIPE_SECRET_KEY` - Card processor secret API key
//!
//! ## Optional
//! - `STOREFRONT_STORE` - `postgres` (default) or `memory`
//! - `STOREFRONT_HOST` - Bind address (default: 127.0.0.1)
//! - `STOREFRONT_PORT` - Listen port (default: 5000)
//! - `STOREFRONT_STATIC_DIR` - Directory of the built browser client to serve
//! - `STOREFRONT_RATE_LIMIT` - Rate limit the auth endpoints (default: true)
//! - `STOREFRONT_FREE_SHIPPING_THRESHOLD` - Items total above which shipping is free (default: 100)
//! - `STOREFRONT_FLAT_SHIPPING_FEE` - Shipping charged otherwise (default: 10)
//! - `STOREFRONT_TAX_RATE` - Tax as a fraction of the items total (default: 0.15)
//! - `STRIPE_API_BASE` - Processor API base URL (default: <https://api.stripe.com>)
//! - `STRIPE_CURRENCY` - ISO currency code for intents (default: inr)
//! - `STRIPE_TIMEOUT_SECS` - Processor request timeout (default: 10)
//! - `SENTRY_DSN` - Sentry error tracking DSN
//! - `SENTRY_ENVIRONMENT` - Sentry environment name

use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use marigold_core::{Money, PricingConfig};
use rust_decimal::Decimal;
use secrecy::SecretString;
use thiserror::Error;
use url::Url;

const MIN_ENTROPY_BITS_PER_CHAR: f64 = 3.3;

/// Blocklist of common placeholder patterns (case-insensitive)
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

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
    #[error("Insecure secret in {0}: {1}")]
    InsecureSecret(String, String),
}

/// Which persistence backend to run against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    /// `PostgreSQL` via sqlx.
    Postgres,
    /// Process memory. Data is lost on restart.
    Memory,
}

impl FromStr for StoreBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "postgres" | "postgresql" => Ok(Self::Postgres),
            "memory" => Ok(Self::Memory),
            other => Err(format!("expected `postgres` or `memory`, got `{other}`")),
        }
    }
}

/// Storefront application configuration.
#[derive(Debug, Clone)]
pub struct StorefrontConfig {
    /// Persistence backend
    pub store: StoreBackend,
    /// `PostgreSQL` database connection URL (contains password)
    pub database_url: Option<SecretString>,
    /// IP address to bind the server to
    pub host: IpAddr,
    /// Port to listen on
    pub port: u16,
    /// Public base URL for the storefront
    pub base_url: Url,
    /// Built browser client to serve for non-API paths
    pub static_dir: Option<PathBuf>,
    /// Whether the auth endpoints are rate limited
    pub rate_limit: bool,
    /// Shipping and tax constants
    pub pricing: PricingConfig,
    /// Card processor configuration
    pub stripe: StripeConfig,
    /// Sentry DSN for error tracking
    pub sentry_dsn: Option<String>,
    /// Sentry environment name
    pub sentry_environment: Option<String>,
}

/// Card processor configuration.
///
/// Implements `Debug` manually to redact the secret key.
#[derive(Clone)]
pub struct StripeConfig {
    /// Secret API key
    pub secret_key: SecretString,
    /// API base URL, overridable for tests and proxies
    pub api_base: Url,
    /// Lowercase ISO currency code
    pub currency: String,
    /// Bound on each processor request
    pub timeout: Duration,
}

impl std::fmt::Debug for StripeConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StripeConfig")
            .field("secret_key", &"[REDACTED]")
            .field("api_base", &self.api_base.as_str())
            .field("currency", &self.currency)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl StorefrontConfig {
    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing, invalid, or
    /// if secrets fail validation (placeholder detection, entropy check).
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let store: StoreBackend = get_parsed_env("STOREFRONT_STORE", "postgres")?;
        let database_url = match store {
            StoreBackend::Postgres => Some(get_database_url("STOREFRONT_DATABASE_URL")?),
            StoreBackend::Memory => None,
        };
        let host: IpAddr = get_parsed_env("STOREFRONT_HOST", "127.0.0.1")?;
        let port: u16 = get_parsed_env("STOREFRONT_PORT", "5000")?;
        let base_url = parse_url("STOREFRONT_BASE_URL", &get_required_env("STOREFRONT_BASE_URL")?)?;
        let static_dir = get_optional_env("STOREFRONT_STATIC_DIR").map(PathBuf::from);
        let rate_limit: bool = get_parsed_env("STOREFRONT_RATE_LIMIT", "true")?;

        let pricing = pricing_from_env()?;
        let stripe = StripeConfig::from_env()?;

        Ok(Self {
            store,
            database_url,
            host,
            port,
            base_url,
            static_dir,
            rate_limit,
            pricing,
            stripe,
            sentry_dsn: get_optional_env("SENTRY_DSN"),
            sentry_environment: get_optional_env("SENTRY_ENVIRONMENT"),
        })
    }

    /// Returns the socket address for binding the server.
    #[must_use]
    pub const fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }

    /// Whether session cookies should carry the `Secure` attribute.
    #[must_use]
    pub fn secure_cookies(&self) -> bool {
        self.base_url.scheme() == "https"
    }
}

impl StripeConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let secret_key = get_validated_secret("STRIPE_SECRET_KEY")?;
        let api_base = parse_url(
            "STRIPE_API_BASE",
            &get_env_or_default("STRIPE_API_BASE", "https://api.stripe.com"),
        )?;
        let currency = get_env_or_default("STRIPE_CURRENCY", "inr").to_ascii_lowercase();
        if currency.len() != 3 || !currency.chars().all(|c| c.is_ascii_alphabetic()) {
            return Err(ConfigError::InvalidEnvVar(
                "STRIPE_CURRENCY".to_string(),
                format!("expected a three-letter ISO code, got `{currency}`"),
            ));
        }
        let timeout_secs: u64 = get_parsed_env("STRIPE_TIMEOUT_SECS", "10")?;
        if timeout_secs == 0 {
            return Err(ConfigError::InvalidEnvVar(
                "STRIPE_TIMEOUT_SECS".to_string(),
                "must be greater than zero".to_string(),
            ));
        }

        Ok(Self {
            secret_key,
            api_base,
            currency,
            timeout: Duration::from_secs(timeout_secs),
        })
    }
}

fn pricing_from_env() -> Result<PricingConfig, ConfigError> {
    let defaults = PricingConfig::default();
    let free_shipping_threshold = get_optional_env("STOREFRONT_FREE_SHIPPING_THRESHOLD")
        .map(|v| parse_amount("STOREFRONT_FREE_SHIPPING_THRESHOLD", &v))
        .transpose()?
        .unwrap_or(defaults.free_shipping_threshold);
    let flat_shipping_fee = get_optional_env("STOREFRONT_FLAT_SHIPPING_FEE")
        .map(|v| parse_amount("STOREFRONT_FLAT_SHIPPING_FEE", &v))
        .transpose()?
        .unwrap_or(defaults.flat_shipping_fee);
    let tax_rate = get_optional_env("STOREFRONT_TAX_RATE")
        .map(|v| parse_rate("STOREFRONT_TAX_RATE", &v))
        .transpose()?
        .unwrap_or(defaults.tax_rate);

    Ok(PricingConfig {
        free_shipping_threshold,
        flat_shipping_fee,
        tax_rate,
    })
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Get a required environment variable.
fn get_required_env(key: &str) -> Result<String, ConfigError> {
    std::env::var(key).map_err(|_| ConfigError::MissingEnvVar(key.to_string()))
}

/// Get database URL with fallback to generic `DATABASE_URL` (used by Fly.io postgres attach).
fn get_database_url(primary_key: &str) -> Result<SecretString, ConfigError> {
    if let Ok(value) = std::env::var(primary_key) {
        return Ok(SecretString::from(value));
    }
    if let Ok(value) = std::env::var("DATABASE_URL") {
        return Ok(SecretString::from(value));
    }
    Err(ConfigError::MissingEnvVar(primary_key.to_string()))
}

/// Get an optional environment variable. Blank values count as unset.
fn get_optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

/// Get an environment variable with a default value.
fn get_env_or_default(key: &str, default: &str) -> String {
    get_optional_env(key).unwrap_or_else(|| default.to_string())
}

/// Get and parse an environment variable, falling back to `default`.
fn get_parsed_env<T>(key: &str, default: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    get_env_or_default(key, default)
        .trim()
        .parse::<T>()
        .map_err(|e| ConfigError::InvalidEnvVar(key.to_string(), e.to_string()))
}

fn parse_url(key: &str, value: &str) -> Result<Url, ConfigError> {
    let url = Url::parse(value)
        .map_err(|e| ConfigError::InvalidEnvVar(key.to_string(), e.to_string()))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(ConfigError::InvalidEnvVar(
            key.to_string(),
            format!("unsupported scheme `{}`", url.scheme()),
        ));
    }
    Ok(url)
}

fn parse_amount(key: &str, value: &str) -> Result<Money, ConfigError> {
    let amount = value
        .parse::<Money>()
        .map_err(|e| ConfigError::InvalidEnvVar(key.to_string(), e.to_string()))?;
    if amount.is_negative() {
        return Err(ConfigError::InvalidEnvVar(
            key.to_string(),
            "cannot be negative".to_string(),
        ));
    }
    Ok(amount)
}

fn parse_rate(key: &str, value: &str) -> Result<Decimal, ConfigError> {
    let rate = Decimal::from_str(value.trim())
        .map_err(|e| ConfigError::InvalidEnvVar(key.to_string(), e.to_string()))?;
    if rate.is_sign_negative() || rate > Decimal::ONE {
        return Err(ConfigError::InvalidEnvVar(
            key.to_string(),
            "must be between 0 and 1".to_string(),
        ));
    }
    Ok(rate)
}

/// Calculate Shannon entropy in bits per character.
fn shannon_entropy(s: &str) -> f64 {
    if s.is_empty() {
        return 0.0;
    }

    let mut freq: HashMap<char, usize> = HashMap::new();
    for c in s.chars() {
        *freq.entry(c).or_insert(0) += 1;
    }

    #[allow(clippy::cast_precision_loss)] // String length will never exceed f64 precision
    let len = s.len() as f64;
    freq.values()
        .map(|&count| {
            #[allow(clippy::cast_precision_loss)] // Character count will never exceed f64 precision
            let p = count as f64 / len;
            -p * p.log2()
        })
        .sum()
}

/// Validate that a secret is not a placeholder and has sufficient entropy.
fn validate_secret_strength(secret: &str, var_name: &str) -> Result<(), ConfigError> {
    let lower = secret.to_lowercase();

    for pattern in PLACEHOLDER_PATTERNS {
        if lower.contains(pattern) {
            return Err(ConfigError::InsecureSecret(
                var_name.to_string(),
                format!("appears to be a placeholder (contains '{pattern}')"),
            ));
        }
    }

    // Real API keys are random and score well above this
    let entropy = shannon_entropy(secret);
    if entropy < MIN_ENTROPY_BITS_PER_CHAR {
        return Err(ConfigError::InsecureSecret(
            var_name.to_string(),
            format!(
                "entropy too low ({entropy:.2} bits/char, need >= {MIN_ENTROPY_BITS_PER_CHAR:.1}). Use the key issued by the processor."
            ),
        ));
    }

    Ok(())
}

/// Load and validate a secret from environment.
fn get_validated_secret(key: &str) -> Result<SecretString, ConfigError> {
    let value = get_required_env(key)?;
    validate_secret_strength(&value, key)?;
    Ok(SecretString::from(value))
}
