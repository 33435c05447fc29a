//! Application configuration loaded from environment variables.

use chrono::Duration;
use domain::{Money, PricingPolicy};
use secrecy::SecretString;
use services::auth::{DEFAULT_ACCESS_TTL_SECS, DEFAULT_REFRESH_TTL_SECS};

/// Signing secret used when `JWT_SECRET` is unset. Only fit for development.
pub const DEV_JWT_SECRET: &str = "dev-secret-change-me";

/// Errors raised while reading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid value for {name}: {value:?}")]
    Invalid { name: &'static str, value: String },
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Server configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `HOST`, `PORT`: bind address (default `0.0.0.0:5000`)
/// - `RUST_LOG`: tracing filter directive (default `info`)
/// - `LOG_FORMAT`: `pretty` or `json`
/// - `DATABASE_URL`: Postgres connection string; unset runs in memory
/// - `DB_MAX_CONNECTIONS`: pool size (default 10)
/// - `JWT_SECRET`, `JWT_ACCESS_TTL_SECS`, `JWT_REFRESH_TTL_SECS`
/// - `FREE_SHIPPING_THRESHOLD_CENTS`, `FLAT_SHIPPING_CENTS`, `TAX_RATE_BPS`
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub log_format: LogFormat,
    pub database_url: Option<String>,
    pub db_max_connections: u32,
    pub jwt_secret: SecretString,
    /// True when `jwt_secret` fell back to [`DEV_JWT_SECRET`].
    pub jwt_secret_is_default: bool,
    pub access_token_ttl: Duration,
    pub refresh_token_ttl: Duration,
    pub pricing: PricingPolicy,
}

impl Config {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Loads configuration through `lookup`, which returns the raw value of a
    /// variable if it is set.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let pricing = PricingPolicy::default();

        let log_format = match lookup("LOG_FORMAT").as_deref() {
            None | Some("pretty") => LogFormat::Pretty,
            Some("json") => LogFormat::Json,
            Some(other) => {
                return Err(ConfigError::Invalid {
                    name: "LOG_FORMAT",
                    value: other.to_string(),
                });
            }
        };

        let jwt_secret = lookup("JWT_SECRET").filter(|s| !s.is_empty());
        let jwt_secret_is_default = jwt_secret.is_none();

        Ok(Self {
            host: lookup("HOST").unwrap_or(defaults.host),
            port: parse(&lookup, "PORT", defaults.port)?,
            log_level: lookup("RUST_LOG").unwrap_or(defaults.log_level),
            log_format,
            database_url: lookup("DATABASE_URL").filter(|s| !s.is_empty()),
            db_max_connections: parse(&lookup, "DB_MAX_CONNECTIONS", defaults.db_max_connections)?,
            jwt_secret: SecretString::from(
                jwt_secret.unwrap_or_else(|| DEV_JWT_SECRET.to_string()),
            ),
            jwt_secret_is_default,
            access_token_ttl: Duration::seconds(parse(
                &lookup,
                "JWT_ACCESS_TTL_SECS",
                DEFAULT_ACCESS_TTL_SECS,
            )?),
            refresh_token_ttl: Duration::seconds(parse(
                &lookup,
                "JWT_REFRESH_TTL_SECS",
                DEFAULT_REFRESH_TTL_SECS,
            )?),
            pricing: PricingPolicy {
                free_shipping_threshold: Money::from_cents(parse(
                    &lookup,
                    "FREE_SHIPPING_THRESHOLD_CENTS",
                    pricing.free_shipping_threshold.cents(),
                )?),
                flat_shipping: Money::from_cents(parse(
                    &lookup,
                    "FLAT_SHIPPING_CENTS",
                    pricing.flat_shipping.cents(),
                )?),
                tax_rate_bps: parse(&lookup, "TAX_RATE_BPS", pricing.tax_rate_bps)?,
            },
        })
    }

    /// Returns the `"host:port"` bind address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn parse<F, T>(lookup: &F, name: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    match lookup(name) {
        None => Ok(default),
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { name, value }),
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 5000,
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            database_url: None,
            db_max_connections: 10,
            jwt_secret: SecretString::from(DEV_JWT_SECRET.to_string()),
            jwt_secret_is_default: true,
            access_token_ttl: Duration::seconds(DEFAULT_ACCESS_TTL_SECS),
            refresh_token_ttl: Duration::seconds(DEFAULT_REFRESH_TTL_SECS),
            pricing: PricingPolicy::default(),
        }
    }
}
