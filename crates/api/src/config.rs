//! Application configuration loaded from environment variables.

use std::time::Duration;

use common::{BasisPoints, Money};
use domain::PricingPolicy;
use store::DEFAULT_STATEMENT_TIMEOUT;

/// Output format of the log subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl LogFormat {
    fn parse(value: &str) -> Self {
        if value.eq_ignore_ascii_case("json") {
            LogFormat::Json
        } else {
            LogFormat::Text
        }
    }
}

/// Server configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `HOST`, `PORT`: bind address (default `0.0.0.0:3000`)
/// - `RUST_LOG`: tracing filter directive (default `info`)
/// - `LOG_FORMAT`: `text` or `json` (default `text`)
/// - `DATABASE_URL`: PostgreSQL URL; without it the in-memory store is used
/// - `DATABASE_MAX_CONNECTIONS` (default 10)
/// - `STATEMENT_TIMEOUT_MS` (default 2000)
/// - `FREE_SHIPPING_THRESHOLD_CENTS`, `FLAT_SHIPPING_CENTS`, `TAX_RATE_BPS`:
///   pricing policy (defaults 100000, 9900, 1600)
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub log_format: LogFormat,
    pub database_url: Option<String>,
    pub database_max_connections: u32,
    pub statement_timeout: Duration,
    pub pricing: PricingPolicy,
}

impl Config {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Builds a configuration from any variable source. Unparseable values
    /// fall back to their defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let parsed = |name: &str| lookup(name).and_then(|v| v.trim().parse::<i64>().ok());

        Self {
            host: lookup("HOST").unwrap_or(defaults.host),
            port: lookup("PORT")
                .and_then(|p| p.parse().ok())
                .unwrap_or(defaults.port),
            log_level: lookup("RUST_LOG").unwrap_or(defaults.log_level),
            log_format: lookup("LOG_FORMAT")
                .map(|v| LogFormat::parse(&v))
                .unwrap_or(defaults.log_format),
            database_url: lookup("DATABASE_URL").filter(|url| !url.trim().is_empty()),
            database_max_connections: lookup("DATABASE_MAX_CONNECTIONS")
                .and_then(|v| v.parse().ok())
                .filter(|n| *n > 0)
                .unwrap_or(defaults.database_max_connections),
            statement_timeout: lookup("STATEMENT_TIMEOUT_MS")
                .and_then(|v| v.parse().ok())
                .filter(|ms| *ms > 0)
                .map(Duration::from_millis)
                .unwrap_or(defaults.statement_timeout),
            pricing: PricingPolicy {
                free_shipping_threshold: parsed("FREE_SHIPPING_THRESHOLD_CENTS")
                    .map(Money::from_cents)
                    .unwrap_or(defaults.pricing.free_shipping_threshold),
                flat_shipping: parsed("FLAT_SHIPPING_CENTS")
                    .map(Money::from_cents)
                    .unwrap_or(defaults.pricing.flat_shipping),
                tax_rate: lookup("TAX_RATE_BPS")
                    .and_then(|v| v.trim().parse().ok())
                    .map(BasisPoints::new)
                    .unwrap_or(defaults.pricing.tax_rate),
            },
        }
    }

    /// Returns the `"host:port"` bind address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            log_level: "info".to_string(),
            log_format: LogFormat::Text,
            database_url: None,
            database_max_connections: 10,
            statement_timeout: DEFAULT_STATEMENT_TIMEOUT,
            pricing: PricingPolicy::default(),
        }
    }
}
