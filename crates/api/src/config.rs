//! Application configuration loaded from environment variables.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use domain::{Money, PricingPolicy};
use rust_decimal::Decimal;

/// Output format of the tracing subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl LogFormat {
    /// Parses `LOG_FORMAT`; anything other than `json` means text.
    pub fn parse(value: &str) -> Self {
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
/// - `HOST`: bind address (default: `"0.0.0.0"`)
/// - `PORT`: listen port (default: `3000`)
/// - `RUST_LOG`: tracing filter directive (default: `"info"`)
/// - `LOG_FORMAT`: `text` or `json` (default: `text`)
/// - `RESERVATION_TIMEOUT_MS`: per-line stock reservation budget (default: `2000`)
/// - `TAX_RATE`: flat tax rate (default: `0.18`)
/// - `FREE_SHIPPING_THRESHOLD`: free shipping from this amount (default: `1000`)
/// - `FLAT_SHIPPING_FEE`: shipping below the threshold (default: `50`)
/// - `SEED_FILE`: JSON fixture loaded into the in-memory stores
/// - `DATABASE_URL`: use PostgreSQL instead of the in-memory stores
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub log_format: LogFormat,
    pub reservation_timeout: Duration,
    pub pricing: PricingPolicy,
    pub seed_file: Option<PathBuf>,
    pub database_url: Option<String>,
}

impl Config {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let pricing = PricingPolicy {
            tax_rate: env_parse("TAX_RATE").unwrap_or(defaults.pricing.tax_rate),
            free_shipping_threshold: env_parse::<Decimal>("FREE_SHIPPING_THRESHOLD")
                .map(Money::new)
                .unwrap_or(defaults.pricing.free_shipping_threshold),
            flat_shipping_fee: env_parse::<Decimal>("FLAT_SHIPPING_FEE")
                .map(Money::new)
                .unwrap_or(defaults.pricing.flat_shipping_fee),
        };

        Self {
            host: std::env::var("HOST").unwrap_or(defaults.host),
            port: env_parse("PORT").unwrap_or(defaults.port),
            log_level: std::env::var("RUST_LOG").unwrap_or(defaults.log_level),
            log_format: std::env::var("LOG_FORMAT")
                .map(|v| LogFormat::parse(&v))
                .unwrap_or_default(),
            reservation_timeout: env_parse("RESERVATION_TIMEOUT_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.reservation_timeout),
            pricing,
            seed_file: std::env::var_os("SEED_FILE").map(PathBuf::from),
            database_url: std::env::var("DATABASE_URL").ok().filter(|url| !url.is_empty()),
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
            reservation_timeout: inventory::DEFAULT_RESERVE_TIMEOUT,
            pricing: PricingPolicy::default(),
            seed_file: None,
            database_url: None,
        }
    }
}

fn env_parse<T: FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.trim().parse().ok())
}
