use std::str::FromStr;
use std::time::Duration;

use anyhow::{bail, Context, Result};

use crate::directory::retry::RetryPolicy;

pub const DEFAULT_CONFIDENCE_THRESHOLD: f64 = 0.75;
pub const DEFAULT_NEGATIVE_TTL_DAYS: i64 = 7;
pub const DEFAULT_CACHE_TABLE: &str = "company_resolution_cache";

/// Tunable knobs of the tiered resolver and the negative cache.
#[derive(Debug, Clone)]
pub struct ResolutionSettings {
    pub confidence_threshold: f64,
    /// How long a negative entry suppresses new live lookups.
    pub negative_ttl: chrono::Duration,
    pub allow_fallback_tier: bool,
    /// The fuzzy tier accepts at `confidence_threshold - fuzzy_relaxation`...
    pub fuzzy_relaxation: f64,
    /// ...but never below this floor.
    pub fuzzy_floor: f64,
    pub name_search_limit: usize,
}

impl Default for ResolutionSettings {
    fn default() -> Self {
        Self {
            confidence_threshold: DEFAULT_CONFIDENCE_THRESHOLD,
            negative_ttl: chrono::Duration::days(DEFAULT_NEGATIVE_TTL_DAYS),
            allow_fallback_tier: true,
            fuzzy_relaxation: 0.05,
            fuzzy_floor: 0.5,
            name_search_limit: 5,
        }
    }
}

impl ResolutionSettings {
    /// Threshold used by the fuzzy tier for a given base threshold.
    pub fn relaxed_threshold(&self, threshold: f64) -> f64 {
        (threshold - self.fuzzy_relaxation).max(self.fuzzy_floor)
    }
}

/// Which backing store holds the resolution cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheBackend {
    Rest { url: String, api_key: String },
    Postgres { database_url: String },
    Memory,
}

/// Resolver configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct ResolverConfig {
    pub directory_api_url: String,
    pub directory_api_key: String,
    pub directory_fallback_url: Option<String>,
    pub cache_backend: CacheBackend,
    pub cache_table: String,
    pub directory_timeout: Duration,
    pub cache_timeout: Duration,
    pub batch_concurrency: usize,
    pub settings: ResolutionSettings,
    pub retry: RetryPolicy,
    pub rust_log: String,
}

impl ResolverConfig {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing

        let directory_fallback_url = optional_env("DIRECTORY_FALLBACK_URL");

        let cache_backend = match optional_env("CACHE_BACKEND").as_deref() {
            None | Some("rest") => CacheBackend::Rest {
                url: require_env("CACHE_STORE_URL")?,
                api_key: require_env("CACHE_STORE_KEY")?,
            },
            Some("postgres") => CacheBackend::Postgres {
                database_url: require_env("DATABASE_URL")?,
            },
            Some("memory") => CacheBackend::Memory,
            Some(other) => bail!("CACHE_BACKEND must be one of rest, postgres, memory (got '{other}')"),
        };

        let defaults = ResolutionSettings::default();
        let confidence_threshold =
            parse_env("CONFIDENCE_THRESHOLD", defaults.confidence_threshold)?;
        if !(0.0..=1.0).contains(&confidence_threshold) {
            bail!("CONFIDENCE_THRESHOLD must be within 0.0..=1.0 (got {confidence_threshold})");
        }
        let negative_ttl_days: i64 = parse_env("NEGATIVE_TTL_DAYS", DEFAULT_NEGATIVE_TTL_DAYS)?;
        let allow_fallback_tier =
            parse_env("ALLOW_FALLBACK_TIER", directory_fallback_url.is_some())?;

        let retry_defaults = RetryPolicy::default();
        let retry = RetryPolicy {
            rate_limit_max_attempts: parse_env(
                "RATE_LIMIT_MAX_ATTEMPTS",
                retry_defaults.rate_limit_max_attempts,
            )?,
            base_delay: Duration::from_millis(parse_env(
                "RETRY_BASE_DELAY_MS",
                retry_defaults.base_delay.as_millis() as u64,
            )?),
            unavailable_retry_delay: Duration::from_millis(parse_env(
                "UNAVAILABLE_RETRY_DELAY_MS",
                retry_defaults.unavailable_retry_delay.as_millis() as u64,
            )?),
            ..retry_defaults
        };

        Ok(ResolverConfig {
            directory_api_url: require_env("DIRECTORY_API_URL")?,
            directory_api_key: require_env("DIRECTORY_API_KEY")?,
            directory_fallback_url,
            cache_backend,
            cache_table: optional_env("CACHE_TABLE")
                .unwrap_or_else(|| DEFAULT_CACHE_TABLE.to_string()),
            directory_timeout: Duration::from_secs(parse_env("DIRECTORY_TIMEOUT_SECS", 30)?),
            cache_timeout: Duration::from_secs(parse_env("CACHE_TIMEOUT_SECS", 10)?),
            batch_concurrency: parse_env("BATCH_CONCURRENCY", 8usize)?.max(1),
            settings: ResolutionSettings {
                confidence_threshold,
                negative_ttl: chrono::Duration::days(negative_ttl_days),
                allow_fallback_tier,
                ..defaults
            },
            retry,
            rust_log: std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
        })
    }
}

fn require_env(key: &str) -> Result<String> {
    std::env::var(key).with_context(|| format!("Required environment variable '{key}' is not set"))
}

fn optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn parse_env<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match optional_env(key) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .with_context(|| format!("{key} has an invalid value '{raw}'")),
        None => Ok(default),
    }
}
