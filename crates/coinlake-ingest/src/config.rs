//! Configuration management
//!
//! One [`Config`] is built at startup (environment, optionally seeded from a
//! `.env` file) and handed to each component by reference.

use coinlake_common::{LakeError, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::storage::config::StorageConfig;

// ============================================================================
// API Configuration Constants
// ============================================================================

/// Default upstream API base URL.
pub const DEFAULT_API_BASE_URL: &str = "https://api.coingecko.com/api/v3";

/// Per-attempt request timeout in seconds.
pub const DEFAULT_API_TIMEOUT_SECS: u64 = 10;

/// Attempts per request before the fetcher gives up.
pub const DEFAULT_API_MAX_ATTEMPTS: u32 = 3;

/// Sleep after an HTTP 429 before the next attempt.
pub const DEFAULT_RATE_LIMIT_COOLDOWN_SECS: u64 = 60;

/// Sleep between failed attempts (not applied after the last one).
pub const DEFAULT_RETRY_DELAY_SECS: u64 = 5;

pub const DEFAULT_USER_AGENT: &str = concat!("coinlake/", env!("CARGO_PKG_VERSION"));

// ============================================================================
// Lake Configuration Constants
// ============================================================================

pub const DEFAULT_RAW_DATA_BUCKET: &str = "raw-data";

/// Reserved for processed outputs; nothing in this crate writes to it.
pub const DEFAULT_PROCESSED_DATA_BUCKET: &str = "processed-data";

/// Reserved for log shipping; nothing in this crate writes to it.
pub const DEFAULT_LOGS_BUCKET: &str = "logs";

/// First path segment of every archived object.
pub const DEFAULT_ROOT_PREFIX: &str = "crypto";

// ============================================================================
// Dump Plan Constants
// ============================================================================

pub const DEFAULT_VS_CURRENCY: &str = "usd";
pub const DEFAULT_PER_PAGE: u32 = 100;
pub const DEFAULT_PAGES: u32 = 5;

/// Upper bound the markets endpoint accepts for `per_page`.
pub const MAX_PER_PAGE: u32 = 250;

pub const DEFAULT_GLOBAL_DELAY_SECS: u64 = 2;
pub const DEFAULT_MARKETS_DELAY_SECS: u64 = 3;
pub const DEFAULT_DETAILS_DELAY_SECS: u64 = 2;

/// Full application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    pub api: ApiConfig,
    pub storage: StorageConfig,
    pub lake: LakeConfig,
    pub dump: DumpConfig,
}

/// Upstream REST API settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    pub base_url: String,

    /// Read from the environment but only sent when `api_key_header` is set.
    pub api_key: Option<String>,

    /// Header name used to send `api_key` (e.g. `x-cg-demo-api-key`).
    pub api_key_header: Option<String>,

    pub timeout_secs: u64,
    pub max_attempts: u32,
    pub rate_limit_cooldown_secs: u64,
    pub retry_delay_secs: u64,
    pub user_agent: String,
}

/// Bucket layout of the lake
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LakeConfig {
    pub raw_bucket: String,
    pub processed_bucket: String,
    pub logs_bucket: String,
    pub root_prefix: String,
}

/// Parameters of a full dump run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DumpConfig {
    pub vs_currency: String,
    pub per_page: u32,
    pub pages: u32,
    pub global_delay_secs: u64,
    pub markets_delay_secs: u64,
    pub details_delay_secs: u64,
}

impl ApiConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn rate_limit_cooldown(&self) -> Duration {
        Duration::from_secs(self.rate_limit_cooldown_secs)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_secs(self.retry_delay_secs)
    }

    /// Join an endpoint path onto the base URL.
    pub fn endpoint_url(&self, endpoint: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            endpoint.trim_start_matches('/')
        )
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_API_BASE_URL.to_string(),
            api_key: None,
            api_key_header: None,
            timeout_secs: DEFAULT_API_TIMEOUT_SECS,
            max_attempts: DEFAULT_API_MAX_ATTEMPTS,
            rate_limit_cooldown_secs: DEFAULT_RATE_LIMIT_COOLDOWN_SECS,
            retry_delay_secs: DEFAULT_RETRY_DELAY_SECS,
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

impl Default for LakeConfig {
    fn default() -> Self {
        Self {
            raw_bucket: DEFAULT_RAW_DATA_BUCKET.to_string(),
            processed_bucket: DEFAULT_PROCESSED_DATA_BUCKET.to_string(),
            logs_bucket: DEFAULT_LOGS_BUCKET.to_string(),
            root_prefix: DEFAULT_ROOT_PREFIX.to_string(),
        }
    }
}

impl Default for DumpConfig {
    fn default() -> Self {
        Self {
            vs_currency: DEFAULT_VS_CURRENCY.to_string(),
            per_page: DEFAULT_PER_PAGE,
            pages: DEFAULT_PAGES,
            global_delay_secs: DEFAULT_GLOBAL_DELAY_SECS,
            markets_delay_secs: DEFAULT_MARKETS_DELAY_SECS,
            details_delay_secs: DEFAULT_DETAILS_DELAY_SECS,
        }
    }
}

impl Config {
    /// Load configuration from `.env`, the environment and defaults
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from an arbitrary variable source
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let vars = Vars(&lookup);
        let get = |key: &str| vars.get(key);

        let config = Config {
            api: ApiConfig {
                base_url: get("API_BASE_URL").unwrap_or_else(|| DEFAULT_API_BASE_URL.to_string()),
                api_key: get("API_KEY"),
                api_key_header: get("API_KEY_HEADER"),
                timeout_secs: vars.parsed("API_TIMEOUT_SECS").unwrap_or(DEFAULT_API_TIMEOUT_SECS),
                max_attempts: vars.parsed("API_MAX_ATTEMPTS").unwrap_or(DEFAULT_API_MAX_ATTEMPTS),
                rate_limit_cooldown_secs: vars.parsed("API_RATE_LIMIT_COOLDOWN_SECS")
                    .unwrap_or(DEFAULT_RATE_LIMIT_COOLDOWN_SECS),
                retry_delay_secs: vars.parsed("API_RETRY_DELAY_SECS")
                    .unwrap_or(DEFAULT_RETRY_DELAY_SECS),
                user_agent: get("API_USER_AGENT").unwrap_or_else(|| DEFAULT_USER_AGENT.to_string()),
            },
            storage: StorageConfig::from_lookup(&lookup),
            lake: LakeConfig {
                raw_bucket: get("RAW_DATA_BUCKET")
                    .unwrap_or_else(|| DEFAULT_RAW_DATA_BUCKET.to_string()),
                processed_bucket: get("PROCESSED_DATA_BUCKET")
                    .unwrap_or_else(|| DEFAULT_PROCESSED_DATA_BUCKET.to_string()),
                logs_bucket: get("LOGS_BUCKET").unwrap_or_else(|| DEFAULT_LOGS_BUCKET.to_string()),
                root_prefix: lookup("LAKE_ROOT_PREFIX")
                    .unwrap_or_else(|| DEFAULT_ROOT_PREFIX.to_string()),
            },
            dump: DumpConfig {
                vs_currency: get("DUMP_VS_CURRENCY")
                    .unwrap_or_else(|| DEFAULT_VS_CURRENCY.to_string()),
                per_page: vars.parsed("DUMP_PER_PAGE").unwrap_or(DEFAULT_PER_PAGE),
                pages: vars.parsed("DUMP_PAGES").unwrap_or(DEFAULT_PAGES),
                global_delay_secs: vars.parsed("DUMP_GLOBAL_DELAY_SECS")
                    .unwrap_or(DEFAULT_GLOBAL_DELAY_SECS),
                markets_delay_secs: vars.parsed("DUMP_MARKETS_DELAY_SECS")
                    .unwrap_or(DEFAULT_MARKETS_DELAY_SECS),
                details_delay_secs: vars.parsed("DUMP_DETAILS_DELAY_SECS")
                    .unwrap_or(DEFAULT_DETAILS_DELAY_SECS),
            },
        };

        config.validate()?;

        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.api.base_url.trim().is_empty() {
            return Err(LakeError::config("API base URL cannot be empty"));
        }

        if !self.api.base_url.starts_with("http://") && !self.api.base_url.starts_with("https://") {
            return Err(LakeError::config(format!(
                "API base URL '{}' must start with http:// or https://",
                self.api.base_url
            )));
        }

        if self.api.timeout_secs == 0 {
            return Err(LakeError::config("API timeout must be greater than 0"));
        }

        if self.api.max_attempts == 0 {
            return Err(LakeError::config("API max attempts must be greater than 0"));
        }

        if self.dump.per_page == 0 || self.dump.per_page > MAX_PER_PAGE {
            return Err(LakeError::config(format!(
                "Dump per_page must be between 1 and {} (got {})",
                MAX_PER_PAGE, self.dump.per_page
            )));
        }

        // Market pages share one object id, so pages need at least a second apart
        if self.dump.pages > 1 && self.dump.markets_delay_secs == 0 {
            return Err(LakeError::config(
                "Dump markets delay must be at least 1 second when more than one page is collected",
            ));
        }

        if self.dump.vs_currency.trim().is_empty() {
            return Err(LakeError::config("Dump vs_currency cannot be empty"));
        }

        for (name, bucket) in [
            ("raw", &self.lake.raw_bucket),
            ("processed", &self.lake.processed_bucket),
            ("logs", &self.lake.logs_bucket),
        ] {
            if bucket.trim().is_empty() {
                return Err(LakeError::config(format!("The {} bucket name cannot be empty", name)));
            }
        }

        if self.api.api_key.is_none() && self.api.api_key_header.is_some() {
            tracing::warn!("API_KEY_HEADER is set but API_KEY is missing; requests go out unauthenticated");
        }

        self.storage.validate()?;

        Ok(())
    }
}

/// Variable source with blank values treated as unset
pub(crate) struct Vars<'a, F>(pub(crate) &'a F);

impl<F> Vars<'_, F>
where
    F: Fn(&str) -> Option<String>,
{
    pub(crate) fn get(&self, key: &str) -> Option<String> {
        (self.0)(key).filter(|v| !v.trim().is_empty())
    }

    /// Parsed value; unparsable input counts as unset.
    pub(crate) fn parsed<T: std::str::FromStr>(&self, key: &str) -> Option<T> {
        self.get(key).and_then(|v| v.trim().parse().ok())
    }
}
