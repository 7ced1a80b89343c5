use serde::Deserialize;
use std::time::Duration;

/// Main configuration structure for MP-Archiver
///
/// Every section has defaults, so an empty file is a valid configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub gate: GateConfig,
    #[serde(default)]
    pub crawl: CrawlConfig,
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

/// Session credential persistence
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct SessionConfig {
    /// Path to the persisted credential file
    #[serde(default = "default_credential_path")]
    pub credential_path: String,

    /// How long a credential stays usable after login (hours)
    #[serde(default = "default_ttl_hours")]
    pub ttl_hours: u64,
}

impl SessionConfig {
    /// Credential lifetime, saturating at the largest representable span
    pub fn ttl(&self) -> chrono::Duration {
        i64::try_from(self.ttl_hours)
            .ok()
            .and_then(chrono::Duration::try_hours)
            .unwrap_or(chrono::Duration::MAX)
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            credential_path: default_credential_path(),
            ttl_hours: default_ttl_hours(),
        }
    }
}

/// Request gate (rate limit and backoff) configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct GateConfig {
    /// Baseline interval between the end of one call and the start of the next (milliseconds)
    #[serde(default = "default_min_interval_ms")]
    pub min_interval_ms: u64,

    /// Ceiling for the backoff interval (milliseconds)
    #[serde(default = "default_max_interval_ms")]
    pub max_interval_ms: u64,

    /// Retries of the same request after a throttling signal
    #[serde(default = "default_max_throttle_retries")]
    pub max_throttle_retries: u32,
}

impl GateConfig {
    pub fn min_interval(&self) -> Duration {
        Duration::from_millis(self.min_interval_ms)
    }

    pub fn max_interval(&self) -> Duration {
        Duration::from_millis(self.max_interval_ms)
    }
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            min_interval_ms: default_min_interval_ms(),
            max_interval_ms: default_max_interval_ms(),
            max_throttle_retries: default_max_throttle_retries(),
        }
    }
}

/// Crawl behavior configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct CrawlConfig {
    /// Maximum number of history pages walked per account
    #[serde(default = "default_max_pages")]
    pub max_pages: u32,

    /// Only keep articles published within this many days (0 disables the cutoff)
    #[serde(default = "default_days")]
    pub days: u32,

    /// Fetch the full body of every newly stored article
    #[serde(default)]
    pub include_content: bool,

    /// Number of accounts walked in parallel
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Articles requested per history page
    #[serde(default = "default_page_size")]
    pub page_size: u32,

    /// Timeout for a single article body fetch (seconds)
    #[serde(default = "default_content_timeout_secs")]
    pub content_timeout_secs: u64,
}

impl Default for CrawlConfig {
    fn default() -> Self {
        Self {
            max_pages: default_max_pages(),
            days: default_days(),
            include_content: false,
            concurrency: default_concurrency(),
            page_size: default_page_size(),
            content_timeout_secs: default_content_timeout_secs(),
        }
    }
}

/// Counterparty API configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ApiConfig {
    /// Base URL of the public platform
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// User-Agent sent with every request
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Timeout for a single API request (seconds)
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            user_agent: default_user_agent(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

/// Output configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct OutputConfig {
    /// Path to the SQLite database file
    #[serde(default = "default_database_path")]
    pub database_path: String,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
        }
    }
}

fn default_credential_path() -> String {
    "./wechat_session.json".to_string()
}

fn default_ttl_hours() -> u64 {
    24 * 4
}

fn default_min_interval_ms() -> u64 {
    10_000
}

fn default_max_interval_ms() -> u64 {
    300_000
}

fn default_max_throttle_retries() -> u32 {
    3
}

fn default_max_pages() -> u32 {
    10
}

fn default_days() -> u32 {
    30
}

fn default_concurrency() -> usize {
    3
}

fn default_page_size() -> u32 {
    5
}

fn default_content_timeout_secs() -> u64 {
    30
}

fn default_base_url() -> String {
    "https://mp.weixin.qq.com".to_string()
}

fn default_user_agent() -> String {
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/104.0.0.0 Safari/537.36".to_string()
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_database_path() -> String {
    "./content_spider.db".to_string()
}
