use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Environment variable consulted when the config file carries no token
pub const TOKEN_ENV_VAR: &str = "SLACK_TOKEN";

/// Main configuration structure for Thread-Harvest
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub slack: SlackConfig,
    #[serde(default)]
    pub harvest: HarvestConfig,
    pub output: OutputConfig,
}

/// Credentials and channel selection
#[derive(Debug, Clone, Deserialize)]
pub struct SlackConfig {
    /// API token; `SLACK_TOKEN` is used when absent
    #[serde(default)]
    pub token: Option<String>,

    /// Session cookie sent alongside user tokens
    #[serde(default)]
    pub cookie: Option<String>,

    /// Channel whose history is exported
    #[serde(rename = "channel-id")]
    pub channel_id: String,

    /// Base URL of the Web API
    #[serde(rename = "api-base-url", default = "default_api_base_url")]
    pub api_base_url: String,
}

impl SlackConfig {
    /// Returns the configured token, falling back to the environment
    pub fn resolved_token(&self) -> Option<String> {
        self.token
            .clone()
            .filter(|t| !t.trim().is_empty())
            .or_else(|| std::env::var(TOKEN_ENV_VAR).ok())
            .filter(|t| !t.trim().is_empty())
    }
}

/// Harvest behavior configuration
#[derive(Debug, Clone, Deserialize)]
pub struct HarvestConfig {
    /// Maximum number of reply requests in flight
    #[serde(rename = "reply-concurrency", default = "default_concurrency")]
    pub reply_concurrency: usize,

    /// Maximum number of permalink requests in flight (0 disables the stage)
    #[serde(rename = "permalink-concurrency", default = "default_concurrency")]
    pub permalink_concurrency: usize,

    /// Items requested per API page
    #[serde(rename = "page-limit", default = "default_page_limit")]
    pub page_limit: u32,

    /// Upper bound for a single HTTP request
    #[serde(rename = "request-timeout-secs", default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Retries for connection errors, timeouts and 5xx responses
    #[serde(rename = "max-transient-retries", default = "default_max_retries")]
    pub max_transient_retries: u32,

    /// First backoff delay for transient failures (doubles each attempt)
    #[serde(rename = "initial-backoff-ms", default = "default_initial_backoff")]
    pub initial_backoff_ms: u64,

    /// Wait used when a throttling response carries no Retry-After header
    #[serde(rename = "default-retry-after-secs", default = "default_retry_after")]
    pub default_retry_after_secs: u64,

    /// Failed passes after which a parent is abandoned (absent = never)
    #[serde(rename = "max-parent-attempts", default)]
    pub max_parent_attempts: Option<u32>,
}

impl HarvestConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn initial_backoff(&self) -> Duration {
        Duration::from_millis(self.initial_backoff_ms)
    }

    pub fn default_retry_after(&self) -> Duration {
        Duration::from_secs(self.default_retry_after_secs)
    }
}

impl Default for HarvestConfig {
    fn default() -> Self {
        Self {
            reply_concurrency: default_concurrency(),
            permalink_concurrency: default_concurrency(),
            page_limit: default_page_limit(),
            request_timeout_secs: default_request_timeout(),
            max_transient_retries: default_max_retries(),
            initial_backoff_ms: default_initial_backoff(),
            default_retry_after_secs: default_retry_after(),
            max_parent_attempts: None,
        }
    }
}

/// Output configuration
#[derive(Debug, Clone, Deserialize)]
pub struct OutputConfig {
    /// Directory holding exported records and resume state
    pub directory: PathBuf,

    /// Record format for the parent and reply streams
    ///
    /// `json` rewrites the reply file after every thread; prefer `sqlite`
    /// for channels with many threads.
    #[serde(default)]
    pub format: OutputFormat,

    /// Also write the flattened parent projection as CSV
    #[serde(default)]
    pub csv: bool,
}

impl OutputConfig {
    pub fn checkpoint_path(&self) -> PathBuf {
        self.directory.join("checkpoint.txt")
    }

    pub fn progress_path(&self) -> PathBuf {
        self.directory.join("progress.json")
    }

    pub fn csv_path(&self) -> PathBuf {
        self.directory.join("threads.csv")
    }
}

/// Record format of the export
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Json,
    Sqlite,
}

fn default_api_base_url() -> String {
    "https://slack.com/api".to_string()
}

fn default_concurrency() -> usize {
    5
}

fn default_page_limit() -> u32 {
    1000
}

fn default_request_timeout() -> u64 {
    30
}

fn default_max_retries() -> u32 {
    3
}

fn default_initial_backoff() -> u64 {
    500
}

fn default_retry_after() -> u64 {
    10
}
