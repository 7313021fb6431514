//! Configuration file handling.
//!
//! This module handles loading and merging configuration from
//! `.feeddigest.toml` files, and loading credentials from the
//! environment (optionally seeded from a `.env` file).

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default configuration file name.
pub const CONFIG_FILE: &str = ".feeddigest.toml";

/// Root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// File locations and general settings.
    #[serde(default)]
    pub general: GeneralConfig,

    /// Collection loop settings.
    #[serde(default)]
    pub collector: CollectorConfig,

    /// Per-endpoint request quotas.
    #[serde(default)]
    pub rate_limit: RateLimitConfig,

    /// Feed API settings.
    #[serde(default)]
    pub feed: FeedConfig,

    /// Model settings.
    #[serde(default)]
    pub model: ModelConfig,

    /// Report delivery settings.
    #[serde(default)]
    pub email: EmailConfig,
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Live collection document.
    #[serde(default = "default_collection_file")]
    pub collection_file: PathBuf,

    /// Where archive and error snapshots are written.
    #[serde(default = "default_dir")]
    pub archive_dir: PathBuf,

    /// Where analysis reports are saved.
    #[serde(default = "default_dir")]
    pub reports_dir: PathBuf,

    /// Enable verbose logging by default.
    #[serde(default)]
    pub verbose: bool,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            collection_file: default_collection_file(),
            archive_dir: default_dir(),
            reports_dir: default_dir(),
            verbose: false,
        }
    }
}

fn default_collection_file() -> PathBuf {
    PathBuf::from("collected_posts.json")
}

fn default_dir() -> PathBuf {
    PathBuf::from(".")
}

/// Collection loop settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectorConfig {
    /// Post count at which analysis runs.
    #[serde(default = "default_target_count")]
    pub target_count: usize,

    /// Minutes between collection cycles.
    #[serde(default = "default_interval")]
    pub interval_minutes: u64,

    /// Total runtime ceiling in minutes.
    #[serde(default = "default_max_runtime")]
    pub max_runtime_minutes: u64,

    /// Minutes to back off after a failed cycle.
    #[serde(default = "default_cooldown")]
    pub cooldown_minutes: u64,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            target_count: default_target_count(),
            interval_minutes: default_interval(),
            max_runtime_minutes: default_max_runtime(),
            cooldown_minutes: default_cooldown(),
        }
    }
}

fn default_target_count() -> usize {
    50
}

fn default_interval() -> u64 {
    15
}

fn default_max_runtime() -> u64 {
    120
}

fn default_cooldown() -> u64 {
    5
}

impl CollectorConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_minutes * 60)
    }

    pub fn max_runtime(&self) -> Duration {
        Duration::from_secs(self.max_runtime_minutes * 60)
    }

    pub fn cooldown(&self) -> Duration {
        Duration::from_secs(self.cooldown_minutes * 60)
    }
}

/// Request quotas per 15-minute window.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Window length in seconds.
    #[serde(default = "default_window")]
    pub window_seconds: u64,

    /// Delay added after every request.
    #[serde(default = "default_courtesy_delay")]
    pub courtesy_delay_ms: u64,

    #[serde(default = "default_home_timeline_quota")]
    pub home_timeline: usize,

    #[serde(default = "default_user_quota")]
    pub user_tweets: usize,

    #[serde(default = "default_user_quota")]
    pub user_info: usize,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            window_seconds: default_window(),
            courtesy_delay_ms: default_courtesy_delay(),
            home_timeline: default_home_timeline_quota(),
            user_tweets: default_user_quota(),
            user_info: default_user_quota(),
        }
    }
}

fn default_window() -> u64 {
    15 * 60
}

fn default_courtesy_delay() -> u64 {
    2000
}

fn default_home_timeline_quota() -> usize {
    15
}

fn default_user_quota() -> usize {
    100
}

/// X API settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedConfig {
    /// API base URL.
    #[serde(default = "default_api_base")]
    pub api_base: String,

    /// Distinct authors taken from the timeline per batch.
    #[serde(default = "default_max_users")]
    pub max_users: usize,

    /// Recent posts fetched per author.
    #[serde(default = "default_page_size")]
    pub posts_per_user: usize,

    /// Timeline entries requested per batch.
    #[serde(default = "default_page_size")]
    pub timeline_results: usize,

    /// Request timeout in seconds.
    #[serde(default = "default_feed_timeout")]
    pub timeout_seconds: u64,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            api_base: default_api_base(),
            max_users: default_max_users(),
            posts_per_user: default_page_size(),
            timeline_results: default_page_size(),
            timeout_seconds: default_feed_timeout(),
        }
    }
}

fn default_api_base() -> String {
    "https://api.twitter.com/2".to_string()
}

fn default_max_users() -> usize {
    2
}

fn default_page_size() -> usize {
    5 // smallest page the API accepts
}

fn default_feed_timeout() -> u64 {
    30
}

/// LLM model settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Model name.
    #[serde(default = "default_model")]
    pub name: String,

    /// Ollama API URL.
    #[serde(default = "default_ollama_url")]
    pub ollama_url: String,

    /// Temperature for generation.
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Maximum tokens in response.
    #[serde(default)]
    pub max_tokens: Option<usize>,

    /// Request timeout in seconds.
    #[serde(default = "default_model_timeout")]
    pub timeout_seconds: u64,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            name: default_model(),
            ollama_url: default_ollama_url(),
            temperature: default_temperature(),
            max_tokens: Some(2048),
            timeout_seconds: default_model_timeout(),
        }
    }
}

fn default_model() -> String {
    "llama3.2:latest".to_string()
}

fn default_ollama_url() -> String {
    "http://localhost:11434".to_string()
}

fn default_temperature() -> f32 {
    0.7
}

fn default_model_timeout() -> u64 {
    600
}

/// Report delivery settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EmailConfig {
    /// Who receives the report.
    #[serde(default)]
    pub recipient: String,

    /// Sender address; falls back to `EMAIL_ADDRESS`.
    #[serde(default)]
    pub sender: Option<String>,

    /// HTTP mail relay endpoint. Without it reports are only saved to disk.
    #[serde(default)]
    pub relay_url: Option<String>,
}

/// Secrets read once from the environment.
#[derive(Clone, Default)]
pub struct Credentials {
    pub x_bearer_token: Option<String>,
    pub mail_relay_token: Option<String>,
    pub email_address: Option<String>,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mask = |v: &Option<String>| if v.is_some() { "<set>" } else { "<unset>" };
        f.debug_struct("Credentials")
            .field("x_bearer_token", &mask(&self.x_bearer_token))
            .field("mail_relay_token", &mask(&self.mail_relay_token))
            .field("email_address", &self.email_address)
            .finish()
    }
}

impl Credentials {
    /// Load credentials from `.env` (if present) and the process environment.
    pub fn from_env() -> Self {
        // A missing .env is normal; real env vars still apply.
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        Self {
            x_bearer_token: non_empty("X_BEARER_TOKEN"),
            mail_relay_token: non_empty("MAIL_RELAY_TOKEN"),
            email_address: non_empty("EMAIL_ADDRESS"),
        }
    }
}

impl Config {
    /// Load configuration from a file path.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Try to load configuration from the default location.
    ///
    /// Returns `Ok(None)` if the file doesn't exist, `Err` if it exists but can't be parsed.
    pub fn load_default() -> Result<Option<Self>> {
        let default_path = Path::new(CONFIG_FILE);

        if default_path.exists() {
            Ok(Some(Self::load(default_path)?))
        } else {
            Ok(None)
        }
    }

    /// Merge this configuration with CLI arguments.
    ///
    /// CLI arguments take precedence over config file settings, but only
    /// when they were explicitly provided.
    pub fn merge_with_args(&mut self, args: &crate::cli::Args) {
        if let Some(ref path) = args.collection_file {
            self.general.collection_file = path.clone();
        }
        if let Some(count) = args.target_count {
            self.collector.target_count = count;
        }
        if let Some(minutes) = args.interval_minutes {
            self.collector.interval_minutes = minutes;
        }
        if let Some(minutes) = args.max_runtime_minutes {
            self.collector.max_runtime_minutes = minutes;
        }
        if let Some(ref recipient) = args.recipient {
            self.email.recipient = recipient.clone();
        }
        if let Some(ref model) = args.model {
            self.model.name = model.clone();
        }
        if let Some(ref url) = args.ollama_url {
            self.model.ollama_url = url.clone();
        }

        if args.verbose {
            self.general.verbose = true;
        }
    }

    /// Reject settings that would stall or spin the collection loop.
    pub fn validate(&self) -> Result<()> {
        if self.collector.target_count == 0 {
            bail!("collector.target_count must be at least 1");
        }
        if self.collector.interval_minutes == 0 {
            bail!("collector.interval_minutes must be at least 1");
        }
        if self.collector.max_runtime_minutes == 0 {
            bail!("collector.max_runtime_minutes must be at least 1");
        }
        Ok(())
    }

    /// Generate a default configuration file content.
    pub fn default_toml() -> String {
        let config = Config::default();
        toml::to_string_pretty(&config).unwrap_or_else(|_| String::new())
    }
}
