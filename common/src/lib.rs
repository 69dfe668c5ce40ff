/*!
common/src/lib.rs

Shared configuration types and run-state helpers for newsdigest.

This file provides:
- Config data structures (deserialized from TOML)
- An async loader for a TOML config file, with default/override merging
- Validation of the settings a run cannot start without
- Appending discovered sources to a config file
- The persisted run state (see `state`)
*/

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

pub mod state;

pub use state::{parse_timestamp, RunState, RunStateStore};

pub const DEFAULT_MAX_ARTICLES_PER_FEED: usize = 5;
pub const DEFAULT_FETCH_TIMEOUT_SECONDS: u64 = 10;
pub const DEFAULT_DESCRIPTION_MAX_CHARS: usize = 300;
pub const DEFAULT_STATE_PATH: &str = "data/state.json";
pub const DEFAULT_OUTPUT_PATH: &str = "newsletter_output.html";
pub const DEFAULT_MAX_NEW_FEEDS_PER_RUN: usize = 2;

/// A configured RSS/Atom endpoint. The URL is its identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedSource {
    pub name: String,
    pub url: String,
    pub category: String,
}

impl FeedSource {
    pub fn new(
        name: impl Into<String>,
        url: impl Into<String>,
        category: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            category: category.into(),
        }
    }
}

/// SMTP delivery settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailConfig {
    pub recipient: String,
    pub smtp_server: String,
    pub smtp_port: Option<u16>,
    pub sender_email: String,
    /// Name of the environment variable holding the SMTP password
    pub password_env: Option<String>,
    pub subject_prefix: Option<String>,
}

/// Remote LLM config (used if `llm.adapter = "remote"`)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteLlmConfig {
    pub api_url: Option<String>,
    pub api_key_env: Option<String>,
    pub model: Option<String>,
    pub timeout_seconds: Option<u64>,
    pub max_tokens: Option<usize>,
}

/// LLM top-level config
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    pub adapter: Option<String>, // "remote", "none"
    pub target_language: Option<String>,
    pub remote: Option<RemoteLlmConfig>,
}

/// Where dry-run output lands
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    pub path: Option<String>,
}

/// Feed discovery settings. Discovery runs unless `enabled = false`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DiscoveryConfig {
    pub enabled: Option<bool>,
    pub max_new_feeds_per_run: Option<usize>,
    /// Fetch each candidate and keep it only if it parses with at least one entry
    pub validate_feeds: Option<bool>,
    /// Add found feeds to the config file instead of only logging them
    pub auto_add_feeds: Option<bool>,
}

impl DiscoveryConfig {
    pub fn enabled(&self) -> bool {
        self.enabled.unwrap_or(true)
    }

    pub fn max_new_feeds_per_run(&self) -> usize {
        self.max_new_feeds_per_run
            .unwrap_or(DEFAULT_MAX_NEW_FEEDS_PER_RUN)
    }

    pub fn validate_feeds(&self) -> bool {
        self.validate_feeds.unwrap_or(true)
    }

    pub fn auto_add_feeds(&self) -> bool {
        self.auto_add_feeds.unwrap_or(false)
    }
}

/// Top-level application configuration (deserialized from config.toml)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub sources: Vec<FeedSource>,
    pub max_articles_per_feed: Option<usize>,
    pub fetch_timeout_seconds: Option<u64>,
    pub description_max_chars: Option<usize>,
    pub language_preference: Option<String>,
    pub state_path: Option<String>,
    pub log_file: Option<String>,
    pub email: Option<EmailConfig>,
    pub llm: Option<LlmConfig>,
    pub output: Option<OutputConfig>,
    pub discovery: Option<DiscoveryConfig>,
}

/// A configuration problem that prevents a run from starting.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("no feed sources configured")]
    NoSources,
    #[error("feed source #{index} has an empty `{field}`")]
    EmptyField { index: usize, field: &'static str },
    #[error("feed source '{name}' has an invalid url '{url}': {reason}")]
    InvalidUrl {
        name: String,
        url: String,
        reason: String,
    },
    #[error("max_articles_per_feed must be at least 1")]
    ZeroArticleCap,
}

impl Config {
    /// Load configuration from a TOML file asynchronously.
    ///
    /// Example:
    ///   let cfg = Config::from_file("config.toml").await?;
    pub async fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let data = tokio::fs::read_to_string(path.as_ref())
            .await
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;
        let cfg: Config = toml::from_str(&data).context("Failed to parse TOML configuration")?;
        Ok(cfg)
    }

    /// Load configuration with an optional default file and an optional override file.
    /// If both are present, they are merged (override takes precedence).
    pub async fn load_with_defaults(
        default_path: Option<&Path>,
        override_path: Option<&Path>,
    ) -> Result<Self> {
        let mut config_value = toml::Value::Table(toml::map::Map::new());

        for path in [default_path, override_path].into_iter().flatten() {
            if !path.exists() {
                continue;
            }
            let data = tokio::fs::read_to_string(path)
                .await
                .with_context(|| format!("Failed to read config: {}", path.display()))?;
            let val: toml::Value = toml::from_str(&data)
                .with_context(|| format!("Failed to parse configuration: {}", path.display()))?;
            merge_toml(&mut config_value, val);
        }

        let cfg: Config = config_value
            .try_into()
            .context("Failed to parse merged configuration")?;
        Ok(cfg)
    }

    /// Check the settings a run depends on. Any error here is fatal for the run.
    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        if self.sources.is_empty() {
            return Err(ConfigError::NoSources);
        }

        for (index, source) in self.sources.iter().enumerate() {
            for (field, value) in [
                ("name", &source.name),
                ("url", &source.url),
                ("category", &source.category),
            ] {
                if value.trim().is_empty() {
                    return Err(ConfigError::EmptyField { index, field });
                }
            }

            if let Err(e) = url::Url::parse(&source.url) {
                return Err(ConfigError::InvalidUrl {
                    name: source.name.clone(),
                    url: source.url.clone(),
                    reason: e.to_string(),
                });
            }
        }

        if self.max_articles_per_feed == Some(0) {
            return Err(ConfigError::ZeroArticleCap);
        }

        Ok(())
    }

    pub fn max_articles_per_feed(&self) -> usize {
        self.max_articles_per_feed
            .unwrap_or(DEFAULT_MAX_ARTICLES_PER_FEED)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(
            self.fetch_timeout_seconds
                .unwrap_or(DEFAULT_FETCH_TIMEOUT_SECONDS),
        )
    }

    pub fn description_max_chars(&self) -> usize {
        self.description_max_chars
            .unwrap_or(DEFAULT_DESCRIPTION_MAX_CHARS)
    }

    /// Language summaries are translated into. `llm.target_language` wins over
    /// the top-level preference.
    pub fn target_language(&self) -> &str {
        self.llm
            .as_ref()
            .and_then(|l| l.target_language.as_deref())
            .or(self.language_preference.as_deref())
            .unwrap_or("French")
    }

    pub fn state_path(&self) -> &str {
        self.state_path.as_deref().unwrap_or(DEFAULT_STATE_PATH)
    }

    pub fn discovery(&self) -> DiscoveryConfig {
        self.discovery.clone().unwrap_or_default()
    }

    pub fn output_path(&self) -> &str {
        self.output
            .as_ref()
            .and_then(|o| o.path.as_deref())
            .unwrap_or(DEFAULT_OUTPUT_PATH)
    }
}

/// Append `sources` as `[[sources]]` tables at the end of the TOML file at
/// `path`, creating it if needed. Existing content and comments are kept.
pub async fn append_sources(path: &Path, sources: &[FeedSource]) -> Result<()> {
    #[derive(Serialize)]
    struct SourcesTable<'a> {
        sources: &'a [FeedSource],
    }

    if sources.is_empty() {
        return Ok(());
    }

    let mut doc = match tokio::fs::read_to_string(path).await {
        Ok(doc) => doc,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
        Err(e) => {
            return Err(e).with_context(|| format!("Failed to read config: {}", path.display()))
        }
    };
    let tables = toml::to_string(&SourcesTable { sources })
        .context("Failed to serialize discovered sources")?;

    if !doc.is_empty() {
        if !doc.ends_with('\n') {
            doc.push('\n');
        }
        doc.push('\n');
    }
    doc.push_str(&tables);

    tokio::fs::write(path, doc)
        .await
        .with_context(|| format!("Failed to write config: {}", path.display()))?;
    Ok(())
}

fn merge_toml(a: &mut toml::Value, b: toml::Value) {
    match (a, b) {
        (toml::Value::Table(a_map), toml::Value::Table(b_map)) => {
            for (k, v) in b_map {
                if let Some(a_val) = a_map.get_mut(&k) {
                    merge_toml(a_val, v);
                } else {
                    a_map.insert(k, v);
                }
            }
        }
        (a_val, b_val) => *a_val = b_val,
    }
}
