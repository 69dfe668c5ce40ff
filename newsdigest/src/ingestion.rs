use anyhow::{Context, Result};
use common::FeedSource;
use feed_rs::model::{Entry, Feed};
use feed_rs::parser;
use reqwest::Client;
use std::fmt;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

const USER_AGENT: &str = concat!("newsdigest/", env!("CARGO_PKG_VERSION"));

/// Why a single feed could not be turned into entries.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request timed out after {0:?}")]
    Timeout(Duration),
    #[error("network error: {0}")]
    Network(String),
    #[error("feed fetch failed with status: {0}")]
    HttpStatus(u16),
    #[error("failed to parse feed: {0}")]
    Parse(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchErrorKind {
    Timeout,
    Network,
    HttpStatus,
    Parse,
}

impl FetchErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FetchErrorKind::Timeout => "timeout",
            FetchErrorKind::Network => "network",
            FetchErrorKind::HttpStatus => "http_status",
            FetchErrorKind::Parse => "parse",
        }
    }
}

impl fmt::Display for FetchErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FetchError {
    pub fn kind(&self) -> FetchErrorKind {
        match self {
            FetchError::Timeout(_) => FetchErrorKind::Timeout,
            FetchError::Network(_) => FetchErrorKind::Network,
            FetchError::HttpStatus(_) => FetchErrorKind::HttpStatus,
            FetchError::Parse(_) => FetchErrorKind::Parse,
        }
    }
}

/// Structured record of a source that produced nothing this run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchFailure {
    pub source_name: String,
    pub url: String,
    pub kind: FetchErrorKind,
    pub message: String,
}

impl FetchFailure {
    fn new(source: &FeedSource, error: &FetchError) -> Self {
        Self {
            source_name: source.name.clone(),
            url: source.url.clone(),
            kind: error.kind(),
            message: error.to_string(),
        }
    }
}

/// Entries parsed from one source.
#[derive(Debug, Clone)]
pub struct FetchedFeed {
    pub source: FeedSource,
    pub entries: Vec<Entry>,
}

/// Result of fetching every configured source once.
#[derive(Debug, Default)]
pub struct FetchOutcome {
    pub feeds: Vec<FetchedFeed>,
    pub failures: Vec<FetchFailure>,
}

impl FetchOutcome {
    pub fn entry_count(&self) -> usize {
        self.feeds.iter().map(|f| f.entries.len()).sum()
    }
}

/// Fetches and parses a single feed document.
#[async_trait::async_trait]
pub trait FeedClient: Send + Sync {
    async fn fetch(&self, url: &str, timeout: Duration) -> Result<Feed, FetchError>;
}

/// `FeedClient` over HTTP. One attempt per call, no retries.
pub struct HttpFeedClient {
    client: Client,
}

impl HttpFeedClient {
    pub fn new() -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .build()
            .context("failed to build reqwest client")?;
        Ok(Self { client })
    }
}

fn classify(err: reqwest::Error, timeout: Duration) -> FetchError {
    if err.is_timeout() {
        FetchError::Timeout(timeout)
    } else if let Some(status) = err.status() {
        FetchError::HttpStatus(status.as_u16())
    } else {
        FetchError::Network(err.to_string())
    }
}

#[async_trait::async_trait]
impl FeedClient for HttpFeedClient {
    async fn fetch(&self, url: &str, timeout: Duration) -> Result<Feed, FetchError> {
        let response = self
            .client
            .get(url)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| classify(e, timeout))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::HttpStatus(status.as_u16()));
        }

        let bytes = response.bytes().await.map_err(|e| classify(e, timeout))?;
        parser::parse(bytes.as_ref()).map_err(|e| FetchError::Parse(e.to_string()))
    }
}

/// Fetch every source in registry order. A failing source is recorded and
/// skipped; it never stops the remaining sources from being fetched.
pub async fn fetch_sources<C: FeedClient + ?Sized>(
    client: &C,
    sources: &[FeedSource],
    timeout: Duration,
) -> FetchOutcome {
    let mut outcome = FetchOutcome::default();

    for source in sources {
        debug!(source = %source.name, url = %source.url, "fetching feed");
        match client.fetch(&source.url, timeout).await {
            Ok(feed) => {
                info!("Fetched feed '{}': {} items", source.name, feed.entries.len());
                outcome.feeds.push(FetchedFeed {
                    source: source.clone(),
                    entries: feed.entries,
                });
            }
            Err(e) => outcome.failures.push(FetchFailure::new(source, &e)),
        }
    }

    outcome
}
