use chrono::{DateTime, Utc};
use common::{Config, ConfigError, RunState};
use tracing::{debug, info};

use crate::capping::{cap_categories, group_by_category, CategoryGroups};
use crate::date_filter::{compute_cutoff, FilterPolicy};
use crate::dedup::dedupe;
use crate::ingestion::{fetch_sources, FeedClient, FetchFailure};
use crate::normalize::normalize_entry;

/// Options coming from the command line that shape the date filter.
#[derive(Debug, Clone, Copy, Default)]
pub struct RunOptions {
    pub force: bool,
    pub days: Option<u32>,
}

/// Articles ready for rendering, grouped by category.
#[derive(Debug, Clone, Default)]
pub struct Digest {
    pub categories: CategoryGroups,
}

impl Digest {
    pub fn total_articles(&self) -> usize {
        self.categories.values().map(Vec::len).sum()
    }

    pub fn total_categories(&self) -> usize {
        self.categories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.total_articles() == 0
    }
}

/// What happened along the way, for the caller to log.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub policy: FilterPolicy,
    pub sources: usize,
    pub fetched_entries: usize,
    pub skipped_entries: usize,
    pub duplicates_removed: usize,
    pub filtered_out: usize,
    pub capped_out: usize,
    pub failures: Vec<FetchFailure>,
}

#[derive(Debug)]
pub struct DigestRun {
    pub digest: Digest,
    pub report: RunReport,
    /// State to persist once the digest has been delivered.
    pub next_state: RunState,
}

/// A failure that ends the run without committing the run state.
#[derive(Debug)]
pub struct Fatal {
    /// Where the run stopped: "configuration", "state", "output", "email", ...
    pub stage: &'static str,
    pub error: anyhow::Error,
}

pub trait StageExt<T> {
    fn stage(self, stage: &'static str) -> Result<T, Fatal>;
}

impl<T, E: Into<anyhow::Error>> StageExt<T> for Result<T, E> {
    fn stage(self, stage: &'static str) -> Result<T, Fatal> {
        self.map_err(|e| Fatal {
            stage,
            error: e.into(),
        })
    }
}

/// Fetch, normalize, dedupe, filter, group and cap.
///
/// Only configuration problems are returned as errors. Failing feeds and
/// unusable entries end up in the report. The returned `next_state` must only
/// be saved after downstream delivery succeeded.
pub async fn run_digest<C: FeedClient + ?Sized>(
    config: &Config,
    options: &RunOptions,
    state: RunState,
    client: &C,
    now: DateTime<Utc>,
) -> Result<DigestRun, ConfigError> {
    config.validate()?;

    let policy = compute_cutoff(options.force, options.days, state.read(), now);
    info!(%policy, sources = config.sources.len(), "starting digest run");

    let fetched = fetch_sources(client, &config.sources, config.fetch_timeout()).await;
    let fetched_entries = fetched.entry_count();
    let max_chars = config.description_max_chars();

    let mut articles = Vec::with_capacity(fetched_entries);
    let mut skipped_entries = 0;
    for feed in &fetched.feeds {
        for entry in &feed.entries {
            match normalize_entry(&feed.source, entry, now, max_chars) {
                Some(article) => articles.push(article),
                None => {
                    skipped_entries += 1;
                    debug!(source = %feed.source.name, id = %entry.id, "skipping entry without link");
                }
            }
        }
    }

    let normalized = articles.len();
    let articles = dedupe(articles);
    let duplicates_removed = normalized - articles.len();

    let unique = articles.len();
    let articles = policy.apply(articles);
    let filtered_out = unique - articles.len();

    let recent = articles.len();
    let categories = cap_categories(
        group_by_category(articles),
        config.max_articles_per_feed(),
    );
    let digest = Digest { categories };
    let capped_out = recent - digest.total_articles();

    info!(
        articles = digest.total_articles(),
        categories = digest.total_categories(),
        failures = fetched.failures.len(),
        "digest assembled"
    );

    Ok(DigestRun {
        digest,
        report: RunReport {
            policy,
            sources: config.sources.len(),
            fetched_entries,
            skipped_entries,
            duplicates_removed,
            filtered_out,
            capped_out,
            failures: fetched.failures,
        },
        next_state: state.commit(now),
    })
}
