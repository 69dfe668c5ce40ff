//! Recency filtering.
//!
//! The cutoff is picked by the first matching rule:
//! 1. `force`: no filtering, whatever else is set.
//! 2. `days`: everything published in the last `days * 24h`. A window reaching
//!    past the earliest representable date keeps everything.
//! 3. previous run timestamp: everything published since then.
//! 4. otherwise: no filtering.

use chrono::{DateTime, Duration, Utc};
use std::fmt;

use crate::normalize::Article;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterPolicy {
    Unfiltered,
    /// Inclusive lower bound on `Article::published`.
    Since(DateTime<Utc>),
}

impl fmt::Display for FilterPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FilterPolicy::Unfiltered => f.write_str("unfiltered"),
            FilterPolicy::Since(t) => write!(f, "since {}", t.to_rfc3339()),
        }
    }
}

pub fn compute_cutoff(
    force: bool,
    days: Option<u32>,
    last_execution: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> FilterPolicy {
    if force {
        return FilterPolicy::Unfiltered;
    }
    if let Some(days) = days {
        return Duration::try_days(i64::from(days))
            .and_then(|window| now.checked_sub_signed(window))
            .map_or(FilterPolicy::Unfiltered, FilterPolicy::Since);
    }
    match last_execution {
        Some(t) => FilterPolicy::Since(t),
        None => FilterPolicy::Unfiltered,
    }
}

impl FilterPolicy {
    pub fn keeps(&self, article: &Article) -> bool {
        match self {
            FilterPolicy::Unfiltered => true,
            FilterPolicy::Since(cutoff) => article.published >= *cutoff,
        }
    }

    pub fn apply(&self, articles: Vec<Article>) -> Vec<Article> {
        articles.into_iter().filter(|a| self.keeps(a)).collect()
    }
}
