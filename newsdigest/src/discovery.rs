//! Feed discovery.
//!
//! Candidates come from a fixed list of well-known tech sites and the feed
//! paths they publish. Candidates already configured are skipped. With
//! validation on, a candidate is kept only if it fetches and parses with at
//! least one entry.

use common::{append_sources, Config, FeedSource};
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::ingestion::FeedClient;

pub struct KnownSite {
    pub domain: &'static str,
    pub category: &'static str,
    pub paths: &'static [&'static str],
}

pub const KNOWN_SITES: &[KnownSite] = &[
    // AI & machine learning
    KnownSite { domain: "venturebeat.com", category: "AI", paths: &["/category/ai/feed/"] },
    KnownSite { domain: "artificialintelligence-news.com", category: "AI", paths: &["/feed/"] },
    KnownSite { domain: "deeplearning.ai", category: "AI", paths: &["/blog/feed/"] },
    // Security
    KnownSite { domain: "thehackernews.com", category: "Cybersecurity", paths: &["/feeds/posts/default"] },
    KnownSite { domain: "darkreading.com", category: "Cybersecurity", paths: &["/rss.xml", "/rss/all.xml"] },
    KnownSite { domain: "cybersecuritynews.com", category: "Cybersecurity", paths: &["/feed/"] },
    KnownSite { domain: "threatpost.com", category: "Cybersecurity", paths: &["/feed/"] },
    // Cloud & DevOps
    KnownSite { domain: "thenewstack.io", category: "Cloud", paths: &["/feed/"] },
    KnownSite { domain: "devops.com", category: "Cloud", paths: &["/feed/"] },
    KnownSite { domain: "cloudblog.withgoogle.com", category: "Cloud", paths: &["/rss/"] },
    // General tech
    KnownSite { domain: "wired.com", category: "Tech", paths: &["/feed/rss"] },
    KnownSite { domain: "engadget.com", category: "Tech", paths: &["/rss.xml"] },
    KnownSite { domain: "zdnet.com", category: "Tech", paths: &["/rss.xml"] },
    KnownSite { domain: "cnet.com", category: "Tech", paths: &["/rss/news/"] },
    KnownSite { domain: "techmeme.com", category: "Tech", paths: &["/feed.xml"] },
    KnownSite { domain: "siliconangle.com", category: "Tech", paths: &["/feed/"] },
    // Developers
    KnownSite { domain: "dev.to", category: "Dev", paths: &["/feed"] },
    KnownSite { domain: "hackernoon.com", category: "Dev", paths: &["/feed"] },
];

#[derive(Debug, Clone, Copy)]
pub struct DiscoveryOptions {
    pub max_new_feeds: usize,
    pub validate: bool,
    pub timeout: Duration,
}

/// Walk `sites` in order and return up to `max_new_feeds` feeds that are not
/// in `existing`.
pub async fn discover_feeds<C: FeedClient + ?Sized>(
    client: &C,
    sites: &[KnownSite],
    existing: &[FeedSource],
    options: &DiscoveryOptions,
) -> Vec<FeedSource> {
    let mut known: HashSet<String> = existing.iter().map(|s| s.url.clone()).collect();
    let mut found: Vec<FeedSource> = Vec::new();

    for site in sites {
        for path in site.paths {
            if found.len() >= options.max_new_feeds {
                return found;
            }

            let url = format!("https://{}{}", site.domain, path);
            if !known.insert(url.clone()) {
                continue;
            }

            let candidate = if options.validate {
                match validate_candidate(client, &url, site, options.timeout).await {
                    Some(source) => source,
                    None => continue,
                }
            } else {
                FeedSource::new(site_name(site.domain), url, site.category)
            };
            found.push(candidate);
        }
    }
    found
}

async fn validate_candidate<C: FeedClient + ?Sized>(
    client: &C,
    url: &str,
    site: &KnownSite,
    timeout: Duration,
) -> Option<FeedSource> {
    match client.fetch(url, timeout).await {
        Ok(feed) if !feed.entries.is_empty() => {
            let name = feed
                .title
                .map(|t| t.content.trim().to_string())
                .filter(|t| !t.is_empty())
                .unwrap_or_else(|| site_name(site.domain));
            Some(FeedSource::new(name, url, site.category))
        }
        Ok(_) => {
            debug!(url = %url, "candidate feed has no entries");
            None
        }
        Err(e) => {
            debug!(url = %url, kind = %e.kind(), "candidate feed rejected: {}", e);
            None
        }
    }
}

/// Readable name from a domain: `"artificialintelligence-news.com"` becomes
/// `"Artificialintelligence News"`.
pub fn site_name(domain: &str) -> String {
    let domain = domain.strip_prefix("www.").unwrap_or(domain);
    let label = domain.split('.').next().unwrap_or(domain);
    label
        .split(|c: char| c == '-' || c == '_')
        .filter(|w| !w.is_empty())
        .map(capitalize)
        .collect::<Vec<_>>()
        .join(" ")
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first
            .to_uppercase()
            .chain(chars.flat_map(char::to_lowercase))
            .collect(),
        None => String::new(),
    }
}

/// Run discovery as configured by `[discovery]`.
///
/// Found feeds are logged. With `auto_add_feeds` they also join
/// `config.sources` for this run and are appended to `config_path`.
/// Returns the feeds added to the run.
pub async fn run_discovery<C: FeedClient + ?Sized>(
    client: &C,
    config: &mut Config,
    config_path: &Path,
) -> Vec<FeedSource> {
    let settings = config.discovery();
    if !settings.enabled() {
        return Vec::new();
    }

    info!("Discovering new RSS feeds");
    let options = DiscoveryOptions {
        max_new_feeds: settings.max_new_feeds_per_run(),
        validate: settings.validate_feeds(),
        timeout: config.fetch_timeout(),
    };
    let found = discover_feeds(client, KNOWN_SITES, &config.sources, &options).await;

    if found.is_empty() {
        info!("No new feeds discovered");
        return found;
    }

    if !settings.auto_add_feeds() {
        info!(
            count = found.len(),
            "New feeds discovered but auto_add_feeds is disabled; review and add them manually"
        );
        for feed in &found {
            info!(name = %feed.name, category = %feed.category, url = %feed.url, "discovered feed");
        }
        return Vec::new();
    }

    for feed in &found {
        info!(name = %feed.name, category = %feed.category, url = %feed.url, "adding discovered feed");
    }
    if let Err(e) = append_sources(config_path, &found).await {
        warn!("Discovered feeds are used for this run only: {:#}", e);
    }
    config.sources.extend(found.iter().cloned());
    found
}
