use chrono::{DateTime, Utc};
use common::FeedSource;
use feed_rs::model::{Entry, Link};
use scraper::Html;
use serde::Serialize;
use url::Url;

const ELLIPSIS: &str = "...";

/// Canonical article record handed from ingestion to rendering.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Article {
    pub title: String,
    /// Canonical identity used for deduplication, compared verbatim.
    pub link: String,
    pub description: String,
    pub published: DateTime<Utc>,
    pub source: String,
    pub category: String,
    pub fetch_date: DateTime<Utc>,
}

/// Map a parsed feed entry to an `Article`.
///
/// Returns `None` when the entry has no usable link; the caller counts it as
/// skipped. `now` is the single fetch timestamp shared by the whole run and
/// stands in for a missing publication date.
pub fn normalize_entry(
    source: &FeedSource,
    entry: &Entry,
    now: DateTime<Utc>,
    max_description_chars: usize,
) -> Option<Article> {
    let link = entry_link(&entry.links, &source.url)?;

    let title = entry
        .title
        .as_ref()
        .map(|t| t.content.trim().to_string())
        .unwrap_or_default();

    let raw_description = entry
        .summary
        .as_ref()
        .map(|s| s.content.clone())
        .filter(|s| !s.trim().is_empty())
        .or_else(|| entry.content.as_ref().and_then(|c| c.body.clone()))
        .unwrap_or_default();
    let description = truncate_chars(&strip_html(&raw_description), max_description_chars);

    let published = entry.published.or(entry.updated).unwrap_or(now);

    Some(Article {
        title,
        link,
        description,
        published,
        source: source.name.clone(),
        category: source.category.clone(),
        fetch_date: now,
    })
}

// Prefer the alternate (HTML page) link; fall back to whatever comes first.
fn entry_link(links: &[Link], feed_url: &str) -> Option<String> {
    let link = links
        .iter()
        .find(|l| matches!(l.rel.as_deref(), None | Some("alternate")))
        .or_else(|| links.first())?;

    let href = link.href.trim();
    if href.is_empty() {
        return None;
    }

    match Url::parse(href) {
        Ok(_) => Some(href.to_string()),
        Err(url::ParseError::RelativeUrlWithoutBase) => Url::parse(feed_url)
            .and_then(|base| base.join(href))
            .ok()
            .map(String::from),
        Err(_) => None,
    }
}

/// Reduce an HTML fragment to its text with whitespace collapsed.
pub fn strip_html(html: &str) -> String {
    if html.trim().is_empty() {
        return String::new();
    }
    let fragment = Html::parse_fragment(html);
    let text: String = fragment.root_element().text().collect();
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Keep at most `max_chars` code points, marking a cut with `...`.
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        None => text.to_string(),
        Some((cut, _)) => format!("{}{}", text[..cut].trim_end(), ELLIPSIS),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn parse_entries(xml: &str) -> Vec<Entry> {
        feed_rs::parser::parse(xml.as_bytes())
            .expect("parse feed")
            .entries
    }

    fn source() -> FeedSource {
        FeedSource::new("Example", "https://example.com/blog/feed.xml", "Tech")
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn normalizes_rss_item() {
        let entries = parse_entries(
            r#"<?xml version="1.0"?>
            <rss version="2.0"><channel><title>Example</title>
              <item>
                <title> Hello </title>
                <link>https://example.com/hello</link>
                <description>&lt;p&gt;Some &lt;b&gt;bold&lt;/b&gt;
                   text &amp;amp; more&lt;/p&gt;</description>
                <pubDate>Tue, 30 Apr 2024 08:00:00 GMT</pubDate>
              </item>
            </channel></rss>"#,
        );

        let article = normalize_entry(&source(), &entries[0], now(), 300).expect("article");
        assert_eq!(article.title, "Hello");
        assert_eq!(article.link, "https://example.com/hello");
        assert_eq!(article.description, "Some bold text & more");
        assert_eq!(
            article.published,
            Utc.with_ymd_and_hms(2024, 4, 30, 8, 0, 0).unwrap()
        );
        assert_eq!(article.source, "Example");
        assert_eq!(article.category, "Tech");
        assert_eq!(article.fetch_date, now());
    }

    #[test]
    fn missing_date_defaults_to_fetch_time_and_title_to_empty() {
        let entries = parse_entries(
            r#"<rss version="2.0"><channel><title>x</title>
              <item><link>https://example.com/a</link></item>
            </channel></rss>"#,
        );
        let article = normalize_entry(&source(), &entries[0], now(), 300).expect("article");
        assert_eq!(article.title, "");
        assert_eq!(article.published, now());
        assert_eq!(article.description, "");
    }

    #[test]
    fn entry_without_link_is_skipped() {
        let entries = parse_entries(
            r#"<rss version="2.0"><channel><title>x</title>
              <item><title>No link here</title></item>
            </channel></rss>"#,
        );
        assert!(normalize_entry(&source(), &entries[0], now(), 300).is_none());
    }

    #[test]
    fn relative_link_is_resolved_against_feed_url() {
        let entries = parse_entries(
            r#"<feed xmlns="http://www.w3.org/2005/Atom">
              <title>x</title><id>urn:x</id><updated>2024-04-29T10:00:00Z</updated>
              <entry>
                <title>Post</title><id>urn:x:1</id>
                <updated>2024-04-29T10:00:00Z</updated>
                <link rel="alternate" href="posts/1.html"/>
                <summary>Short</summary>
              </entry>
            </feed>"#,
        );
        let article = normalize_entry(&source(), &entries[0], now(), 300).expect("article");
        assert_eq!(article.link, "https://example.com/blog/posts/1.html");
        // Atom entry without <published> falls back to <updated>
        assert_eq!(
            article.published,
            Utc.with_ymd_and_hms(2024, 4, 29, 10, 0, 0).unwrap()
        );
    }

    #[test]
    fn truncates_on_code_points() {
        assert_eq!(truncate_chars("héllo wörld", 5), "héllo...");
        assert_eq!(truncate_chars("héllo", 5), "héllo");
        assert_eq!(truncate_chars("ab cd", 3), "ab...");
        assert_eq!(truncate_chars(&"é".repeat(400), 300).chars().count(), 303);
    }

    #[test]
    fn strip_html_collapses_whitespace() {
        assert_eq!(strip_html("<div>\n  a\n\n <i>b</i>\t</div>"), "a b");
        assert_eq!(strip_html("plain"), "plain");
        assert_eq!(strip_html("   "), "");
    }
}
