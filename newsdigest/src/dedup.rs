use std::collections::HashSet;

use crate::normalize::Article;

/// Drop every article whose `link` was already seen, keeping the first
/// occurrence and the original order.
///
/// Links are compared as exact strings: `http://a/x` and `https://a/x/` are
/// different articles.
pub fn dedupe(articles: Vec<Article>) -> Vec<Article> {
    let mut seen = HashSet::with_capacity(articles.len());
    articles
        .into_iter()
        .filter(|a| seen.insert(a.link.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn article(link: &str, source: &str) -> Article {
        let t = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        Article {
            title: format!("{source} {link}"),
            link: link.to_string(),
            description: String::new(),
            published: t,
            source: source.to_string(),
            category: "cat".to_string(),
            fetch_date: t,
        }
    }

    #[test]
    fn keeps_first_occurrence_in_order() {
        let input = vec![
            article("l1", "A"),
            article("l2", "A"),
            article("l2", "B"),
            article("l3", "B"),
            article("l1", "C"),
        ];
        let out = dedupe(input);
        let got: Vec<_> = out.iter().map(|a| (a.link.as_str(), a.source.as_str())).collect();
        assert_eq!(got, vec![("l1", "A"), ("l2", "A"), ("l3", "B")]);
    }

    #[test]
    fn is_idempotent() {
        let input = vec![
            article("x", "A"),
            article("y", "A"),
            article("x", "B"),
            article("z", "B"),
            article("y", "C"),
        ];
        let once = dedupe(input);
        let twice = dedupe(once.clone());
        assert_eq!(once, twice);
    }

    #[test]
    fn does_not_normalize_urls() {
        let out = dedupe(vec![
            article("https://a.example/post", "A"),
            article("https://a.example/post/", "A"),
            article("http://a.example/post", "A"),
            article("https://a.example/post?utm_source=rss", "A"),
        ]);
        assert_eq!(out.len(), 4);
    }

    #[test]
    fn empty_input() {
        assert!(dedupe(Vec::new()).is_empty());
    }
}
