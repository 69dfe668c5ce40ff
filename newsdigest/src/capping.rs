use std::collections::BTreeMap;

use crate::normalize::Article;

/// Articles keyed by category name.
pub type CategoryGroups = BTreeMap<String, Vec<Article>>;

/// Bucket articles by category, keeping their relative order.
pub fn group_by_category(articles: Vec<Article>) -> CategoryGroups {
    let mut groups = CategoryGroups::new();
    for article in articles {
        groups
            .entry(article.category.clone())
            .or_default()
            .push(article);
    }
    groups
}

/// Sort each category newest first and keep at most `max_per_category`.
/// Ties keep their incoming order.
pub fn cap_categories(groups: CategoryGroups, max_per_category: usize) -> CategoryGroups {
    groups
        .into_iter()
        .map(|(category, mut articles)| {
            articles.sort_by(|a, b| b.published.cmp(&a.published));
            articles.truncate(max_per_category);
            (category, articles)
        })
        .collect()
}
