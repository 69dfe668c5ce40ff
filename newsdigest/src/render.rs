use chrono::{DateTime, Local, Utc};
use std::fmt::Write;
use tracing::warn;

use crate::normalize::{truncate_chars, Article};
use crate::pipeline::Digest;

const STYLE: &str = r#"
  body { font-family: -apple-system, "Segoe UI", Helvetica, Arial, sans-serif; color: #222; max-width: 760px; margin: 0 auto; padding: 16px; }
  header { border-bottom: 2px solid #2b6cb0; margin-bottom: 16px; }
  .stats { color: #555; font-size: 0.9em; }
  .toc ul { list-style: none; padding-left: 0; }
  .toc li { margin: 4px 0; }
  section.category h2 { color: #2b6cb0; border-bottom: 1px solid #ddd; }
  article { margin: 12px 0 20px; }
  article h3 { margin-bottom: 4px; }
  .meta { color: #777; font-size: 0.85em; }
  .meta .source { margin-right: 12px; font-weight: bold; }
  .read-more { font-size: 0.9em; }
  .category-summary { background: #f4f7fb; border-left: 3px solid #2b6cb0; padding: 4px 12px; }
  .category-summary h3 { font-size: 0.95em; margin: 6px 0; }
  footer { color: #999; font-size: 0.8em; border-top: 1px solid #ddd; margin-top: 24px; padding-top: 8px; }
"#;

/// Render the full HTML document for a digest.
pub fn render_digest(digest: &Digest, generated_at: DateTime<Local>) -> String {
    let mut html = String::with_capacity(4096 + digest.total_articles() * 512);

    html.push_str("<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"utf-8\">\n");
    html.push_str("<title>Tech digest</title>\n<style>");
    html.push_str(STYLE);
    html.push_str("</style>\n</head>\n<body>\n");

    let _ = write!(
        html,
        "<header>\n  <h1>Tech digest</h1>\n  <p class=\"date\">{}</p>\n  \
         <p class=\"stats\">{} articles in {} categories</p>\n</header>\n",
        generated_at.format("%d %B %Y %H:%M"),
        digest.total_articles(),
        digest.total_categories(),
    );

    render_toc(&mut html, digest);
    for (category, articles) in &digest.categories {
        render_category(&mut html, category, articles);
    }

    html.push_str("<footer>Generated by newsdigest</footer>\n</body>\n</html>\n");
    html
}

fn render_toc(html: &mut String, digest: &Digest) {
    html.push_str("<nav class=\"toc\">\n  <h2>Contents</h2>\n  <ul>\n");
    for (category, articles) in &digest.categories {
        let _ = writeln!(
            html,
            "    <li><a href=\"#{}\">{} ({})</a></li>",
            slugify(category),
            escape_html(category),
            articles.len()
        );
    }
    html.push_str("  </ul>\n</nav>\n");
}

fn render_category(html: &mut String, category: &str, articles: &[Article]) {
    let _ = writeln!(
        html,
        "<section class=\"category\" id=\"{}\">\n  <h2>{}</h2>",
        slugify(category),
        escape_html(category)
    );
    if let Some(summary) = category_summary(articles) {
        let _ = writeln!(
            html,
            "  <div class=\"category-summary\">\n    <h3>Category summary</h3>\n    <p>{}</p>\n  </div>",
            escape_html(&summary)
        );
    }
    for article in articles {
        render_article(html, article);
    }
    html.push_str("</section>\n");
}

const SUMMARY_ARTICLES: usize = 3;
const SUMMARY_EXCERPT_CHARS: usize = 100;

/// Opening lines of the first few descriptions in a category, joined into one
/// paragraph. `None` when none of them has a description.
pub fn category_summary(articles: &[Article]) -> Option<String> {
    let excerpts: Vec<String> = articles
        .iter()
        .take(SUMMARY_ARTICLES)
        .map(|a| a.description.trim())
        .filter(|d| !d.is_empty())
        .map(|d| truncate_chars(d, SUMMARY_EXCERPT_CHARS))
        .collect();

    if excerpts.is_empty() {
        None
    } else {
        Some(excerpts.join(" "))
    }
}

fn render_article(html: &mut String, article: &Article) {
    let link = escape_html(&article.link);
    let title = if article.title.is_empty() {
        link.clone()
    } else {
        escape_html(&article.title)
    };

    let _ = write!(
        html,
        "  <article>\n    <h3><a href=\"{link}\" target=\"_blank\">{title}</a></h3>\n    \
         <div class=\"meta\"><span class=\"source\">{}</span><span class=\"date\">{}</span></div>\n",
        escape_html(&article.source),
        format_date(article.published),
    );
    if !article.description.is_empty() {
        let _ = writeln!(html, "    <p>{}</p>", escape_html(&article.description));
    }
    let _ = writeln!(
        html,
        "    <a class=\"read-more\" href=\"{link}\" target=\"_blank\">Read more &rarr;</a>\n  </article>"
    );
}

fn format_date(t: DateTime<Utc>) -> String {
    t.with_timezone(&Local).format("%d/%m/%Y %H:%M").to_string()
}

/// Plain-text version of a rendered digest, for the text/plain mail part.
pub fn render_plain_text(html: &str) -> String {
    match html2text::from_read(html.as_bytes(), 100) {
        Ok(text) => text,
        Err(e) => {
            warn!("render: failed to convert digest HTML to text: {}", e);
            String::new()
        }
    }
}

pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

/// Anchor id for a category: lowercase alphanumerics joined by `-`.
pub fn slugify(text: &str) -> String {
    let mut slug = String::with_capacity(text.len());
    for c in text.chars().flat_map(char::to_lowercase) {
        if c.is_alphanumeric() {
            slug.push(c);
        } else if !slug.is_empty() && !slug.ends_with('-') {
            slug.push('-');
        }
    }
    while slug.ends_with('-') {
        slug.pop();
    }
    if slug.is_empty() {
        slug.push_str("category");
    }
    slug
}
