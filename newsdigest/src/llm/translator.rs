// Translator module
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};

use super::LlmProvider;
use crate::pipeline::Digest;

/// Translates article descriptions, falling back to the original text when
/// the provider fails. Identical inputs are only sent once per run.
pub struct Translator {
    provider: Arc<dyn LlmProvider>,
    cache: HashMap<(String, String), String>,
}

impl Translator {
    pub fn new(provider: Arc<dyn LlmProvider>) -> Self {
        Self {
            provider,
            cache: HashMap::new(),
        }
    }

    pub async fn translate_text(&mut self, text: &str, language: &str) -> String {
        if text.trim().is_empty() {
            return text.to_string();
        }

        let key = (text.to_string(), language.to_string());
        if let Some(hit) = self.cache.get(&key) {
            return hit.clone();
        }

        match self.provider.translate(text, language).await {
            Ok(translated) => {
                self.cache.insert(key, translated.clone());
                translated
            }
            Err(e) => {
                warn!("Translation failed: {}, keeping original text", e);
                text.to_string()
            }
        }
    }

    /// Rewrite every description in the digest into `language`.
    pub async fn translate_digest(&mut self, digest: &mut Digest, language: &str) {
        let total = digest.total_articles();
        info!("Translating {} article descriptions to {}", total, language);

        for articles in digest.categories.values_mut() {
            for article in articles.iter_mut() {
                article.description = self.translate_text(&article.description, language).await;
            }
        }
    }
}
