use anyhow::Result;

/// Core trait for LLM providers
#[async_trait::async_trait]
pub trait LlmProvider: Send + Sync {
    /// Generate a completion for a given prompt and return its text
    async fn generate(&self, request: LlmRequest) -> Result<String>;

    /// Translate a short piece of text into `language`, returning only the translation
    async fn translate(&self, text: &str, language: &str) -> Result<String>;
}

/// Request structure for LLM generation
#[derive(Debug, Clone)]
pub struct LlmRequest {
    pub prompt: String,
    pub max_tokens: Option<usize>,
    pub temperature: Option<f32>,
    pub timeout_seconds: Option<u64>,
}

pub mod remote;
pub mod translator;
