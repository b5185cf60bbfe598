use serde::{Deserialize, Serialize};
use validator::Validate;

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LLMProvider {
    /// In-process model (embeddings only).
    Local,
    /// Any server speaking the OpenAI REST dialect.
    OpenAI,
    Ollama,
}

#[derive(Debug, Serialize, Deserialize, Clone, Validate)]
pub struct LLMConfig {
    pub provider: LLMProvider,
    #[validate(length(min = 1))]
    pub base_url: String,
    #[validate(length(min = 1))]
    pub model: String,
    pub api_key: Option<String>,
    pub max_tokens: Option<u32>,
    #[validate(range(min = 0.0, max = 2.0))]
    pub temperature: Option<f32>,
    #[validate(range(min = 1, max = 600))]
    pub request_timeout_secs: u64,
}

impl Default for LLMConfig {
    fn default() -> Self {
        Self {
            provider: LLMProvider::Ollama,
            base_url: "http://localhost:11434".to_string(),
            model: "llama2".to_string(),
            api_key: None,
            max_tokens: Some(1024),
            // SQL generation wants a near-deterministic sampler.
            temperature: Some(0.0),
            request_timeout_secs: 120,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Validate)]
pub struct EmbeddingConfig {
    pub provider: LLMProvider,
    pub base_url: String,
    #[validate(length(min = 1))]
    pub model: String,
    pub api_key: Option<String>,
    /// Vector length every stored example embedding must have.
    #[validate(range(min = 1, max = 8192))]
    pub dimension: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: LLMProvider::Local,
            base_url: String::new(),
            model: "all-minilm-l6-v2".to_string(),
            api_key: None,
            dimension: 384,
        }
    }
}
