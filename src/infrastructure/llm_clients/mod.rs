pub mod ollama;
pub mod openai;

use crate::domain::error::{AppError, Result};
use crate::domain::llm_config::LLMConfig;
use crate::domain::llm_config::LLMProvider;
use async_trait::async_trait;
use ollama::OllamaClient;
use openai::OpenAIClient;

#[async_trait]
pub trait LLMClient: Send + Sync {
    async fn generate(&self, config: &LLMConfig, system: &str, user: &str) -> Result<String>;
}

pub struct RouterClient {
    openai: OpenAIClient,
    ollama: OllamaClient,
}

impl RouterClient {
    pub fn new() -> Result<Self> {
        Ok(Self {
            openai: OpenAIClient::new()?,
            ollama: OllamaClient::new()?,
        })
    }
}

#[async_trait]
impl LLMClient for RouterClient {
    async fn generate(&self, config: &LLMConfig, system: &str, user: &str) -> Result<String> {
        match config.provider {
            LLMProvider::OpenAI => self.openai.generate(config, system, user).await,
            LLMProvider::Ollama => self.ollama.generate(config, system, user).await,
            LLMProvider::Local => Err(AppError::ConfigError(
                "The local provider only serves embeddings".to_string(),
            )),
        }
    }
}

/// Joins a base URL and a path without doubling the slash.
pub(crate) fn endpoint(base_url: &str, path: &str) -> String {
    if base_url.ends_with('/') {
        format!("{}{}", base_url, path)
    } else {
        format!("{}/{}", base_url, path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_joins_once() {
        assert_eq!(
            endpoint("http://localhost:11434", "api/generate"),
            "http://localhost:11434/api/generate"
        );
        assert_eq!(
            endpoint("https://api.openai.com/v1/", "chat/completions"),
            "https://api.openai.com/v1/chat/completions"
        );
    }

    #[tokio::test]
    async fn test_local_provider_cannot_generate() {
        let router = RouterClient::new().unwrap();
        let config = LLMConfig {
            provider: LLMProvider::Local,
            ..LLMConfig::default()
        };
        let err = router.generate(&config, "system", "user").await.unwrap_err();
        assert!(matches!(err, AppError::ConfigError(_)));
    }
}
