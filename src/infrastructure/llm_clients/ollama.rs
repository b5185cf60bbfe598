use super::{endpoint, LLMClient};
use crate::domain::error::{AppError, Result};
use crate::domain::llm_config::LLMConfig;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    system: &'a str,
    prompt: &'a str,
    stream: bool,
    options: GenerateOptions,
}

#[derive(Debug, Serialize)]
struct GenerateOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    num_predict: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    response: String,
}

/// Non-streaming completion through Ollama's `/api/generate`.
pub struct OllamaClient {
    client: reqwest::Client,
}

impl OllamaClient {
    pub fn new() -> Result<Self> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| AppError::Internal(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl LLMClient for OllamaClient {
    async fn generate(&self, config: &LLMConfig, system: &str, user: &str) -> Result<String> {
        let url = endpoint(&config.base_url, "api/generate");
        debug!("POST {} (model={})", url, config.model);

        let body = GenerateRequest {
            model: &config.model,
            system,
            prompt: user,
            stream: false,
            options: GenerateOptions {
                temperature: config.temperature,
                num_predict: config.max_tokens,
            },
        };

        let response = self
            .client
            .post(&url)
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .json(&body)
            .send()
            .await
            .map_err(|e| AppError::LLMError(format!("Ollama request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(AppError::LLMError(format!(
                "Ollama API error ({}): {}",
                status, text
            )));
        }

        let parsed: GenerateResponse = response
            .json()
            .await
            .map_err(|e| AppError::LLMError(format!("Failed to parse Ollama response: {}", e)))?;

        Ok(parsed.response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_disables_streaming() {
        let body = GenerateRequest {
            model: "llama2",
            system: "sys",
            prompt: "question",
            stream: false,
            options: GenerateOptions {
                temperature: Some(0.0),
                num_predict: None,
            },
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["stream"], false);
        assert_eq!(json["options"]["temperature"], 0.0);
        assert!(json["options"].get("num_predict").is_none());
    }

    #[test]
    fn test_response_parsing_ignores_extra_fields() {
        let parsed: GenerateResponse =
            serde_json::from_str(r#"{"model":"llama2","response":"SELECT 1","done":true}"#).unwrap();
        assert_eq!(parsed.response, "SELECT 1");
    }
}
