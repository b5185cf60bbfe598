use crate::domain::error::{AppError, Result};
use crate::domain::llm_config::{EmbeddingConfig, LLMProvider};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

#[cfg(feature = "local-embeddings")]
use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
#[cfg(feature = "local-embeddings")]
use std::sync::{Arc, Mutex};

/// Text to fixed-length vector. Deterministic for identical input within a
/// model version.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    fn dimension(&self) -> usize;
}

#[derive(Debug, Serialize)]
struct OpenAIEmbeddingRequest {
    model: String,
    input: String,
}

#[derive(Debug, Deserialize)]
struct OpenAIEmbeddingResponse {
    data: Vec<OpenAIEmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct OpenAIEmbeddingData {
    embedding: Vec<f32>,
}

#[derive(Debug, Serialize)]
struct OllamaEmbeddingRequest {
    model: String,
    prompt: String,
}

#[derive(Debug, Deserialize)]
struct OllamaEmbeddingResponse {
    embedding: Vec<f32>,
}

pub struct EmbeddingService {
    client: Client,
    config: EmbeddingConfig,
    #[cfg(feature = "local-embeddings")]
    local_embedder: Arc<Mutex<Option<TextEmbedding>>>,
}

impl EmbeddingService {
    pub fn new(config: EmbeddingConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|e| AppError::Internal(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            config,
            #[cfg(feature = "local-embeddings")]
            local_embedder: Arc::new(Mutex::new(None)),
        })
    }

    pub fn config(&self) -> &EmbeddingConfig {
        &self.config
    }

    #[cfg(feature = "local-embeddings")]
    fn resolve_local_embedding_model(model: &str) -> EmbeddingModel {
        match model.trim().to_lowercase().as_str() {
            "bge-small-en-v1.5" => EmbeddingModel::BGESmallENV15,
            "all-minilm-l12-v2" => EmbeddingModel::AllMiniLML12V2,
            _ => EmbeddingModel::AllMiniLML6V2,
        }
    }

    #[cfg(feature = "local-embeddings")]
    async fn generate_local_embedding(&self, text: &str) -> Result<Vec<f32>> {
        let model = Self::resolve_local_embedding_model(&self.config.model);
        let embedder = Arc::clone(&self.local_embedder);
        let text = text.to_string();

        // ONNX inference is CPU-bound; keep it off the async workers.
        tokio::task::spawn_blocking(move || {
            let mut guard = embedder
                .lock()
                .map_err(|_| AppError::Internal("Local embedder lock poisoned".to_string()))?;
            if guard.is_none() {
                let mut options = InitOptions::default();
                options.model_name = model;
                let instance = TextEmbedding::try_new(options).map_err(|e| {
                    AppError::Internal(format!("Failed to init local embedder: {}", e))
                })?;
                *guard = Some(instance);
            }
            let instance = guard
                .as_mut()
                .ok_or_else(|| AppError::Internal("Local embedder unavailable".to_string()))?;
            let embeddings = instance
                .embed(vec![text], None)
                .map_err(|e| AppError::Internal(format!("Failed to embed text: {}", e)))?;
            embeddings
                .into_iter()
                .next()
                .ok_or_else(|| AppError::Internal("Empty embedding response".to_string()))
        })
        .await
        .map_err(|e| AppError::Internal(format!("Embedding task failed: {}", e)))?
    }

    #[cfg(not(feature = "local-embeddings"))]
    async fn generate_local_embedding(&self, _text: &str) -> Result<Vec<f32>> {
        Err(AppError::ConfigError(
            "Local embeddings require the `local-embeddings` feature".to_string(),
        ))
    }

    async fn generate_openai_embedding(&self, text: &str) -> Result<Vec<f32>> {
        let url = if self.config.base_url.ends_with('/') {
            format!("{}embeddings", self.config.base_url)
        } else {
            format!("{}/embeddings", self.config.base_url)
        };

        let request = OpenAIEmbeddingRequest {
            model: self.config.model.clone(),
            input: text.to_string(),
        };

        let mut req = self.client.post(&url);
        if let Some(api_key) = &self.config.api_key {
            req = req.bearer_auth(api_key);
        }

        let response = req.json(&request).send().await.map_err(|e| {
            AppError::LLMError(format!("Failed to call embedding API ({}): {}", url, e))
        })?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(AppError::LLMError(format!(
                "Embedding API returned error {} (URL: {}): {}",
                status, url, error_text
            )));
        }

        let embedding_response: OpenAIEmbeddingResponse = response.json().await.map_err(|e| {
            AppError::ParseError(format!("Failed to parse embedding response: {}", e))
        })?;

        embedding_response
            .data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .ok_or_else(|| AppError::LLMError("No embedding data in response".to_string()))
    }

    async fn generate_ollama_embedding(&self, text: &str) -> Result<Vec<f32>> {
        let base = self
            .config
            .base_url
            .trim_end_matches('/')
            .trim_end_matches("/v1")
            .trim_end_matches('/');
        let url = format!("{}/api/embeddings", base);

        let request = OllamaEmbeddingRequest {
            model: self.config.model.clone(),
            prompt: text.to_string(),
        };

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                AppError::LLMError(format!("Failed to call embedding API ({}): {}", url, e))
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(AppError::LLMError(format!(
                "Embedding API returned error {} (URL: {}): {}",
                status, url, error_text
            )));
        }

        let embedding_response: OllamaEmbeddingResponse = response.json().await.map_err(|e| {
            AppError::ParseError(format!("Failed to parse embedding response: {}", e))
        })?;

        Ok(embedding_response.embedding)
    }
}

#[async_trait]
impl EmbeddingProvider for EmbeddingService {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let embedding = match self.config.provider {
            LLMProvider::Local => self.generate_local_embedding(text).await?,
            LLMProvider::OpenAI => self.generate_openai_embedding(text).await?,
            LLMProvider::Ollama => self.generate_ollama_embedding(text).await?,
        };
        check_dimension(&embedding, self.config.dimension)?;
        debug!("Embedded {} chars into {} dims", text.len(), embedding.len());
        Ok(embedding)
    }

    fn dimension(&self) -> usize {
        self.config.dimension
    }
}

pub fn check_dimension(embedding: &[f32], expected: usize) -> Result<()> {
    if embedding.is_empty() {
        return Err(AppError::LLMError("Empty embedding response".to_string()));
    }
    if embedding.len() != expected {
        return Err(AppError::ValidationError(format!(
            "Embedding has {} dimensions, expected {}",
            embedding.len(),
            expected
        )));
    }
    Ok(())
}

/// Returns 0.0 for mismatched lengths or a zero vector.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        (dot_product / (norm_a * norm_b)).clamp(-1.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cosine_similarity() {
        let a = vec![1.0, 0.0];
        let b = vec![1.0, 0.0];
        assert!((cosine_similarity(&a, &b) - 1.0).abs() < 0.001);

        let c = vec![0.0, 1.0];
        assert!(cosine_similarity(&a, &c).abs() < 0.001);

        let d = vec![-1.0, 0.0];
        assert!((cosine_similarity(&a, &d) + 1.0).abs() < 0.001);
    }

    #[test]
    fn test_cosine_similarity_degenerate_inputs() {
        assert_eq!(cosine_similarity(&[1.0, 0.0], &[1.0, 0.0, 0.0]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
    }

    #[test]
    fn test_check_dimension() {
        assert!(check_dimension(&[0.1, 0.2, 0.3], 3).is_ok());
        assert!(check_dimension(&[0.1, 0.2], 3).is_err());
        assert!(check_dimension(&[], 3).is_err());
    }

    #[tokio::test]
    async fn test_local_provider_without_feature_is_config_error() {
        if cfg!(feature = "local-embeddings") {
            return;
        }
        let service = EmbeddingService::new(EmbeddingConfig::default()).unwrap();
        assert!(matches!(
            service.embed("hello").await,
            Err(AppError::ConfigError(_))
        ));
    }
}
