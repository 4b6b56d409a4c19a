//! OpenAI embedding provider implementation.
//!
//! This module implements the [`EmbeddingProvider`] trait against OpenAI's
//! text embedding API over HTTPS. The recommender's default model is
//! `text-embedding-3-small`, matching the corpus the tool was designed for.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{EmbeddingError, EmbeddingProvider, EmbeddingResult};

/// Default API base URL; override with `with_base_url` for proxies or tests.
const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// OpenAI embedding provider.
///
/// Holds the configuration needed to call OpenAI's embeddings endpoint and
/// a reusable HTTP client.
#[derive(Debug, Clone)]
pub struct OpenAIEmbedding {
    /// OpenAI API key for authentication
    api_key: String,

    /// Model identifier (e.g., "text-embedding-3-small")
    model: String,

    /// Expected dimension of the embedding vectors
    embedding_dimension: usize,

    /// API base URL
    base_url: String,

    /// Shared HTTP client
    client: reqwest::Client,
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [&'a str],
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    index: usize,
    embedding: Vec<f32>,
}

#[derive(Deserialize)]
struct ApiErrorResponse {
    error: ApiErrorBody,
}

#[derive(Deserialize)]
struct ApiErrorBody {
    message: String,
}

impl OpenAIEmbedding {
    /// Create a new OpenAI embedding provider.
    ///
    /// # Arguments
    /// * `api_key` - OpenAI API key
    /// * `model` - Model name (defaults to "text-embedding-3-small" if None)
    pub fn new(api_key: String, model: Option<String>) -> Self {
        let model = model.unwrap_or_else(|| crate::DEFAULT_EMBEDDING_MODEL.to_string());
        let embedding_dimension = match model.as_str() {
            "text-embedding-3-small" => 1536,
            "text-embedding-3-large" => 3072,
            _ => crate::DEFAULT_EMBEDDING_DIMENSION,
        };

        Self {
            api_key,
            model,
            embedding_dimension,
            base_url: DEFAULT_BASE_URL.to_string(),
            client: reqwest::Client::new(),
        }
    }

    /// Override the API base URL (proxies, compatible gateways, tests).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Call the embeddings endpoint for a batch of inputs.
    ///
    /// The response rows are reordered by their `index` field so output order
    /// always matches input order.
    async fn request_embeddings(&self, inputs: &[&str]) -> EmbeddingResult<Vec<Vec<f32>>> {
        let url = format!("{}/embeddings", self.base_url);
        debug!(model = %self.model, inputs = inputs.len(), "requesting embeddings");

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&EmbeddingRequest {
                model: &self.model,
                input: inputs,
            })
            .send()
            .await
            .map_err(|e| EmbeddingError::ApiError(format!("request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ApiErrorResponse>(&body)
                .map(|e| e.error.message)
                .unwrap_or(body);
            return Err(EmbeddingError::ApiError(format!(
                "embeddings endpoint returned {status}: {message}"
            )));
        }

        let mut parsed: EmbeddingResponse = response
            .json()
            .await
            .map_err(|e| EmbeddingError::ApiError(format!("invalid response body: {e}")))?;

        if parsed.data.len() != inputs.len() {
            return Err(EmbeddingError::ApiError(format!(
                "expected {} embeddings, got {}",
                inputs.len(),
                parsed.data.len()
            )));
        }

        parsed.data.sort_by_key(|d| d.index);
        for row in &parsed.data {
            if row.embedding.len() != self.embedding_dimension {
                return Err(EmbeddingError::ApiError(format!(
                    "expected dimension {}, got {}",
                    self.embedding_dimension,
                    row.embedding.len()
                )));
            }
        }

        Ok(parsed.data.into_iter().map(|d| d.embedding).collect())
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAIEmbedding {
    async fn embed(&self, text: &str) -> EmbeddingResult<Vec<f32>> {
        if text.trim().is_empty() {
            return Err(EmbeddingError::InvalidInput("text cannot be empty".to_string()));
        }

        let mut embeddings = self.request_embeddings(&[text]).await?;
        embeddings
            .pop()
            .ok_or_else(|| EmbeddingError::ApiError("no embedding returned".to_string()))
    }

    async fn embed_batch(&self, texts: &[&str]) -> EmbeddingResult<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(vec![]);
        }
        if let Some(blank) = texts.iter().find(|t| t.trim().is_empty()) {
            return Err(EmbeddingError::InvalidInput(format!(
                "batch contains a blank input: '{blank}'"
            )));
        }

        self.request_embeddings(texts).await
    }

    fn dimension(&self) -> usize {
        self.embedding_dimension
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}
