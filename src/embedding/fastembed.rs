//! FastEmbed embedding provider implementation.
//!
//! This module provides an implementation of the `EmbeddingProvider` trait
//! using the fastembed library for local embedding generation, so the
//! recommender can run without API access.
//!
//! The default model is the multilingual paraphrase MiniLM, which handles
//! the Korean standard statements; the English-only MiniLM variants do not.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
use tokio::sync::Mutex;

use super::{EmbeddingError, EmbeddingProvider, EmbeddingResult};

/// FastEmbed embedding provider.
///
/// Holds the model instance (behind a mutex, since fastembed inference takes
/// `&mut self`) and its reported configuration.
#[derive(Clone)]
pub struct FastEmbedProvider {
    /// The embedding model instance
    model: Arc<Mutex<TextEmbedding>>,

    /// Model identifier
    model_name: String,

    /// Expected dimension of the embedding vectors
    embedding_dimension: usize,
}

impl FastEmbedProvider {
    /// Create a new FastEmbed embedding provider.
    ///
    /// # Arguments
    /// * `model` - Optional model to use (defaults to the multilingual
    ///   ParaphraseMLMiniLML12V2)
    /// * `cache_dir` - Optional cache directory for downloaded model files
    ///
    /// # Errors
    /// Returns `EmbeddingError::ConfigError` if model initialization fails
    pub fn new(model: Option<EmbeddingModel>, cache_dir: Option<String>) -> EmbeddingResult<Self> {
        let model_type = model.unwrap_or(EmbeddingModel::ParaphraseMLMiniLML12V2);
        let model_name = format!("{:?}", model_type);

        let embedding_dimension = match model_type {
            EmbeddingModel::AllMiniLML6V2 => 384,
            EmbeddingModel::BGESmallENV15 => 384,
            EmbeddingModel::BGEBaseENV15 => 768,
            EmbeddingModel::BGELargeENV15 => 1024,
            EmbeddingModel::NomicEmbedTextV1 => 768,
            EmbeddingModel::NomicEmbedTextV15 => 768,
            EmbeddingModel::ParaphraseMLMiniLML12V2 => 384,
            EmbeddingModel::ParaphraseMLMpnetBaseV2 => 768,
            _ => 384, // Default fallback
        };

        let mut init_options = InitOptions::new(model_type);
        if let Some(dir) = cache_dir {
            init_options = init_options.with_cache_dir(PathBuf::from(dir));
        }

        let text_embedding = TextEmbedding::try_new(init_options).map_err(|e| {
            EmbeddingError::ConfigError(format!("Failed to initialize FastEmbed model: {}", e))
        })?;

        Ok(Self {
            model: Arc::new(Mutex::new(text_embedding)),
            model_name,
            embedding_dimension,
        })
    }
}

#[async_trait]
impl EmbeddingProvider for FastEmbedProvider {
    async fn embed(&self, text: &str) -> EmbeddingResult<Vec<f32>> {
        if text.trim().is_empty() {
            return Err(EmbeddingError::InvalidInput("text cannot be empty".to_string()));
        }

        let mut model = self.model.lock().await;

        // fastembed expects a vector of texts
        let embeddings = model
            .embed(vec![text.to_string()], None)
            .map_err(|e| EmbeddingError::Other(format!("Embedding generation failed: {}", e)))?;

        embeddings
            .into_iter()
            .next()
            .ok_or_else(|| EmbeddingError::Other("No embedding generated".to_string()))
    }

    async fn embed_batch(&self, texts: &[&str]) -> EmbeddingResult<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(vec![]);
        }

        let owned: Vec<String> = texts.iter().map(|t| t.to_string()).collect();

        let mut model = self.model.lock().await;
        let embeddings = model
            .embed(owned, None)
            .map_err(|e| EmbeddingError::Other(format!("Embedding generation failed: {}", e)))?;

        if embeddings.len() != texts.len() {
            return Err(EmbeddingError::Other(format!(
                "expected {} embeddings, got {}",
                texts.len(),
                embeddings.len()
            )));
        }

        Ok(embeddings)
    }

    fn dimension(&self) -> usize {
        self.embedding_dimension
    }

    fn model_name(&self) -> &str {
        &self.model_name
    }
}
