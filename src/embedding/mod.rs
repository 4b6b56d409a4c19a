//! Embedding provider abstraction and implementations.
//!
//! This module defines the interface for text embedding generation and
//! provides implementations for the OpenAI embeddings API (the default used
//! by the recommender) and fastembed for fully local operation.
//!
//! The abstraction allows the system to swap between different embedding
//! models without changing the ranking logic. Embeddings are computed per
//! request; nothing is cached across requests.

pub mod fastembed;
pub mod openai;

use async_trait::async_trait;
use thiserror::Error;

/// Errors that can occur during embedding operations.
#[derive(Debug, Error)]
pub enum EmbeddingError {
    /// Network or API communication error
    #[error("API request failed: {0}")]
    ApiError(String),

    /// Invalid input text (e.g., empty, too long)
    #[error("Invalid input text: {0}")]
    InvalidInput(String),

    /// Configuration error (e.g., missing API key)
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Other unexpected errors
    #[error("Unexpected error: {0}")]
    Other(String),
}

/// Result type for embedding operations.
pub type EmbeddingResult<T> = Result<T, EmbeddingError>;

/// Trait for text embedding providers.
///
/// Implementors of this trait can generate vector embeddings from text
/// inputs. The trait is async to support API-based embedding services.
///
/// Vector dimensionality is fixed per provider and consistent across calls,
/// so cosine similarity between any two outputs is well defined.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Generate an embedding vector for the given text.
    ///
    /// # Arguments
    /// * `text` - The input text to embed (should be pre-normalized)
    ///
    /// # Errors
    /// Returns `EmbeddingError` if the embedding generation fails
    async fn embed(&self, text: &str) -> EmbeddingResult<Vec<f32>>;

    /// Generate embeddings for multiple texts in a single batch.
    ///
    /// This can be more efficient than calling `embed` multiple times,
    /// especially for API-based providers that support batch requests.
    ///
    /// # Returns
    /// A vector of embedding vectors, in the same order as the input texts
    ///
    /// # Errors
    /// Returns `EmbeddingError` if any embedding generation fails
    async fn embed_batch(&self, texts: &[&str]) -> EmbeddingResult<Vec<Vec<f32>>>;

    /// Get the dimension of embeddings produced by this provider.
    fn dimension(&self) -> usize;

    /// Get the model name/identifier for this provider.
    fn model_name(&self) -> &str;
}

/// Normalizes text for consistent embedding generation.
///
/// This function applies the following transformations:
/// - Converts to lowercase (a no-op for Korean text, but keeps mixed-script
///   activity descriptions consistent)
/// - Trims leading/trailing whitespace
/// - Collapses multiple consecutive spaces to a single space
pub fn normalize_text(text: &str) -> String {
    text.to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_text() {
        assert_eq!(normalize_text("Hello World"), "hello world");
        assert_eq!(normalize_text("  Multiple   Spaces  "), "multiple spaces");
        assert_eq!(normalize_text("UPPERCASE"), "uppercase");
        assert_eq!(normalize_text("   "), "");
    }

    #[test]
    fn test_normalize_text_korean() {
        assert_eq!(
            normalize_text("  아이들이  블록으로   수를 세는 활동 "),
            "아이들이 블록으로 수를 세는 활동"
        );
    }
}
