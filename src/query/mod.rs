//! Similarity ranking and recommendation.
//!
//! This module embeds a set of filtered standard documents and the user's
//! activity text, ranks the documents by cosine similarity, and returns the
//! top recommendations after a defensive metadata re-check and exact-text
//! deduplication.
//!
//! # Usage
//!
//! ```rust,no_run
//! use standards_search::corpus::CorpusIndex;
//! use standards_search::embedding::openai::OpenAIEmbedding;
//! use standards_search::query::{CosineSearchEngine, RecommendQuery, SearchEngine};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let corpus = CorpusIndex::load("data/achievement_standards.json")?;
//! let docs = corpus.filter(Some("1~2학년".parse()?), "수학");
//!
//! let provider = OpenAIEmbedding::new("api-key".to_string(), None);
//! let engine = CosineSearchEngine::new(provider);
//!
//! let query = RecommendQuery::new(
//!     "아이들이 블록으로 수를 세는 활동".to_string(),
//!     Some("1~2학년".parse()?),
//!     "수학".to_string(),
//!     None,
//! );
//! let results = engine.recommend(&docs, &query).await?;
//!
//! // Results are sorted by descending similarity score
//! for rec in results {
//!     println!("{} - Score: {:.3}", rec.content, rec.score);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! Text normalization is automatically applied before embedding.

use std::collections::HashSet;

use async_trait::async_trait;
use thiserror::Error;
use tracing::debug;

use crate::embedding::{normalize_text, EmbeddingProvider};
use crate::models::{GradeBand, Recommendation, StandardDocument};
use crate::{CANDIDATE_POOL_SIZE, DEFAULT_TOP_K};

/// Errors that can occur during query processing.
#[derive(Debug, Error)]
pub enum QueryError {
    /// Embedding generation failed
    #[error("Embedding error: {0}")]
    EmbeddingError(String),

    /// Invalid query parameters
    #[error("Invalid query: {0}")]
    InvalidQuery(String),
}

/// Result type for query operations.
pub type QueryResult<T> = Result<T, QueryError>;

/// Recommendation query parameters.
///
/// Encapsulates the activity text and the grade/subject selection it is
/// ranked against. The selection must match the corpus filter that produced
/// the documents; the engine re-checks it defensively.
#[derive(Debug, Clone)]
pub struct RecommendQuery {
    /// The activity description (will be normalized and embedded)
    pub text: String,

    /// Selected grade band (elementary only)
    pub grade: Option<GradeBand>,

    /// Selected subject
    pub subject: String,

    /// Maximum number of recommendations to return
    pub top_k: usize,
}

impl RecommendQuery {
    /// Create a new recommendation query.
    ///
    /// # Arguments
    /// * `text` - The activity description
    /// * `grade` - Selected grade band, if the corpus has a grade axis
    /// * `subject` - Selected subject
    /// * `top_k` - Maximum number of results to return (default: 5)
    pub fn new(
        text: String,
        grade: Option<GradeBand>,
        subject: String,
        top_k: Option<usize>,
    ) -> Self {
        Self {
            text,
            grade,
            subject,
            top_k: top_k.unwrap_or(DEFAULT_TOP_K),
        }
    }
}

/// Trait for recommendation engines.
///
/// Implementations coordinate with an embedding provider to rank the
/// filtered documents against the activity text.
#[async_trait]
pub trait SearchEngine: Send + Sync {
    /// Rank the given documents against the query and return the top results.
    ///
    /// # Returns
    /// At most `query.top_k` recommendations, sorted by descending
    /// similarity, with no duplicate trimmed content. An empty document set
    /// yields an empty result.
    ///
    /// # Errors
    /// Returns `QueryError::InvalidQuery` for blank query text, or
    /// `QueryError::EmbeddingError` if embedding fails
    async fn recommend(
        &self,
        documents: &[StandardDocument],
        query: &RecommendQuery,
    ) -> QueryResult<Vec<Recommendation>>;
}

/// Compute cosine similarity between two vectors.
///
/// Cosine similarity is a measure of similarity between two non-zero vectors
/// defined as the cosine of the angle between them. It ranges from -1 to 1,
/// where 1 means the vectors point in the same direction.
///
/// # Panics
/// Panics if the vectors have different lengths or if either vector has zero
/// magnitude. Both conditions are ruled out upstream: a provider's dimension
/// is fixed, and embeddings of non-blank text are non-zero.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    assert_eq!(a.len(), b.len(), "Vectors must have the same length");

    let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    assert!(norm_a > 0.0 && norm_b > 0.0, "Vector magnitude cannot be zero");

    dot_product / (norm_a * norm_b)
}

/// Cosine-similarity recommendation engine.
///
/// Embeds every filtered document and the query, ranks by cosine similarity,
/// restricts to a fixed-size candidate pool, then applies the metadata
/// re-check and dedup while collecting the top-k. The filtered sets are a
/// few dozen standards at most, so full scoring is cheap.
pub struct CosineSearchEngine<E>
where
    E: EmbeddingProvider,
{
    /// Embedding provider for document and query embeddings
    embedding_provider: E,

    /// Number of top-ranked candidates considered before filtering and dedup
    candidate_pool: usize,
}

impl<E> CosineSearchEngine<E>
where
    E: EmbeddingProvider,
{
    /// Create a new engine with the default candidate pool size (10).
    pub fn new(embedding_provider: E) -> Self {
        Self {
            embedding_provider,
            candidate_pool: CANDIDATE_POOL_SIZE,
        }
    }

    /// Override the candidate pool size.
    pub fn with_candidate_pool(mut self, candidate_pool: usize) -> Self {
        self.candidate_pool = candidate_pool;
        self
    }
}

#[async_trait]
impl<E> SearchEngine for CosineSearchEngine<E>
where
    E: EmbeddingProvider,
{
    async fn recommend(
        &self,
        documents: &[StandardDocument],
        query: &RecommendQuery,
    ) -> QueryResult<Vec<Recommendation>> {
        if query.text.trim().is_empty() {
            return Err(QueryError::InvalidQuery(
                "query text must not be blank".to_string(),
            ));
        }
        if documents.is_empty() {
            return Ok(Vec::new());
        }

        // 1. Normalize and embed the query text
        let normalized_query = normalize_text(&query.text);
        let query_embedding = self
            .embedding_provider
            .embed(&normalized_query)
            .await
            .map_err(|e| QueryError::EmbeddingError(e.to_string()))?;

        // 2. Embed every document's content in one batch
        let normalized_docs: Vec<String> = documents
            .iter()
            .map(|doc| normalize_text(&doc.content))
            .collect();
        let doc_refs: Vec<&str> = normalized_docs.iter().map(|s| s.as_str()).collect();
        let doc_embeddings = self
            .embedding_provider
            .embed_batch(&doc_refs)
            .await
            .map_err(|e| QueryError::EmbeddingError(e.to_string()))?;

        // 3. Score each document by cosine similarity against the query
        let mut scored: Vec<(usize, f32)> = doc_embeddings
            .iter()
            .enumerate()
            .map(|(idx, embedding)| (idx, cosine_similarity(&query_embedding, embedding)))
            .collect();

        // 4. Sort descending and keep the candidate pool
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(self.candidate_pool);

        // 5. Metadata re-check, dedup by trimmed content, collect top-k
        let mut seen: HashSet<String> = HashSet::new();
        let mut results: Vec<Recommendation> = Vec::new();
        for (idx, score) in scored {
            if results.len() == query.top_k {
                break;
            }

            let doc = &documents[idx];
            if doc.subject != query.subject || doc.grade != query.grade {
                debug!(content = %doc.content, "candidate metadata mismatch; discarded");
                continue;
            }

            let trimmed = doc.content.trim().to_string();
            if !seen.insert(trimmed.clone()) {
                continue;
            }

            results.push(Recommendation::new(trimmed, score));
        }

        debug!(count = results.len(), "recommendation complete");
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::EmbeddingError;
    use crate::models::RelevanceLevel;

    // Mock EmbeddingProvider returning pre-seeded vectors keyed by text
    struct MockEmbeddingProvider {
        vectors: Vec<(String, Vec<f32>)>,
        should_fail: bool,
    }

    impl MockEmbeddingProvider {
        fn new(vectors: Vec<(&str, Vec<f32>)>) -> Self {
            Self {
                vectors: vectors
                    .into_iter()
                    .map(|(text, v)| (normalize_text(text), v))
                    .collect(),
                should_fail: false,
            }
        }

        fn with_failure() -> Self {
            Self {
                vectors: Vec::new(),
                should_fail: true,
            }
        }
    }

    #[async_trait]
    impl EmbeddingProvider for MockEmbeddingProvider {
        async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
            if self.should_fail {
                return Err(EmbeddingError::ApiError("Mock embedding failure".to_string()));
            }
            self.vectors
                .iter()
                .find(|(key, _)| key == text)
                .map(|(_, v)| v.clone())
                .ok_or_else(|| EmbeddingError::Other(format!("no mock vector for '{text}'")))
        }

        async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
            let mut results = Vec::new();
            for text in texts {
                results.push(self.embed(text).await?);
            }
            Ok(results)
        }

        fn dimension(&self) -> usize {
            3
        }

        fn model_name(&self) -> &str {
            "mock-model"
        }
    }

    fn doc(content: &str) -> StandardDocument {
        StandardDocument {
            content: content.to_string(),
            subject: "수학".to_string(),
            grade: None,
        }
    }

    fn query(text: &str) -> RecommendQuery {
        RecommendQuery::new(text.to_string(), None, "수학".to_string(), None)
    }

    #[test]
    fn test_cosine_similarity() {
        let a = vec![1.0, 0.0, 0.0];
        let b = vec![1.0, 0.0, 0.0];
        assert!((cosine_similarity(&a, &b) - 1.0).abs() < 1e-6);

        let a = vec![1.0, 0.0];
        let b = vec![0.0, 1.0];
        assert!((cosine_similarity(&a, &b) - 0.0).abs() < 1e-6);

        let a = vec![1.0, 1.0];
        let b = vec![1.0, 1.0];
        assert!((cosine_similarity(&a, &b) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_query_defaults_to_top_5() {
        let q = RecommendQuery::new("활동".to_string(), None, "수학".to_string(), None);
        assert_eq!(q.top_k, 5);
    }

    #[tokio::test]
    async fn test_results_sorted_descending() {
        let provider = MockEmbeddingProvider::new(vec![
            ("질의", vec![1.0, 0.0, 0.0]),
            ("기준 가", vec![0.0, 1.0, 0.0]),
            ("기준 나", vec![0.8, 0.6, 0.0]),
            ("기준 다", vec![1.0, 0.1, 0.0]),
        ]);
        let engine = CosineSearchEngine::new(provider);
        let docs = vec![doc("기준 가"), doc("기준 나"), doc("기준 다")];

        let results = engine.recommend(&docs, &query("질의")).await.unwrap();
        assert_eq!(results.len(), 3);
        assert_eq!(results[0].content, "기준 다");
        for pair in results.windows(2) {
            assert!(pair[0].score > pair[1].score);
        }
    }

    #[tokio::test]
    async fn test_top_k_truncation() {
        let mut vectors: Vec<(String, Vec<f32>)> = vec![("질의".to_string(), vec![1.0, 0.0, 0.0])];
        let mut docs = Vec::new();
        for i in 0..8 {
            let content = format!("기준 {i}");
            vectors.push((content.clone(), vec![1.0, 0.1 * i as f32, 0.0]));
            docs.push(doc(&content));
        }
        let provider = MockEmbeddingProvider::new(
            vectors
                .iter()
                .map(|(t, v)| (t.as_str(), v.clone()))
                .collect(),
        );
        let engine = CosineSearchEngine::new(provider);

        let results = engine.recommend(&docs, &query("질의")).await.unwrap();
        assert_eq!(results.len(), 5);
    }

    #[tokio::test]
    async fn test_candidate_pool_bounds_results() {
        // With a pool of 2, only the two highest-ranked documents are
        // eligible, even though top_k allows more
        let provider = MockEmbeddingProvider::new(vec![
            ("질의", vec![1.0, 0.0, 0.0]),
            ("기준 가", vec![1.0, 0.0, 0.0]),
            ("기준 나", vec![0.9, 0.1, 0.0]),
            ("기준 다", vec![0.8, 0.2, 0.0]),
        ]);
        let engine = CosineSearchEngine::new(provider).with_candidate_pool(2);
        let docs = vec![doc("기준 가"), doc("기준 나"), doc("기준 다")];

        let results = engine.recommend(&docs, &query("질의")).await.unwrap();
        assert_eq!(results.len(), 2);
    }

    // Mock that hands out pre-seeded vectors in call order (query first,
    // then the document batch), so two trim-equal contents can be given
    // different similarity scores
    struct SeqEmbeddingProvider {
        vectors: std::sync::Mutex<std::collections::VecDeque<Vec<f32>>>,
    }

    impl SeqEmbeddingProvider {
        fn new(vectors: Vec<Vec<f32>>) -> Self {
            Self {
                vectors: std::sync::Mutex::new(vectors.into()),
            }
        }
    }

    #[async_trait]
    impl EmbeddingProvider for SeqEmbeddingProvider {
        async fn embed(&self, _text: &str) -> Result<Vec<f32>, EmbeddingError> {
            self.vectors
                .lock()
                .unwrap()
                .pop_front()
                .ok_or_else(|| EmbeddingError::Other("mock vectors exhausted".to_string()))
        }

        async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
            let mut results = Vec::new();
            for text in texts {
                results.push(self.embed(text).await?);
            }
            Ok(results)
        }

        fn dimension(&self) -> usize {
            3
        }

        fn model_name(&self) -> &str {
            "seq-mock-model"
        }
    }

    #[tokio::test]
    async fn test_dedup_keeps_higher_ranked_occurrence() {
        // Two documents whose contents are equal after trimming but score
        // differently: only the higher-scoring occurrence survives
        let provider = SeqEmbeddingProvider::new(vec![
            vec![1.0, 0.0, 0.0], // query
            vec![0.0, 1.0, 0.0], // first document, score 0.0
            vec![1.0, 0.0, 0.0], // second document, score 1.0
        ]);
        let engine = CosineSearchEngine::new(provider);
        // Second document differs only by trailing whitespace
        let docs = vec![doc("기준 가"), doc("기준 가 ")];

        let results = engine.recommend(&docs, &query("질의")).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].content, "기준 가");
        assert!((results[0].score - 1.0).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_dedup_equal_scores_keep_first_occurrence() {
        let provider = SeqEmbeddingProvider::new(vec![
            vec![1.0, 0.0, 0.0], // query
            vec![1.0, 0.0, 0.0], // first document
            vec![1.0, 0.0, 0.0], // duplicate with an equal score
        ]);
        let engine = CosineSearchEngine::new(provider);
        let docs = vec![doc(" 기준 가"), doc("기준 가")];

        let results = engine.recommend(&docs, &query("질의")).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].content, "기준 가");
    }

    #[tokio::test]
    async fn test_metadata_mismatch_discarded() {
        let provider = MockEmbeddingProvider::new(vec![
            ("질의", vec![1.0, 0.0, 0.0]),
            ("기준 가", vec![1.0, 0.0, 0.0]),
            ("기준 나", vec![0.9, 0.1, 0.0]),
        ]);
        let engine = CosineSearchEngine::new(provider);
        let mut other = doc("기준 가");
        other.subject = "과학".to_string();
        let docs = vec![other, doc("기준 나")];

        let results = engine.recommend(&docs, &query("질의")).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].content, "기준 나");
    }

    #[tokio::test]
    async fn test_blank_query_is_invalid() {
        let provider = MockEmbeddingProvider::new(vec![]);
        let engine = CosineSearchEngine::new(provider);
        let result = engine.recommend(&[doc("기준 가")], &query("   ")).await;
        assert!(matches!(result, Err(QueryError::InvalidQuery(_))));
    }

    #[tokio::test]
    async fn test_empty_documents_yield_empty_result() {
        let provider = MockEmbeddingProvider::new(vec![]);
        let engine = CosineSearchEngine::new(provider);
        let results = engine.recommend(&[], &query("질의")).await.unwrap();
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn test_embedding_error_propagation() {
        let provider = MockEmbeddingProvider::with_failure();
        let engine = CosineSearchEngine::new(provider);
        let result = engine.recommend(&[doc("기준 가")], &query("질의")).await;
        assert!(matches!(result, Err(QueryError::EmbeddingError(_))));
    }

    #[tokio::test]
    async fn test_relevance_level_assignment() {
        let provider = MockEmbeddingProvider::new(vec![
            ("질의", vec![1.0, 0.0, 0.0]),
            ("기준 가", vec![1.0, 0.0, 0.0]),
            ("기준 나", vec![0.8, 0.6, 0.0]),
        ]);
        let engine = CosineSearchEngine::new(provider);
        let docs = vec![doc("기준 가"), doc("기준 나")];

        let results = engine.recommend(&docs, &query("질의")).await.unwrap();
        assert_eq!(results[0].relevance, RelevanceLevel::Identical);
        assert_eq!(results[1].relevance, RelevanceLevel::Similar);
    }
}
