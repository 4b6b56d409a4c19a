//! Achievement standard recommender - semantic search over Korean curriculum
//! achievement standards.
//!
//! Given a free-text description of a classroom activity, this library
//! recommends the most semantically similar official achievement standard
//! (성취기준) statements for a selected school level, grade band, and subject.
//!
//! # Architecture
//!
//! The system is organized into several key modules:
//!
//! - **models**: Core data structures (SchoolLevel, GradeBand, StandardRecord,
//!   StandardDocument, Recommendation)
//! - **normalizer**: Line scanner that turns raw pasted curriculum text into a
//!   flat stream of standard records
//! - **corpus**: Nested-map corpus construction, JSON persistence, and
//!   grade/subject filtering
//! - **embedding**: Text embedding generation and normalization
//! - **query**: Similarity ranking and recommendation
//!
//! # Workflow
//!
//! ## Offline corpus build
//!
//! 1. Scan raw curriculum text for grade/subject headers and bracketed
//!    standard-code lines
//! 2. Emit one record per standard line, tagged with the nearest preceding
//!    header's grade and subject
//! 3. Group records into a nested map (grade → subject → standards for
//!    elementary, subject → standards for middle/high)
//! 4. Write the map as a UTF-8 JSON corpus file
//!
//! ## Online recommendation
//!
//! 1. Load the corpus JSON and filter to the selected grade/subject leaf
//! 2. Embed the filtered standards and the user's activity text
//! 3. Rank by cosine similarity, drop metadata mismatches, deduplicate by
//!    trimmed content
//! 4. Return the top 5 results with their scores
//!
//! # Example
//!
//! ```ignore
//! use standards_search::{
//!     corpus::CorpusIndex,
//!     embedding::openai::OpenAIEmbedding,
//!     query::{CosineSearchEngine, RecommendQuery, SearchEngine},
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let corpus = CorpusIndex::load("data/achievement_standards.json")?;
//!     let docs = corpus.filter(Some("1~2학년".parse()?), "수학");
//!
//!     let provider = OpenAIEmbedding::new(api_key, None);
//!     let engine = CosineSearchEngine::new(provider);
//!
//!     let query = RecommendQuery::new(
//!         "아이들이 블록으로 수를 세는 활동".to_string(),
//!         Some("1~2학년".parse()?),
//!         "수학".to_string(),
//!         None,
//!     );
//!     for rec in engine.recommend(&docs, &query).await? {
//!         println!("{} ({:.3})", rec.content, rec.score);
//!     }
//!     Ok(())
//! }
//! ```

// Public modules
pub mod corpus;
pub mod embedding;
pub mod models;
pub mod normalizer;
pub mod query;

// Re-export commonly used types at the crate root
pub use corpus::{CorpusBuilder, CorpusIndex};
pub use embedding::EmbeddingProvider;
pub use models::{
    GradeBand, Recommendation, RelevanceLevel, SchoolLevel, StandardDocument, StandardRecord,
};
pub use normalizer::{LineScanner, ScanStats};
pub use query::{RecommendQuery, SearchEngine};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default embedding model name
pub const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-3-small";

/// Default embedding dimension for text-embedding-3-small
pub const DEFAULT_EMBEDDING_DIMENSION: usize = 1536;

/// Default number of recommendations returned to the user
pub const DEFAULT_TOP_K: usize = 5;

/// Size of the candidate pool ranked before metadata filtering and dedup
pub const CANDIDATE_POOL_SIZE: usize = 10;
