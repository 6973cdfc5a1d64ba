//! Knowledge retrieval for Parley.
//!
//! Semantic search over stored embeddings first, lexical matching on
//! segmented query tokens as the fallback.

pub mod retriever;
pub mod segment;
pub mod vector;

pub use retriever::{KnowledgeRetriever, TRUNCATION_MARKER, VECTOR_MIN_SCORE};
pub use segment::query_tokens;
pub use vector::{cosine_similarity, vector_search};
