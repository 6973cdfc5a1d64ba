//! The knowledge retriever.
//!
//! `search` never fails. Semantic search runs when an embedder is
//! configured and entries carry embeddings; any failure or an empty result
//! falls through to lexical matching.

use std::sync::Arc;

use parley_core::{
    EmbeddingProvider, KnowledgeEntry, NewKnowledgeEntry, RecordStore, RetrievedPassage, StoreError,
};
use tracing::{debug, info, warn};

use crate::segment::query_tokens;
use crate::vector::vector_search;

/// Minimum cosine similarity for a semantic hit.
pub const VECTOR_MIN_SCORE: f32 = 0.3;

/// Appended to passage bodies that were cut short.
pub const TRUNCATION_MARKER: &str = "...(truncated)";

/// Characters of content included when embedding an entry.
const EMBED_CONTENT_CHARS: usize = 500;

pub struct KnowledgeRetriever {
    store: Arc<dyn RecordStore>,
    embedder: Option<Arc<dyn EmbeddingProvider>>,
}

impl KnowledgeRetriever {
    pub fn new(store: Arc<dyn RecordStore>, embedder: Option<Arc<dyn EmbeddingProvider>>) -> Self {
        Self { store, embedder }
    }

    pub fn has_embedder(&self) -> bool {
        self.embedder.is_some()
    }

    /// Up to `limit` passages relevant to `query`, bodies bounded to
    /// `max_passage_length` characters plus the truncation marker.
    pub async fn search(
        &self,
        query: &str,
        limit: usize,
        max_passage_length: usize,
    ) -> Vec<RetrievedPassage> {
        if limit == 0 {
            return Vec::new();
        }

        let entries = match self.store.load_knowledge_entries(true).await {
            Ok(entries) => entries,
            Err(e) => {
                warn!(error = %e, "Failed to load knowledge entries, skipping retrieval");
                return Vec::new();
            }
        };

        if let Some(passages) = self
            .semantic(query, &entries, limit, max_passage_length)
            .await
        {
            info!(hits = passages.len(), "Semantic retrieval");
            return passages;
        }

        let passages = lexical(query, &entries, limit, max_passage_length);
        info!(hits = passages.len(), "Lexical retrieval");
        passages
    }

    /// `None` means "fall back to lexical".
    async fn semantic(
        &self,
        query: &str,
        entries: &[KnowledgeEntry],
        limit: usize,
        max_passage_length: usize,
    ) -> Option<Vec<RetrievedPassage>> {
        let embedder = self.embedder.as_ref()?;

        if !entries.iter().any(|e| e.embedding.is_some()) {
            debug!("No embedded knowledge entries");
            return None;
        }

        let query_embedding = match embedder.embed(query).await {
            Ok(v) => v,
            Err(e) => {
                warn!(
                    embedder = %embedder.name(),
                    error = %e,
                    "Query embedding failed, falling back to lexical search"
                );
                return None;
            }
        };

        let hits = vector_search(entries, &query_embedding, limit, VECTOR_MIN_SCORE);
        if hits.is_empty() {
            debug!("No semantic hit above threshold");
            return None;
        }

        Some(
            hits.into_iter()
                .map(|(score, entry)| {
                    debug!(id = entry.id, title = %entry.title, score, "Semantic match");
                    passage(entry, score, max_passage_length)
                })
                .collect(),
        )
    }

    /// Re-embed every active entry. Failures are logged and skipped.
    ///
    /// Returns how many entries were embedded.
    pub async fn rebuild_embeddings(&self) -> Result<usize, StoreError> {
        let Some(embedder) = self.embedder.as_ref() else {
            warn!("No embedding provider configured, nothing to rebuild");
            return Ok(0);
        };

        let entries = self.store.load_knowledge_entries(true).await?;
        let total = entries.len();
        let mut count = 0;

        for entry in &entries {
            match embedder.embed(&embedding_text(&entry.title, &entry.content)).await {
                Ok(vector) => match self.store.update_knowledge_embedding(entry.id, &vector).await {
                    Ok(()) => count += 1,
                    Err(e) => warn!(id = entry.id, error = %e, "Failed to store embedding"),
                },
                Err(e) => warn!(id = entry.id, error = %e, "Embedding failed"),
            }
        }

        info!(embedded = count, total, "Knowledge embeddings rebuilt");
        Ok(count)
    }

    /// Embed one entry and persist the vector.
    ///
    /// `Ok(None)` when there is no embedder or the embedding call failed.
    pub async fn embed_entry(
        &self,
        entry: &KnowledgeEntry,
    ) -> Result<Option<Vec<f32>>, StoreError> {
        let Some(embedder) = &self.embedder else {
            return Ok(None);
        };

        match embedder.embed(&embedding_text(&entry.title, &entry.content)).await {
            Ok(vector) => {
                self.store.update_knowledge_embedding(entry.id, &vector).await?;
                Ok(Some(vector))
            }
            Err(e) => {
                warn!(id = entry.id, error = %e, "Embedding failed, entry kept without vector");
                Ok(None)
            }
        }
    }

    /// Store a new entry, embedding it when an embedder is available.
    pub async fn add_entry(&self, new: NewKnowledgeEntry) -> Result<KnowledgeEntry, StoreError> {
        let mut entry = self.store.add_knowledge_entry(new).await?;
        entry.embedding = self.embed_entry(&entry).await?;
        Ok(entry)
    }
}

/// Case-insensitive token match against keywords or title, storage order.
fn lexical(
    query: &str,
    entries: &[KnowledgeEntry],
    limit: usize,
    max_passage_length: usize,
) -> Vec<RetrievedPassage> {
    let tokens: Vec<String> = query_tokens(query)
        .into_iter()
        .map(|t| t.to_lowercase())
        .collect();
    if tokens.is_empty() {
        return Vec::new();
    }

    entries
        .iter()
        .filter(|entry| {
            let keywords = entry.keywords.to_lowercase();
            let title = entry.title.to_lowercase();
            tokens
                .iter()
                .any(|t| keywords.contains(t.as_str()) || title.contains(t.as_str()))
        })
        .take(limit)
        .map(|entry| passage(entry, 0.0, max_passage_length))
        .collect()
}

fn passage(entry: &KnowledgeEntry, score: f32, max_len: usize) -> RetrievedPassage {
    let (body, truncated) = truncate_chars(&entry.content, max_len);
    RetrievedPassage {
        id: entry.id,
        title: entry.title.clone(),
        body,
        score,
        truncated,
    }
}

/// Cut to `max_chars` characters (not bytes) and mark the cut.
fn truncate_chars(text: &str, max_chars: usize) -> (String, bool) {
    match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => (format!("{}{TRUNCATION_MARKER}", &text[..byte_idx]), true),
        None => (text.to_string(), false),
    }
}

fn embedding_text(title: &str, content: &str) -> String {
    let head: String = content.chars().take(EMBED_CONTENT_CHARS).collect();
    format!("{title} {head}")
}
