//! Knowledge base records and retrieval results.

use serde::{Deserialize, Serialize};

/// A reference document the bot can quote from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgeEntry {
    pub id: i64,
    pub title: String,
    pub content: String,

    /// Free-form keyword string matched by lexical search
    #[serde(default)]
    pub keywords: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,

    /// Present only once the entry has been embedded
    #[serde(skip)]
    pub embedding: Option<Vec<f32>>,

    #[serde(default = "default_active")]
    pub active: bool,
}

fn default_active() -> bool {
    true
}

/// Fields for creating a knowledge entry.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewKnowledgeEntry {
    pub title: String,
    pub content: String,
    #[serde(default)]
    pub keywords: String,
    #[serde(default)]
    pub category: Option<String>,
}

/// A passage returned by retrieval, ready to fold into a prompt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievedPassage {
    pub id: i64,
    pub title: String,
    pub body: String,
    /// Cosine similarity for vector hits, 0.0 for lexical hits
    pub score: f32,
    pub truncated: bool,
}
