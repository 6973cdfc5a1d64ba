//! The record store: everything the chat pipeline reads or writes.
//!
//! The store is an external collaborator. The pipeline only depends on this
//! trait; `parley-store` ships an in-memory and a SQLite implementation.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::StoreError;
use crate::knowledge::{KnowledgeEntry, NewKnowledgeEntry};
use crate::message::Role;
use crate::profile::{BanStatus, BotProfile, SensitiveWord, UserRecord};

/// Default number of attempts per chat request.
pub const DEFAULT_RETRY_COUNT: u32 = 3;

/// One interchangeable completion backend.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderEntry {
    /// OpenAI-compatible endpoint (e.g., "https://api.deepseek.com/v1")
    pub base_url: String,
    pub api_key: String,
    pub model: String,
    /// Display name
    #[serde(default)]
    pub name: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub request_count: u64,
}

fn default_enabled() -> bool {
    true
}

impl ProviderEntry {
    pub fn new(
        name: impl Into<String>,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: api_key.into(),
            model: model.into(),
            name: name.into(),
            enabled: true,
            request_count: 0,
        }
    }

    /// Entries are identified by endpoint and model, not by name.
    pub fn same_endpoint(&self, other: &ProviderEntry) -> bool {
        self.base_url == other.base_url && self.model == other.model
    }

    /// Name for logs, falling back to the model.
    pub fn label(&self) -> &str {
        if self.name.is_empty() { &self.model } else { &self.name }
    }
}

impl std::fmt::Debug for ProviderEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderEntry")
            .field("name", &self.name)
            .field("base_url", &self.base_url)
            .field("api_key", &if self.api_key.is_empty() { "" } else { "***" })
            .field("model", &self.model)
            .field("enabled", &self.enabled)
            .field("request_count", &self.request_count)
            .finish()
    }
}

/// The persisted provider pool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolDocument {
    #[serde(default)]
    pub models: Vec<ProviderEntry>,
    #[serde(default = "default_retry_count")]
    pub retry_count: u32,
    #[serde(default = "default_retry_on_error")]
    pub retry_on_error: bool,
}

fn default_retry_count() -> u32 {
    DEFAULT_RETRY_COUNT
}

fn default_retry_on_error() -> bool {
    true
}

impl Default for PoolDocument {
    fn default() -> Self {
        Self {
            models: Vec::new(),
            retry_count: DEFAULT_RETRY_COUNT,
            retry_on_error: true,
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum StoredPool {
    Document(PoolDocument),
    Legacy(Vec<ProviderEntry>),
}

impl PoolDocument {
    /// Parse a stored pool, accepting the legacy bare-list format.
    pub fn from_json(raw: &str) -> Result<Self, StoreError> {
        let parsed: StoredPool = serde_json::from_str(raw)
            .map_err(|e| StoreError::Corrupt(format!("provider pool: {e}")))?;
        Ok(match parsed {
            StoredPool::Document(doc) => doc,
            StoredPool::Legacy(models) => PoolDocument {
                models,
                ..Default::default()
            },
        })
    }

    pub fn to_json(&self) -> Result<String, StoreError> {
        serde_json::to_string(self).map_err(|e| StoreError::Corrupt(format!("provider pool: {e}")))
    }
}

/// A persisted conversation record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub user_id: i64,
    pub channel_id: String,
    pub role: Role,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

/// Persistent storage used by the chat pipeline.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Backend name, for logs.
    fn name(&self) -> &str;

    // --- Users and moderation ---

    /// Look up an active ban. Expired temporary bans read as not banned.
    async fn get_ban(&self, discord_id: &str) -> Result<BanStatus, StoreError>;

    /// Ban a user. `expires_at = None` means permanent.
    async fn ban_user(
        &self,
        discord_id: &str,
        reason: &str,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<(), StoreError>;

    /// Lift a ban. Returns false when the user was not banned.
    async fn unban_user(&self, discord_id: &str) -> Result<bool, StoreError>;

    async fn get_or_create_user(
        &self,
        discord_id: &str,
        username: &str,
    ) -> Result<UserRecord, StoreError>;

    async fn get_memory_summary(&self, user_id: i64) -> Result<Option<String>, StoreError>;

    async fn append_conversation_turn(
        &self,
        user_id: i64,
        channel_id: &str,
        role: Role,
        text: &str,
    ) -> Result<(), StoreError>;

    /// Most recent turns for a user, oldest first.
    async fn recent_conversation(
        &self,
        user_id: i64,
        limit: usize,
    ) -> Result<Vec<ConversationTurn>, StoreError>;

    // --- Knowledge ---

    async fn load_knowledge_entries(&self, active_only: bool)
    -> Result<Vec<KnowledgeEntry>, StoreError>;

    async fn add_knowledge_entry(&self, entry: NewKnowledgeEntry)
    -> Result<KnowledgeEntry, StoreError>;

    async fn update_knowledge_embedding(&self, id: i64, embedding: &[f32])
    -> Result<(), StoreError>;

    // --- Sensitive-word lexicon ---

    /// Active lexicon terms.
    async fn load_sensitive_words(&self) -> Result<Vec<SensitiveWord>, StoreError>;

    /// Add a term. Returns `None` when the term already exists.
    async fn add_sensitive_word(
        &self,
        word: &str,
        category: Option<&str>,
    ) -> Result<Option<SensitiveWord>, StoreError>;

    /// Returns false when no term has this id.
    async fn remove_sensitive_word(&self, id: i64) -> Result<bool, StoreError>;

    // --- Configuration ---

    /// The stored provider pool, or `None` if never saved.
    async fn load_provider_pool_config(&self) -> Result<Option<PoolDocument>, StoreError>;

    async fn save_provider_pool_config(&self, doc: &PoolDocument) -> Result<(), StoreError>;

    /// Mode, persona and context limit for a bot. Unknown bots get defaults.
    async fn get_bot_profile(&self, bot_id: &str) -> Result<BotProfile, StoreError>;

    async fn set_bot_profile(&self, bot_id: &str, profile: &BotProfile) -> Result<(), StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pool_document_accepts_legacy_list() {
        let raw = r#"[{"base_url":"https://a/v1","api_key":"k","model":"m1","name":"a"}]"#;
        let doc = PoolDocument::from_json(raw).unwrap();
        assert_eq!(doc.models.len(), 1);
        assert!(doc.models[0].enabled);
        assert_eq!(doc.retry_count, 3);
        assert!(doc.retry_on_error);
    }

    #[test]
    fn pool_document_full_format() {
        let raw = r#"{"models":[{"base_url":"u","api_key":"k","model":"m","enabled":false,"request_count":7}],
                      "retry_count":5,"retry_on_error":false}"#;
        let doc = PoolDocument::from_json(raw).unwrap();
        assert!(!doc.models[0].enabled);
        assert_eq!(doc.models[0].request_count, 7);
        assert_eq!(doc.retry_count, 5);
        assert!(!doc.retry_on_error);

        let again = PoolDocument::from_json(&doc.to_json().unwrap()).unwrap();
        assert_eq!(again, doc);
    }

    #[test]
    fn pool_document_rejects_garbage() {
        assert!(matches!(
            PoolDocument::from_json("not json"),
            Err(StoreError::Corrupt(_))
        ));
    }

    #[test]
    fn entry_identity_ignores_name() {
        let a = ProviderEntry::new("a", "https://x/v1", "k1", "m");
        let b = ProviderEntry::new("b", "https://x/v1", "k2", "m");
        let c = ProviderEntry::new("a", "https://x/v1", "k1", "other");
        assert!(a.same_endpoint(&b));
        assert!(!a.same_endpoint(&c));
    }

    #[test]
    fn entry_debug_redacts_key() {
        let entry = ProviderEntry::new("a", "u", "sk-secret", "m");
        let debug = format!("{entry:?}");
        assert!(!debug.contains("sk-secret"));
        assert!(debug.contains("***"));
    }
}
