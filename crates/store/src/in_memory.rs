//! In-memory store: useful for testing and ephemeral sessions.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parley_core::error::StoreError;
use parley_core::store::{ConversationTurn, PoolDocument, RecordStore};
use parley_core::{
    BanStatus, BotProfile, KnowledgeEntry, NewKnowledgeEntry, Role, SensitiveWord, UserRecord,
};
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::info;

struct Ban {
    reason: String,
    expires_at: Option<DateTime<Utc>>,
}

#[derive(Default)]
struct Data {
    users: Vec<UserRecord>,
    memories: HashMap<i64, String>,
    conversations: Vec<ConversationTurn>,
    knowledge: Vec<KnowledgeEntry>,
    bans: HashMap<String, Ban>,
    words: Vec<SensitiveWord>,
    pool: Option<PoolDocument>,
    profiles: HashMap<String, BotProfile>,
    next_id: i64,
}

impl Data {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }
}

/// A store that keeps everything in process memory.
pub struct InMemoryStore {
    data: RwLock<Data>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            data: RwLock::new(Data::default()),
        }
    }

    /// Set a user's memory summary.
    pub async fn set_memory_summary(&self, user_id: i64, summary: impl Into<String>) {
        self.data.write().await.memories.insert(user_id, summary.into());
    }

    /// Every persisted conversation turn, in insertion order.
    pub async fn conversation_log(&self) -> Vec<ConversationTurn> {
        self.data.read().await.conversations.clone()
    }

    /// Activate or deactivate a knowledge entry.
    pub async fn set_knowledge_active(&self, id: i64, active: bool) -> bool {
        let mut data = self.data.write().await;
        match data.knowledge.iter_mut().find(|e| e.id == id) {
            Some(entry) => {
                entry.active = active;
                true
            }
            None => false,
        }
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RecordStore for InMemoryStore {
    fn name(&self) -> &str {
        "in_memory"
    }

    async fn get_ban(&self, discord_id: &str) -> Result<BanStatus, StoreError> {
        let mut data = self.data.write().await;
        let Some(ban) = data.bans.get(discord_id) else {
            return Ok(BanStatus::not_banned());
        };
        if ban.expires_at.is_some_and(|at| at <= Utc::now()) {
            data.bans.remove(discord_id);
            info!(discord_id, "Expired ban lifted");
            return Ok(BanStatus::not_banned());
        }
        Ok(BanStatus::banned(ban.reason.clone()))
    }

    async fn ban_user(
        &self,
        discord_id: &str,
        reason: &str,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<(), StoreError> {
        self.data.write().await.bans.insert(
            discord_id.to_string(),
            Ban {
                reason: reason.to_string(),
                expires_at,
            },
        );
        Ok(())
    }

    async fn unban_user(&self, discord_id: &str) -> Result<bool, StoreError> {
        Ok(self.data.write().await.bans.remove(discord_id).is_some())
    }

    async fn get_or_create_user(
        &self,
        discord_id: &str,
        username: &str,
    ) -> Result<UserRecord, StoreError> {
        let mut data = self.data.write().await;
        if let Some(user) = data.users.iter_mut().find(|u| u.discord_id == discord_id) {
            if user.username != username {
                user.username = username.to_string();
            }
            return Ok(user.clone());
        }
        let user = UserRecord {
            id: data.next_id(),
            discord_id: discord_id.to_string(),
            username: username.to_string(),
        };
        data.users.push(user.clone());
        Ok(user)
    }

    async fn get_memory_summary(&self, user_id: i64) -> Result<Option<String>, StoreError> {
        Ok(self.data.read().await.memories.get(&user_id).cloned())
    }

    async fn append_conversation_turn(
        &self,
        user_id: i64,
        channel_id: &str,
        role: Role,
        text: &str,
    ) -> Result<(), StoreError> {
        self.data.write().await.conversations.push(ConversationTurn {
            user_id,
            channel_id: channel_id.to_string(),
            role,
            content: text.to_string(),
            created_at: Utc::now(),
        });
        Ok(())
    }

    async fn recent_conversation(
        &self,
        user_id: i64,
        limit: usize,
    ) -> Result<Vec<ConversationTurn>, StoreError> {
        let data = self.data.read().await;
        let mine: Vec<&ConversationTurn> = data
            .conversations
            .iter()
            .filter(|t| t.user_id == user_id)
            .collect();
        let skip = mine.len().saturating_sub(limit);
        Ok(mine.into_iter().skip(skip).cloned().collect())
    }

    async fn load_knowledge_entries(
        &self,
        active_only: bool,
    ) -> Result<Vec<KnowledgeEntry>, StoreError> {
        Ok(self
            .data
            .read()
            .await
            .knowledge
            .iter()
            .filter(|e| !active_only || e.active)
            .cloned()
            .collect())
    }

    async fn add_knowledge_entry(
        &self,
        entry: NewKnowledgeEntry,
    ) -> Result<KnowledgeEntry, StoreError> {
        let mut data = self.data.write().await;
        let stored = KnowledgeEntry {
            id: data.next_id(),
            title: entry.title,
            content: entry.content,
            keywords: entry.keywords,
            category: entry.category,
            embedding: None,
            active: true,
        };
        data.knowledge.push(stored.clone());
        Ok(stored)
    }

    async fn update_knowledge_embedding(
        &self,
        id: i64,
        embedding: &[f32],
    ) -> Result<(), StoreError> {
        let mut data = self.data.write().await;
        let entry = data
            .knowledge
            .iter_mut()
            .find(|e| e.id == id)
            .ok_or_else(|| StoreError::NotFound(format!("knowledge entry {id}")))?;
        entry.embedding = Some(embedding.to_vec());
        Ok(())
    }

    async fn load_sensitive_words(&self) -> Result<Vec<SensitiveWord>, StoreError> {
        Ok(self.data.read().await.words.clone())
    }

    async fn add_sensitive_word(
        &self,
        word: &str,
        category: Option<&str>,
    ) -> Result<Option<SensitiveWord>, StoreError> {
        let mut data = self.data.write().await;
        if data.words.iter().any(|w| w.word == word) {
            return Ok(None);
        }
        let stored = SensitiveWord {
            id: data.next_id(),
            word: word.to_string(),
            category: category.map(str::to_string),
        };
        data.words.push(stored.clone());
        Ok(Some(stored))
    }

    async fn remove_sensitive_word(&self, id: i64) -> Result<bool, StoreError> {
        let mut data = self.data.write().await;
        let before = data.words.len();
        data.words.retain(|w| w.id != id);
        Ok(data.words.len() < before)
    }

    async fn load_provider_pool_config(&self) -> Result<Option<PoolDocument>, StoreError> {
        Ok(self.data.read().await.pool.clone())
    }

    async fn save_provider_pool_config(&self, doc: &PoolDocument) -> Result<(), StoreError> {
        self.data.write().await.pool = Some(doc.clone());
        Ok(())
    }

    async fn get_bot_profile(&self, bot_id: &str) -> Result<BotProfile, StoreError> {
        Ok(self
            .data
            .read()
            .await
            .profiles
            .get(bot_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn set_bot_profile(&self, bot_id: &str, profile: &BotProfile) -> Result<(), StoreError> {
        self.data
            .write()
            .await
            .profiles
            .insert(bot_id.to_string(), profile.clone());
        Ok(())
    }
}
