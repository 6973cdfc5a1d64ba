//! SQLite store.
//!
//! One database file holds every table the chat pipeline touches:
//! - `users`, `memories`, `conversations`
//! - `knowledge_base` (embeddings as little-endian f32 BLOBs)
//! - `blacklist`, `sensitive_words`
//! - `system_config` (the provider pool lives under `llm_pool`)
//! - `bot_config`

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parley_core::error::StoreError;
use parley_core::profile::{DEFAULT_CONTEXT_LIMIT, DEFAULT_PERSONA};
use parley_core::store::{ConversationTurn, PoolDocument, RecordStore};
use parley_core::{
    BanStatus, BotProfile, ChatMode, KnowledgeEntry, NewKnowledgeEntry, Role, SensitiveWord,
    UserRecord,
};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Row, SqlitePool};
use std::str::FromStr;
use tracing::{debug, info, warn};

const POOL_CONFIG_KEY: &str = "llm_pool";

/// A production SQLite record store.
pub struct SqliteStore {
    pool: SqlitePool,
}

fn query_err(context: &str) -> impl FnOnce(sqlx::Error) -> StoreError + '_ {
    move |e| StoreError::QueryFailed(format!("{context}: {e}"))
}

impl SqliteStore {
    /// Open (or create) a database file and run migrations.
    ///
    /// Pass `":memory:"` for an in-process ephemeral database.
    pub async fn new(path: &str) -> Result<Self, StoreError> {
        let in_memory = path.contains(":memory:");
        let options = SqliteConnectOptions::from_str(path)
            .map_err(|e| StoreError::Storage(format!("Invalid SQLite path: {e}")))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .pragma("foreign_keys", "ON");

        // An in-memory database lives as long as its connection
        let pool = SqlitePoolOptions::new()
            .max_connections(if in_memory { 1 } else { 4 })
            .idle_timeout(if in_memory { None } else { Some(std::time::Duration::from_secs(600)) })
            .max_lifetime(if in_memory { None } else { Some(std::time::Duration::from_secs(1800)) })
            .connect_with(options)
            .await
            .map_err(|e| StoreError::Storage(format!("Failed to open SQLite: {e}")))?;

        let store = Self { pool };
        store.run_migrations().await?;
        info!("SQLite store initialized at {path}");
        Ok(store)
    }

    /// Create from an existing pool (useful for testing).
    pub async fn from_pool(pool: SqlitePool) -> Result<Self, StoreError> {
        let store = Self { pool };
        store.run_migrations().await?;
        Ok(store)
    }

    async fn run_migrations(&self) -> Result<(), StoreError> {
        let statements: [(&str, &str); 10] = [
            (
                "users table",
                r#"
                CREATE TABLE IF NOT EXISTS users (
                    id          INTEGER PRIMARY KEY AUTOINCREMENT,
                    discord_id  TEXT UNIQUE NOT NULL,
                    username    TEXT NOT NULL DEFAULT '',
                    created_at  TEXT NOT NULL,
                    updated_at  TEXT NOT NULL
                )
                "#,
            ),
            (
                "memories table",
                r#"
                CREATE TABLE IF NOT EXISTS memories (
                    id          INTEGER PRIMARY KEY AUTOINCREMENT,
                    user_id     INTEGER NOT NULL REFERENCES users(id),
                    summary     TEXT,
                    updated_at  TEXT NOT NULL
                )
                "#,
            ),
            (
                "conversations table",
                r#"
                CREATE TABLE IF NOT EXISTS conversations (
                    id          INTEGER PRIMARY KEY AUTOINCREMENT,
                    user_id     INTEGER NOT NULL REFERENCES users(id),
                    channel_id  TEXT NOT NULL,
                    role        TEXT NOT NULL,
                    content     TEXT NOT NULL,
                    created_at  TEXT NOT NULL
                )
                "#,
            ),
            (
                "conversations index",
                "CREATE INDEX IF NOT EXISTS idx_conversations_user ON conversations(user_id, id)",
            ),
            (
                "knowledge_base table",
                r#"
                CREATE TABLE IF NOT EXISTS knowledge_base (
                    id          INTEGER PRIMARY KEY AUTOINCREMENT,
                    title       TEXT NOT NULL,
                    content     TEXT NOT NULL,
                    keywords    TEXT NOT NULL DEFAULT '',
                    category    TEXT,
                    embedding   BLOB,
                    is_active   INTEGER NOT NULL DEFAULT 1,
                    created_at  TEXT NOT NULL,
                    updated_at  TEXT NOT NULL
                )
                "#,
            ),
            (
                "blacklist table",
                r#"
                CREATE TABLE IF NOT EXISTS blacklist (
                    id          INTEGER PRIMARY KEY AUTOINCREMENT,
                    discord_id  TEXT UNIQUE NOT NULL,
                    reason      TEXT NOT NULL DEFAULT '',
                    expires_at  TEXT,
                    created_at  TEXT NOT NULL
                )
                "#,
            ),
            (
                "sensitive_words table",
                r#"
                CREATE TABLE IF NOT EXISTS sensitive_words (
                    id          INTEGER PRIMARY KEY AUTOINCREMENT,
                    word        TEXT UNIQUE NOT NULL,
                    category    TEXT,
                    is_active   INTEGER NOT NULL DEFAULT 1,
                    created_at  TEXT NOT NULL
                )
                "#,
            ),
            (
                "system_config table",
                r#"
                CREATE TABLE IF NOT EXISTS system_config (
                    key         TEXT PRIMARY KEY,
                    value       TEXT NOT NULL,
                    updated_at  TEXT NOT NULL
                )
                "#,
            ),
            (
                "bot_config table",
                r#"
                CREATE TABLE IF NOT EXISTS bot_config (
                    bot_id        TEXT PRIMARY KEY,
                    system_prompt TEXT,
                    context_limit INTEGER,
                    chat_mode     TEXT,
                    updated_at    TEXT NOT NULL
                )
                "#,
            ),
            (
                "memories index",
                "CREATE INDEX IF NOT EXISTS idx_memories_user ON memories(user_id, updated_at DESC)",
            ),
        ];

        for (what, sql) in statements {
            sqlx::query(sql)
                .execute(&self.pool)
                .await
                .map_err(|e| StoreError::MigrationFailed(format!("{what}: {e}")))?;
        }

        debug!("SQLite migrations complete");
        Ok(())
    }

    /// Set (or replace) a user's memory summary.
    pub async fn set_memory_summary(&self, user_id: i64, summary: &str) -> Result<(), StoreError> {
        let now = Utc::now().to_rfc3339();
        let updated = sqlx::query(
            "UPDATE memories SET summary = ?1, updated_at = ?2 WHERE user_id = ?3",
        )
        .bind(summary)
        .bind(&now)
        .bind(user_id)
        .execute(&self.pool)
        .await
        .map_err(query_err("update memory"))?;
        if updated.rows_affected() == 0 {
            sqlx::query("INSERT INTO memories (user_id, summary, updated_at) VALUES (?1, ?2, ?3)")
                .bind(user_id)
                .bind(summary)
                .bind(&now)
                .execute(&self.pool)
                .await
                .map_err(query_err("insert memory"))?;
        }
        Ok(())
    }

    fn row_to_knowledge(row: &sqlx::sqlite::SqliteRow) -> Result<KnowledgeEntry, StoreError> {
        let embedding: Option<Vec<u8>> = row
            .try_get("embedding")
            .map_err(query_err("embedding column"))?;
        let active: i64 = row.try_get("is_active").map_err(query_err("is_active column"))?;
        Ok(KnowledgeEntry {
            id: row.try_get("id").map_err(query_err("id column"))?,
            title: row.try_get("title").map_err(query_err("title column"))?,
            content: row.try_get("content").map_err(query_err("content column"))?,
            keywords: row.try_get("keywords").map_err(query_err("keywords column"))?,
            category: row.try_get("category").map_err(query_err("category column"))?,
            embedding: embedding.map(|blob| blob_to_embedding(&blob)),
            active: active != 0,
        })
    }
}

/// Serialize an embedding vector to bytes.
fn embedding_to_blob(embedding: &[f32]) -> Vec<u8> {
    embedding.iter().flat_map(|f| f.to_le_bytes()).collect()
}

fn blob_to_embedding(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

fn parse_time(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
}

#[async_trait]
impl RecordStore for SqliteStore {
    fn name(&self) -> &str {
        "sqlite"
    }

    async fn get_ban(&self, discord_id: &str) -> Result<BanStatus, StoreError> {
        let row = sqlx::query("SELECT reason, expires_at FROM blacklist WHERE discord_id = ?1")
            .bind(discord_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(query_err("ban lookup"))?;

        let Some(row) = row else {
            return Ok(BanStatus::not_banned());
        };

        let reason: String = row.try_get("reason").map_err(query_err("reason column"))?;
        let expires_at: Option<String> = row
            .try_get("expires_at")
            .map_err(query_err("expires_at column"))?;

        if let Some(raw) = expires_at {
            match parse_time(&raw) {
                Some(at) if at <= Utc::now() => {
                    sqlx::query("DELETE FROM blacklist WHERE discord_id = ?1")
                        .bind(discord_id)
                        .execute(&self.pool)
                        .await
                        .map_err(query_err("lift expired ban"))?;
                    info!(discord_id, "Expired ban lifted");
                    return Ok(BanStatus::not_banned());
                }
                Some(_) => {}
                None => warn!(
                    discord_id,
                    expires_at = %raw,
                    "Unparseable ban expiry, treating as active"
                ),
            }
        }

        Ok(BanStatus::banned(reason))
    }

    async fn ban_user(
        &self,
        discord_id: &str,
        reason: &str,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO blacklist (discord_id, reason, expires_at, created_at)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT(discord_id) DO UPDATE SET
                reason = excluded.reason,
                expires_at = excluded.expires_at
            "#,
        )
        .bind(discord_id)
        .bind(reason)
        .bind(expires_at.map(|t| t.to_rfc3339()))
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(query_err("ban user"))?;
        Ok(())
    }

    async fn unban_user(&self, discord_id: &str) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM blacklist WHERE discord_id = ?1")
            .bind(discord_id)
            .execute(&self.pool)
            .await
            .map_err(query_err("unban user"))?;
        Ok(result.rows_affected() > 0)
    }

    async fn get_or_create_user(
        &self,
        discord_id: &str,
        username: &str,
    ) -> Result<UserRecord, StoreError> {
        let now = Utc::now().to_rfc3339();
        sqlx::query(
            r#"
            INSERT INTO users (discord_id, username, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?3)
            ON CONFLICT(discord_id) DO UPDATE SET
                username = excluded.username,
                updated_at = excluded.updated_at
            WHERE users.username <> excluded.username
            "#,
        )
        .bind(discord_id)
        .bind(username)
        .bind(&now)
        .execute(&self.pool)
        .await
        .map_err(query_err("upsert user"))?;

        let row = sqlx::query("SELECT id, discord_id, username FROM users WHERE discord_id = ?1")
            .bind(discord_id)
            .fetch_one(&self.pool)
            .await
            .map_err(query_err("select user"))?;

        Ok(UserRecord {
            id: row.try_get("id").map_err(query_err("id column"))?,
            discord_id: row.try_get("discord_id").map_err(query_err("discord_id column"))?,
            username: row.try_get("username").map_err(query_err("username column"))?,
        })
    }

    async fn get_memory_summary(&self, user_id: i64) -> Result<Option<String>, StoreError> {
        let row = sqlx::query(
            "SELECT summary FROM memories WHERE user_id = ?1 ORDER BY updated_at DESC LIMIT 1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(query_err("memory lookup"))?;

        match row {
            Some(row) => Ok(row
                .try_get::<Option<String>, _>("summary")
                .map_err(query_err("summary column"))?
                .filter(|s| !s.is_empty())),
            None => Ok(None),
        }
    }

    async fn append_conversation_turn(
        &self,
        user_id: i64,
        channel_id: &str,
        role: Role,
        text: &str,
    ) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO conversations (user_id, channel_id, role, content, created_at) VALUES (?1, ?2, ?3, ?4, ?5)",
        )
        .bind(user_id)
        .bind(channel_id)
        .bind(role.as_str())
        .bind(text)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(query_err("append conversation"))?;
        Ok(())
    }

    async fn recent_conversation(
        &self,
        user_id: i64,
        limit: usize,
    ) -> Result<Vec<ConversationTurn>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT user_id, channel_id, role, content, created_at FROM conversations
            WHERE user_id = ?1 ORDER BY id DESC LIMIT ?2
            "#,
        )
        .bind(user_id)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(query_err("recent conversation"))?;

        let mut turns = Vec::with_capacity(rows.len());
        for row in rows.iter().rev() {
            let role: String = row.try_get("role").map_err(query_err("role column"))?;
            let created_at: String = row
                .try_get("created_at")
                .map_err(query_err("created_at column"))?;
            turns.push(ConversationTurn {
                user_id: row.try_get("user_id").map_err(query_err("user_id column"))?,
                channel_id: row.try_get("channel_id").map_err(query_err("channel_id column"))?,
                role: role.parse().map_err(StoreError::Corrupt)?,
                content: row.try_get("content").map_err(query_err("content column"))?,
                created_at: parse_time(&created_at).unwrap_or_else(Utc::now),
            });
        }
        Ok(turns)
    }

    async fn load_knowledge_entries(
        &self,
        active_only: bool,
    ) -> Result<Vec<KnowledgeEntry>, StoreError> {
        let sql = if active_only {
            "SELECT * FROM knowledge_base WHERE is_active = 1 ORDER BY id"
        } else {
            "SELECT * FROM knowledge_base ORDER BY id"
        };
        let rows = sqlx::query(sql)
            .fetch_all(&self.pool)
            .await
            .map_err(query_err("load knowledge"))?;
        rows.iter().map(Self::row_to_knowledge).collect()
    }

    async fn add_knowledge_entry(
        &self,
        entry: NewKnowledgeEntry,
    ) -> Result<KnowledgeEntry, StoreError> {
        let now = Utc::now().to_rfc3339();
        let result = sqlx::query(
            r#"
            INSERT INTO knowledge_base (title, content, keywords, category, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?5)
            "#,
        )
        .bind(&entry.title)
        .bind(&entry.content)
        .bind(&entry.keywords)
        .bind(&entry.category)
        .bind(&now)
        .execute(&self.pool)
        .await
        .map_err(query_err("insert knowledge"))?;

        Ok(KnowledgeEntry {
            id: result.last_insert_rowid(),
            title: entry.title,
            content: entry.content,
            keywords: entry.keywords,
            category: entry.category,
            embedding: None,
            active: true,
        })
    }

    async fn update_knowledge_embedding(
        &self,
        id: i64,
        embedding: &[f32],
    ) -> Result<(), StoreError> {
        let result = sqlx::query(
            "UPDATE knowledge_base SET embedding = ?1, updated_at = ?2 WHERE id = ?3",
        )
        .bind(embedding_to_blob(embedding))
        .bind(Utc::now().to_rfc3339())
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(query_err("update embedding"))?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!("knowledge entry {id}")));
        }
        Ok(())
    }

    async fn load_sensitive_words(&self) -> Result<Vec<SensitiveWord>, StoreError> {
        let rows = sqlx::query(
            "SELECT id, word, category FROM sensitive_words WHERE is_active = 1 ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(query_err("load sensitive words"))?;

        rows.iter()
            .map(|row| {
                Ok(SensitiveWord {
                    id: row.try_get("id").map_err(query_err("id column"))?,
                    word: row.try_get("word").map_err(query_err("word column"))?,
                    category: row.try_get("category").map_err(query_err("category column"))?,
                })
            })
            .collect()
    }

    async fn add_sensitive_word(
        &self,
        word: &str,
        category: Option<&str>,
    ) -> Result<Option<SensitiveWord>, StoreError> {
        let result = sqlx::query(
            r#"
            INSERT INTO sensitive_words (word, category, created_at) VALUES (?1, ?2, ?3)
            ON CONFLICT(word) DO NOTHING
            "#,
        )
        .bind(word)
        .bind(category)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(query_err("add sensitive word"))?;

        if result.rows_affected() == 0 {
            return Ok(None);
        }
        Ok(Some(SensitiveWord {
            id: result.last_insert_rowid(),
            word: word.to_string(),
            category: category.map(str::to_string),
        }))
    }

    async fn remove_sensitive_word(&self, id: i64) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM sensitive_words WHERE id = ?1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(query_err("remove sensitive word"))?;
        Ok(result.rows_affected() > 0)
    }

    async fn load_provider_pool_config(&self) -> Result<Option<PoolDocument>, StoreError> {
        let row = sqlx::query("SELECT value FROM system_config WHERE key = ?1")
            .bind(POOL_CONFIG_KEY)
            .fetch_optional(&self.pool)
            .await
            .map_err(query_err("load provider pool"))?;

        match row {
            Some(row) => {
                let raw: String = row.try_get("value").map_err(query_err("value column"))?;
                PoolDocument::from_json(&raw).map(Some)
            }
            None => Ok(None),
        }
    }

    async fn save_provider_pool_config(&self, doc: &PoolDocument) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO system_config (key, value, updated_at) VALUES (?1, ?2, ?3)
            ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at
            "#,
        )
        .bind(POOL_CONFIG_KEY)
        .bind(doc.to_json()?)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(query_err("save provider pool"))?;
        Ok(())
    }

    async fn get_bot_profile(&self, bot_id: &str) -> Result<BotProfile, StoreError> {
        let row = sqlx::query(
            "SELECT system_prompt, context_limit, chat_mode FROM bot_config WHERE bot_id = ?1",
        )
        .bind(bot_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(query_err("bot profile lookup"))?;

        let Some(row) = row else {
            return Ok(BotProfile::default());
        };

        let system_prompt: Option<String> = row
            .try_get("system_prompt")
            .map_err(query_err("system_prompt column"))?;
        let context_limit: Option<i64> = row
            .try_get("context_limit")
            .map_err(query_err("context_limit column"))?;
        let chat_mode: Option<String> = row
            .try_get("chat_mode")
            .map_err(query_err("chat_mode column"))?;

        Ok(BotProfile {
            mode: chat_mode
                .as_deref()
                .map(ChatMode::parse_lenient)
                .unwrap_or_default(),
            system_prompt: system_prompt
                .filter(|s| !s.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_PERSONA.to_string()),
            context_limit: context_limit
                .and_then(|n| u32::try_from(n).ok())
                .unwrap_or(DEFAULT_CONTEXT_LIMIT),
        })
    }

    async fn set_bot_profile(&self, bot_id: &str, profile: &BotProfile) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO bot_config (bot_id, system_prompt, context_limit, chat_mode, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            ON CONFLICT(bot_id) DO UPDATE SET
                system_prompt = excluded.system_prompt,
                context_limit = excluded.context_limit,
                chat_mode = excluded.chat_mode,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(bot_id)
        .bind(&profile.system_prompt)
        .bind(profile.context_limit as i64)
        .bind(profile.mode.as_str())
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(query_err("save bot profile"))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use parley_core::ProviderEntry;

    async fn test_store() -> SqliteStore {
        SqliteStore::new("sqlite::memory:").await.unwrap()
    }

    #[tokio::test]
    async fn migrations_are_idempotent() {
        let store = test_store().await;
        store.run_migrations().await.unwrap();
    }

    #[tokio::test]
    async fn user_upsert_keeps_id() {
        let store = test_store().await;
        let a = store.get_or_create_user("100", "alice").await.unwrap();
        let b = store.get_or_create_user("100", "alice_renamed").await.unwrap();
        assert_eq!(a.id, b.id);
        assert_eq!(b.username, "alice_renamed");
        let c = store.get_or_create_user("200", "bob").await.unwrap();
        assert_ne!(a.id, c.id);
    }

    #[tokio::test]
    async fn ban_lifecycle() {
        let store = test_store().await;
        assert!(!store.get_ban("1").await.unwrap().banned);

        store.ban_user("1", "spam", None).await.unwrap();
        assert_eq!(store.get_ban("1").await.unwrap(), BanStatus::banned("spam"));

        store
            .ban_user("1", "spam", Some(Utc::now() - Duration::seconds(5)))
            .await
            .unwrap();
        assert!(!store.get_ban("1").await.unwrap().banned);
        // Lifted on read
        assert!(!store.unban_user("1").await.unwrap());
    }

    #[tokio::test]
    async fn memory_and_conversation() {
        let store = test_store().await;
        let user = store.get_or_create_user("7", "carol").await.unwrap();
        assert!(store.get_memory_summary(user.id).await.unwrap().is_none());

        store.set_memory_summary(user.id, "Likes cats").await.unwrap();
        store.set_memory_summary(user.id, "Likes cats and dogs").await.unwrap();
        assert_eq!(
            store.get_memory_summary(user.id).await.unwrap().as_deref(),
            Some("Likes cats and dogs")
        );

        store.append_conversation_turn(user.id, "chan", Role::User, "hi").await.unwrap();
        store
            .append_conversation_turn(user.id, "chan", Role::Assistant, "hello!")
            .await
            .unwrap();
        let turns = store.recent_conversation(user.id, 10).await.unwrap();
        assert_eq!(turns.len(), 2);
        assert_eq!(turns[0].role, Role::User);
        assert_eq!(turns[1].content, "hello!");
    }

    #[tokio::test]
    async fn knowledge_embeddings_roundtrip() {
        let store = test_store().await;
        let entry = store
            .add_knowledge_entry(NewKnowledgeEntry {
                title: "退款".into(),
                content: "七天无理由退款".into(),
                keywords: "退款,售后".into(),
                category: Some("faq".into()),
            })
            .await
            .unwrap();

        let loaded = store.load_knowledge_entries(true).await.unwrap();
        assert!(loaded[0].embedding.is_none());

        store
            .update_knowledge_embedding(entry.id, &[0.25, -1.5, 3.0])
            .await
            .unwrap();
        let loaded = store.load_knowledge_entries(true).await.unwrap();
        assert_eq!(loaded[0].embedding.as_deref(), Some(&[0.25, -1.5, 3.0][..]));
        assert_eq!(loaded[0].category.as_deref(), Some("faq"));

        assert!(matches!(
            store.update_knowledge_embedding(9999, &[1.0]).await,
            Err(StoreError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn sensitive_words() {
        let store = test_store().await;
        let w = store.add_sensitive_word("casino", Some("ads")).await.unwrap().unwrap();
        assert!(store.add_sensitive_word("casino", None).await.unwrap().is_none());
        assert_eq!(store.load_sensitive_words().await.unwrap().len(), 1);
        assert!(store.remove_sensitive_word(w.id).await.unwrap());
        assert!(store.load_sensitive_words().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn provider_pool_document() {
        let store = test_store().await;
        assert!(store.load_provider_pool_config().await.unwrap().is_none());

        let doc = PoolDocument {
            models: vec![ProviderEntry::new("a", "https://a/v1", "k", "m")],
            retry_count: 4,
            retry_on_error: false,
        };
        store.save_provider_pool_config(&doc).await.unwrap();
        store.save_provider_pool_config(&doc).await.unwrap();
        assert_eq!(store.load_provider_pool_config().await.unwrap(), Some(doc));
    }

    #[tokio::test]
    async fn legacy_pool_document_loads() {
        let store = test_store().await;
        sqlx::query("INSERT INTO system_config (key, value, updated_at) VALUES ('llm_pool', ?1, '')")
            .bind(r#"[{"base_url":"u","api_key":"k","model":"m"}]"#)
            .execute(&store.pool)
            .await
            .unwrap();
        let doc = store.load_provider_pool_config().await.unwrap().unwrap();
        assert_eq!(doc.models.len(), 1);
        assert_eq!(doc.retry_count, 3);
    }

    #[tokio::test]
    async fn bot_profiles() {
        let store = test_store().await;
        assert_eq!(store.get_bot_profile("b").await.unwrap(), BotProfile::default());

        let profile = BotProfile {
            mode: ChatMode::Single,
            system_prompt: "Persona".into(),
            context_limit: 20,
        };
        store.set_bot_profile("b", &profile).await.unwrap();
        assert_eq!(store.get_bot_profile("b").await.unwrap(), profile);

        // Legacy mode strings and blank prompts fall back to defaults
        sqlx::query("UPDATE bot_config SET chat_mode = 'chat', system_prompt = '  ' WHERE bot_id = 'b'")
            .execute(&store.pool)
            .await
            .unwrap();
        let loaded = store.get_bot_profile("b").await.unwrap();
        assert_eq!(loaded.mode, ChatMode::Multi);
        assert_eq!(loaded.system_prompt, DEFAULT_PERSONA);
    }

    #[tokio::test]
    async fn file_database_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("parley.db");
        let path = path.to_string_lossy();
        {
            let store = SqliteStore::new(&path).await.unwrap();
            store.add_sensitive_word("persisted", None).await.unwrap();
        }
        let reopened = SqliteStore::new(&path).await.unwrap();
        assert_eq!(reopened.load_sensitive_words().await.unwrap()[0].word, "persisted");
    }
}
