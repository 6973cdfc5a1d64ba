//! Process-wide collaborators, built once from configuration.

use parley_chat::{ChatOrchestrator, ChatSettings};
use parley_config::AppConfig;
use parley_core::{EmbeddingProvider, RecordStore, StoreError};
use parley_knowledge::KnowledgeRetriever;
use parley_providers::{OpenAiCompatEmbedder, OpenAiCompatFactory, ProviderFactory, ProviderPool};
use parley_security::SafetyFilter;
use parley_store::SqliteStore;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

#[derive(Debug, thiserror::Error)]
pub enum ServicesError {
    #[error("Failed to prepare database directory {path}: {reason}")]
    DatabaseDir { path: String, reason: String },

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// The shared pipeline components.
#[derive(Clone)]
pub struct Services {
    pub store: Arc<dyn RecordStore>,
    pub filter: Arc<SafetyFilter>,
    pub retriever: Arc<KnowledgeRetriever>,
    pub pool: Arc<ProviderPool>,
    pub orchestrator: ChatOrchestrator,
}

impl Services {
    /// Open the SQLite store named in `config` and wire everything to it.
    pub async fn from_config(config: &AppConfig) -> Result<Self, ServicesError> {
        let path = &config.database.path;
        if !path.contains(":memory:") {
            if let Some(dir) = std::path::Path::new(path).parent() {
                std::fs::create_dir_all(dir).map_err(|e| ServicesError::DatabaseDir {
                    path: dir.display().to_string(),
                    reason: e.to_string(),
                })?;
            }
        }
        let store: Arc<dyn RecordStore> = Arc::new(SqliteStore::new(path).await?);
        Ok(Self::with_store(
            config,
            store,
            Arc::new(OpenAiCompatFactory::new()),
        ))
    }

    /// Wire the pipeline around an existing store and provider factory.
    pub fn with_store(
        config: &AppConfig,
        store: Arc<dyn RecordStore>,
        factory: Arc<dyn ProviderFactory>,
    ) -> Self {
        let embedder: Option<Arc<dyn EmbeddingProvider>> =
            config.embedding_endpoint().map(|ep| {
                info!(model = %ep.model, "Semantic retrieval enabled");
                Arc::new(OpenAiCompatEmbedder::new(ep.base_url, ep.api_key, ep.model))
                    as Arc<dyn EmbeddingProvider>
            });

        let refresh = Duration::from_secs(config.database.refresh_secs);
        let filter = Arc::new(SafetyFilter::new(store.clone()).with_refresh_interval(refresh));
        let retriever = Arc::new(KnowledgeRetriever::new(store.clone(), embedder));
        let pool = Arc::new(ProviderPool::new(config.llm.primary_entry()));

        let settings = ChatSettings {
            default_bot_id: config.bot.default_id.clone(),
            retrieval_limit: config.retrieval.limit,
            max_passage_length: config.retrieval.max_passage_length,
            max_tokens: config.llm.max_tokens,
            stream: config.llm.stream,
            attempt_timeout: Duration::from_secs(config.llm.attempt_timeout_secs),
            pool_refresh: refresh,
        };
        let orchestrator = ChatOrchestrator::new(
            store.clone(),
            filter.clone(),
            retriever.clone(),
            pool.clone(),
            factory,
        )
        .with_settings(settings);

        Self {
            store,
            filter,
            retriever,
            pool,
            orchestrator,
        }
    }
}
