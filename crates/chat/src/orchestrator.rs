//! The chat orchestration pipeline.
//!
//! One request flows through:
//!
//! ```text
//! ban check → SafetyFilter → (Blocked | retrieval + profile)
//!   → PromptAssembler → dispatch loop over ProviderPool → persist
//! ```
//!
//! Events go out through a bounded channel of capacity 1, so a slow
//! consumer throttles generation. Dropping the receiver cancels the
//! in-flight attempt and nothing is persisted.

use crate::prompt::{PromptAssembler, PromptInput};
use crate::request::{ChatOutcome, ChatRequest};
use parley_core::{
    BotProfile, ChatTurn, Provider, ProviderError, ProviderRequest, RecordStore, Role,
    StreamEvent, Usage, UserRecord,
};
use parley_knowledge::KnowledgeRetriever;
use parley_providers::{capability, ProviderFactory, ProviderPool};
use parley_security::{FilterVerdict, SafetyFilter};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{timeout_at, Instant};
use tracing::{debug, info, warn};

const DEFAULT_BAN_REASON: &str = "You have been banned from this service";

/// Tunables for the pipeline.
#[derive(Debug, Clone)]
pub struct ChatSettings {
    /// Bot profile used when a request names none.
    pub default_bot_id: String,
    pub retrieval_limit: usize,
    pub max_passage_length: usize,
    pub max_tokens: u32,
    /// Ask providers for incremental output.
    pub stream: bool,
    /// Deadline for a single provider attempt.
    pub attempt_timeout: Duration,
    /// Maximum age of the in-memory provider pool before it is re-read.
    pub pool_refresh: Duration,
}

impl Default for ChatSettings {
    fn default() -> Self {
        Self {
            default_bot_id: "default".into(),
            retrieval_limit: 3,
            max_passage_length: 500,
            max_tokens: 16_000,
            stream: true,
            attempt_timeout: Duration::from_secs(120),
            pool_refresh: Duration::from_secs(30),
        }
    }
}

/// How one provider attempt ended.
enum Attempt {
    Completed {
        text: String,
        usage: Option<Usage>,
    },
    Failed(String),
    Cancelled,
}

/// Coordinates screening, retrieval, prompt assembly and dispatch.
///
/// Cheap to clone; all collaborators are shared.
#[derive(Clone)]
pub struct ChatOrchestrator {
    store: Arc<dyn RecordStore>,
    filter: Arc<SafetyFilter>,
    retriever: Arc<KnowledgeRetriever>,
    pool: Arc<ProviderPool>,
    factory: Arc<dyn ProviderFactory>,
    settings: ChatSettings,
}

impl ChatOrchestrator {
    pub fn new(
        store: Arc<dyn RecordStore>,
        filter: Arc<SafetyFilter>,
        retriever: Arc<KnowledgeRetriever>,
        pool: Arc<ProviderPool>,
        factory: Arc<dyn ProviderFactory>,
    ) -> Self {
        Self {
            store,
            filter,
            retriever,
            pool,
            factory,
            settings: ChatSettings::default(),
        }
    }

    pub fn with_settings(mut self, settings: ChatSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn settings(&self) -> &ChatSettings {
        &self.settings
    }

    pub fn pool(&self) -> &Arc<ProviderPool> {
        &self.pool
    }

    pub fn filter(&self) -> &Arc<SafetyFilter> {
        &self.filter
    }

    /// Start handling `request`, returning the event stream.
    ///
    /// The stream ends after exactly one terminal event (`Blocked` or
    /// `Error`) or after the closing `Stats`.
    pub fn handle(&self, request: ChatRequest) -> mpsc::Receiver<StreamEvent> {
        self.spawn(request, self.settings.stream)
    }

    /// Handle `request` without incremental output and collect the result.
    pub async fn chat_once(&self, request: ChatRequest) -> ChatOutcome {
        let mut rx = self.spawn(request, false);
        let mut response = String::new();
        while let Some(event) = rx.recv().await {
            match event {
                StreamEvent::Content(text) => response.push_str(&text),
                StreamEvent::Stats { .. } => {}
                StreamEvent::Blocked(reason) => return ChatOutcome::blocked(reason),
                StreamEvent::Error(message) => return ChatOutcome::failed(message),
            }
        }
        ChatOutcome::answered(response)
    }

    fn spawn(&self, request: ChatRequest, stream: bool) -> mpsc::Receiver<StreamEvent> {
        let (tx, rx) = mpsc::channel(1);
        let this = self.clone();
        tokio::spawn(async move {
            this.run(request, stream, tx).await;
        });
        rx
    }

    async fn run(&self, request: ChatRequest, stream: bool, tx: mpsc::Sender<StreamEvent>) {
        info!(
            discord_id = %request.discord_id,
            channel_id = %request.channel_id,
            "Handling chat request"
        );

        if let Some(reason) = self.screen(&request).await {
            info!(discord_id = %request.discord_id, %reason, "Request blocked");
            let _ = tx.send(StreamEvent::Blocked(reason)).await;
            return;
        }

        let user = self.lookup_user(&request).await;
        let turns = self.assemble(&request, user.as_ref()).await;

        self.pool
            .refresh(self.store.as_ref(), self.settings.pool_refresh)
            .await;
        let attempts = self.pool.attempt_budget();
        let mut last_error: Option<String> = None;

        for attempt in 1..=attempts {
            let entry = match self.pool.select_next() {
                Ok(entry) => entry,
                Err(e) => {
                    warn!(error = %e, "No provider available");
                    let _ = tx.send(StreamEvent::Error(e.to_string())).await;
                    return;
                }
            };
            self.persist_pool_counters();

            info!(
                attempt,
                attempts,
                provider = %entry.label(),
                endpoint = %entry.base_url,
                model = %entry.model,
                stream,
                "Dispatching to provider"
            );

            let request_body = ProviderRequest {
                model: entry.model.clone(),
                messages: turns.clone(),
                max_tokens: Some(self.settings.max_tokens),
                stream,
                capability: capability::detect(&entry.model),
            };
            let provider = self.factory.build(&entry);

            match self.attempt(provider, request_body, &tx).await {
                Attempt::Completed { text, usage } => {
                    debug!(chars = text.chars().count(), "Provider attempt completed");
                    if !text.is_empty() {
                        self.persist_exchange(&request, user.as_ref(), &text).await;
                    }
                    let usage = usage.unwrap_or_default();
                    let _ = tx
                        .send(StreamEvent::Stats {
                            input_tokens: usage.prompt_tokens,
                            output_tokens: usage.completion_tokens,
                        })
                        .await;
                    return;
                }
                Attempt::Failed(message) => {
                    warn!(
                        attempt,
                        provider = %entry.label(),
                        error = %message,
                        "Provider attempt failed"
                    );
                    last_error = Some(message);
                }
                Attempt::Cancelled => {
                    info!(provider = %entry.label(), "Consumer went away, abandoning request");
                    return;
                }
            }
        }

        let message = last_error.unwrap_or_else(|| "no provider attempt was made".into());
        let _ = tx.send(StreamEvent::Error(message)).await;
    }

    /// Ban list first, then content screening. Returns the block reason.
    async fn screen(&self, request: &ChatRequest) -> Option<String> {
        match self.store.get_ban(&request.discord_id).await {
            Ok(status) if status.banned => {
                let reason = status
                    .reason
                    .filter(|r| !r.trim().is_empty())
                    .unwrap_or_else(|| DEFAULT_BAN_REASON.to_string());
                return Some(reason);
            }
            Ok(_) => {}
            Err(e) => warn!(error = %e, "Ban lookup failed, continuing"),
        }

        match self.filter.check(&request.message).await {
            FilterVerdict::Allowed => None,
            FilterVerdict::Rejected(reason) => Some(reason),
        }
    }

    async fn lookup_user(&self, request: &ChatRequest) -> Option<UserRecord> {
        match self
            .store
            .get_or_create_user(&request.discord_id, &request.username)
            .await
        {
            Ok(user) => Some(user),
            Err(e) => {
                warn!(error = %e, "User lookup failed, history will not be saved");
                None
            }
        }
    }

    async fn assemble(&self, request: &ChatRequest, user: Option<&UserRecord>) -> Vec<ChatTurn> {
        let memory = match user {
            Some(user) => self
                .store
                .get_memory_summary(user.id)
                .await
                .unwrap_or_else(|e| {
                    warn!(error = %e, "Memory lookup failed");
                    None
                }),
            None => None,
        };

        let passages = self
            .retriever
            .search(
                &request.message,
                self.settings.retrieval_limit,
                self.settings.max_passage_length,
            )
            .await;
        debug!(passages = passages.len(), "Knowledge retrieved");

        let bot_id = request
            .bot_id
            .as_deref()
            .unwrap_or(&self.settings.default_bot_id);
        let profile = self.store.get_bot_profile(bot_id).await.unwrap_or_else(|e| {
            warn!(bot_id, error = %e, "Bot profile lookup failed, using defaults");
            BotProfile::default()
        });

        PromptAssembler::build(&PromptInput {
            user_message: &request.message,
            history: &request.context_messages,
            pinned: &request.pinned_messages,
            reply_context: request.reply_content.as_deref(),
            memory_summary: memory.as_deref(),
            passages: &passages,
            emoji_hints: request.guild_emojis.as_deref(),
            image_urls: &request.image_urls,
            mode: profile.mode,
            persona: &profile.system_prompt,
        })
    }

    /// Flush request counters in the background.
    fn persist_pool_counters(&self) {
        let pool = Arc::clone(&self.pool);
        let store = Arc::clone(&self.store);
        tokio::spawn(async move {
            if let Err(e) = pool.save_if_dirty(store.as_ref()).await {
                warn!(error = %e, "Failed to persist provider pool counters");
            }
        });
    }

    async fn persist_exchange(
        &self,
        request: &ChatRequest,
        user: Option<&UserRecord>,
        reply: &str,
    ) {
        let Some(user) = user else {
            return;
        };
        for (role, text) in [(Role::User, request.message.as_str()), (Role::Assistant, reply)] {
            if let Err(e) = self
                .store
                .append_conversation_turn(user.id, &request.channel_id, role, text)
                .await
            {
                warn!(error = %e, "Failed to save conversation turn");
                return;
            }
        }
    }

    async fn attempt(
        &self,
        provider: Arc<dyn Provider>,
        request: ProviderRequest,
        tx: &mpsc::Sender<StreamEvent>,
    ) -> Attempt {
        let deadline = Instant::now() + self.settings.attempt_timeout;
        let timed_out = || {
            let e = ProviderError::Timeout(format!(
                "{} gave no answer within {}s",
                provider.name(),
                self.settings.attempt_timeout.as_secs()
            ));
            Attempt::Failed(e.to_string())
        };

        if !request.stream {
            let response = tokio::select! {
                _ = tx.closed() => return Attempt::Cancelled,
                res = timeout_at(deadline, provider.complete(request)) => res,
            };
            return match response {
                Err(_) => timed_out(),
                Ok(Err(e)) => Attempt::Failed(e.to_string()),
                Ok(Ok(response)) => {
                    if !response.content.is_empty()
                        && tx
                            .send(StreamEvent::Content(response.content.clone()))
                            .await
                            .is_err()
                    {
                        return Attempt::Cancelled;
                    }
                    Attempt::Completed {
                        text: response.content,
                        usage: response.usage,
                    }
                }
            };
        }

        let opened = tokio::select! {
            _ = tx.closed() => return Attempt::Cancelled,
            res = timeout_at(deadline, provider.stream(request)) => res,
        };
        let mut chunks = match opened {
            Err(_) => return timed_out(),
            Ok(Err(e)) => return Attempt::Failed(e.to_string()),
            Ok(Ok(chunks)) => chunks,
        };

        let mut text = String::new();
        let mut usage = None;
        loop {
            let next = tokio::select! {
                _ = tx.closed() => return Attempt::Cancelled,
                res = timeout_at(deadline, chunks.recv()) => res,
            };
            let chunk = match next {
                Err(_) => return timed_out(),
                Ok(None) => break,
                Ok(Some(Err(e))) => return Attempt::Failed(e.to_string()),
                Ok(Some(Ok(chunk))) => chunk,
            };

            if chunk.usage.is_some() {
                usage = chunk.usage;
            }
            if let Some(content) = chunk.content.filter(|c| !c.is_empty()) {
                text.push_str(&content);
                if tx.send(StreamEvent::Content(content)).await.is_err() {
                    return Attempt::Cancelled;
                }
            }
            if chunk.done {
                break;
            }
        }

        Attempt::Completed { text, usage }
    }
}
