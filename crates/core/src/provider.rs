//! Provider traits: the abstraction over completion and embedding backends.
//!
//! A [`Provider`] sends an ordered list of chat turns to a model and returns
//! either one complete response or a stream of text increments. An
//! [`EmbeddingProvider`] turns text into a fixed-length vector.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ProviderError;
use crate::message::ChatTurn;

/// Extra request parameters some model families need.
///
/// Built by a capability-detection function from the model name and merged
/// into the request body by the provider implementation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CapabilityHint {
    /// The model runs a visible reasoning phase with its own token budget.
    ExtendedReasoning { budget_tokens: u32 },
}

impl CapabilityHint {
    /// Extra top-level body fields for an OpenAI-compatible request.
    pub fn extra_body(&self) -> serde_json::Map<String, serde_json::Value> {
        let mut extra = serde_json::Map::new();
        match self {
            CapabilityHint::ExtendedReasoning { budget_tokens } => {
                extra.insert(
                    "thinking".into(),
                    serde_json::json!({ "type": "enabled", "budget_tokens": budget_tokens }),
                );
            }
        }
        extra
    }
}

/// Configuration for a provider request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderRequest {
    /// The model to use (e.g., "gpt-4o", "deepseek-chat")
    pub model: String,

    /// The prompt, system turn first
    pub messages: Vec<ChatTurn>,

    /// Maximum tokens to generate
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,

    /// Whether to stream the response
    #[serde(default)]
    pub stream: bool,

    /// Model-specific extra parameters
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capability: Option<CapabilityHint>,
}

/// A complete (non-streaming) response from a provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderResponse {
    /// The generated text
    pub content: String,

    /// Token usage statistics
    pub usage: Option<Usage>,

    /// Which model actually responded (may differ from requested)
    pub model: String,
}

/// Token usage information.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// A single chunk in a streaming response.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StreamChunk {
    /// Partial content delta
    #[serde(default)]
    pub content: Option<String>,

    /// Whether this is the final chunk
    #[serde(default)]
    pub done: bool,

    /// Usage info (typically only in the final chunk)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
}

/// The completion Provider trait.
///
/// Each configured backend endpoint implements this trait. The orchestrator
/// calls `complete()` or `stream()` without knowing which backend it holds.
#[async_trait]
pub trait Provider: Send + Sync {
    /// A human-readable name for this provider (e.g., "deepseek", "primary").
    fn name(&self) -> &str;

    /// Send a request and get a complete response.
    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError>;

    /// Send a request and get a stream of response chunks.
    ///
    /// Default implementation calls `complete()` and wraps the result as a single chunk.
    async fn stream(
        &self,
        request: ProviderRequest,
    ) -> Result<tokio::sync::mpsc::Receiver<Result<StreamChunk, ProviderError>>, ProviderError>
    {
        let response = self.complete(request).await?;
        let (tx, rx) = tokio::sync::mpsc::channel(1);
        let _ = tx
            .send(Ok(StreamChunk {
                content: Some(response.content),
                done: true,
                usage: response.usage,
            }))
            .await;
        Ok(rx)
    }
}

/// Turns text into a fixed-length vector for similarity search.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    fn name(&self) -> &str;

    async fn embed(&self, text: &str) -> Result<Vec<f32>, ProviderError>;
}
