//! Inbound chat requests and collected outcomes.

use parley_core::ChatTurn;
use serde::{Deserialize, Serialize};

/// One inbound message plus the client-side context that came with it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRequest {
    /// Bot profile to answer as. Falls back to the configured default.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bot_id: Option<String>,
    pub discord_id: String,
    pub username: String,
    pub channel_id: String,
    pub message: String,
    /// Recent channel history, oldest first. In multi-user channels user
    /// turns from other people carry a leading `[name]` tag.
    #[serde(default)]
    pub context_messages: Vec<ChatTurn>,
    #[serde(default)]
    pub pinned_messages: Vec<String>,
    /// Text of the message being replied to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply_content: Option<String>,
    #[serde(default)]
    pub image_urls: Vec<String>,
    /// Preformatted list of custom emojis available in the guild.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub guild_emojis: Option<String>,
}

impl ChatRequest {
    pub fn new(
        discord_id: impl Into<String>,
        username: impl Into<String>,
        channel_id: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            bot_id: None,
            discord_id: discord_id.into(),
            username: username.into(),
            channel_id: channel_id.into(),
            message: message.into(),
            context_messages: Vec::new(),
            pinned_messages: Vec::new(),
            reply_content: None,
            image_urls: Vec::new(),
            guild_emojis: None,
        }
    }
}

/// The collected result of a non-streaming chat.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatOutcome {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_blocked: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub block_reason: Option<String>,
}

impl ChatOutcome {
    pub fn answered(response: String) -> Self {
        Self {
            success: true,
            response: Some(response),
            ..Default::default()
        }
    }

    pub fn blocked(reason: String) -> Self {
        Self {
            success: false,
            is_blocked: Some(true),
            block_reason: Some(reason),
            ..Default::default()
        }
    }

    pub fn failed(error: String) -> Self {
        Self {
            success: false,
            error: Some(error),
            ..Default::default()
        }
    }
}
