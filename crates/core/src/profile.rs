//! Per-bot and per-user records read by the chat pipeline.

use serde::{Deserialize, Serialize};

/// Default persona used when a bot has no stored system prompt.
pub const DEFAULT_PERSONA: &str = "You are a friendly, helpful assistant in a group chat. \
Answer clearly and concisely, and match the language the user writes in.";

/// Default number of history messages the client should send along.
pub const DEFAULT_CONTEXT_LIMIT: u32 = 10;

/// How conversation history is folded into the prompt.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatMode {
    /// Everyone in the channel shares one context; speakers are `[name]`-prefixed.
    #[default]
    Multi,
    /// Only the requesting user's exchange with the bot.
    Single,
    /// No history at all; every question stands alone.
    Qa,
}

impl ChatMode {
    /// Parse a stored mode string. Unknown and legacy values map to `Multi`.
    pub fn parse_lenient(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "single" => ChatMode::Single,
            "qa" => ChatMode::Qa,
            _ => ChatMode::Multi,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ChatMode::Multi => "multi",
            ChatMode::Single => "single",
            ChatMode::Qa => "qa",
        }
    }
}

impl std::fmt::Display for ChatMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A bot's conversation settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BotProfile {
    pub mode: ChatMode,
    pub system_prompt: String,
    pub context_limit: u32,
}

impl Default for BotProfile {
    fn default() -> Self {
        Self {
            mode: ChatMode::Multi,
            system_prompt: DEFAULT_PERSONA.to_string(),
            context_limit: DEFAULT_CONTEXT_LIMIT,
        }
    }
}

/// Result of a ban lookup.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BanStatus {
    pub banned: bool,
    pub reason: Option<String>,
}

impl BanStatus {
    pub fn not_banned() -> Self {
        Self::default()
    }

    pub fn banned(reason: impl Into<String>) -> Self {
        Self {
            banned: true,
            reason: Some(reason.into()),
        }
    }
}

/// A chat participant known to the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRecord {
    pub id: i64,
    pub discord_id: String,
    pub username: String,
}

/// One denylist term.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SensitiveWord {
    pub id: i64,
    pub word: String,
    #[serde(default)]
    pub category: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lenient_mode_parsing() {
        assert_eq!(ChatMode::parse_lenient("qa"), ChatMode::Qa);
        assert_eq!(ChatMode::parse_lenient(" Single "), ChatMode::Single);
        assert_eq!(ChatMode::parse_lenient("multi"), ChatMode::Multi);
        assert_eq!(ChatMode::parse_lenient("chat"), ChatMode::Multi);
        assert_eq!(ChatMode::parse_lenient(""), ChatMode::Multi);
    }

    #[test]
    fn default_profile() {
        let profile = BotProfile::default();
        assert_eq!(profile.mode, ChatMode::Multi);
        assert_eq!(profile.context_limit, 10);
        assert!(!profile.system_prompt.is_empty());
    }
}
