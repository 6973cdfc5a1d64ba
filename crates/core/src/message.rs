//! Chat turn value objects.
//!
//! A request to a completion provider is an ordered list of [`ChatTurn`]s.
//! The serialized shape is the OpenAI chat format, including the multi-part
//! content array used for image input.

use serde::{Deserialize, Serialize};

/// The role of a turn's author.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Instructions assembled by the bot
    System,
    /// A human participant
    User,
    /// The model
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "system" => Ok(Role::System),
            "user" => Ok(Role::User),
            "assistant" => Ok(Role::Assistant),
            other => Err(format!("unknown role: {other}")),
        }
    }
}

/// An image reference inside a multi-part turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageUrl {
    pub url: String,
}

/// One part of a multi-part turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
}

/// Turn content: plain text, or text plus image parts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TurnContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

impl TurnContent {
    /// The textual portion of the content. Image parts are skipped.
    pub fn text(&self) -> String {
        match self {
            TurnContent::Text(t) => t.clone(),
            TurnContent::Parts(parts) => parts
                .iter()
                .filter_map(|p| match p {
                    ContentPart::Text { text } => Some(text.as_str()),
                    ContentPart::ImageUrl { .. } => None,
                })
                .collect::<Vec<_>>()
                .join("\n"),
        }
    }
}

/// A single turn in the prompt sent to a provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatTurn {
    pub role: Role,
    pub content: TurnContent,
}

impl ChatTurn {
    /// Create a system turn.
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: TurnContent::Text(content.into()),
        }
    }

    /// Create a plain-text user turn.
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: TurnContent::Text(content.into()),
        }
    }

    /// Create an assistant turn.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: TurnContent::Text(content.into()),
        }
    }

    /// Create a user turn carrying text and one part per image URL.
    ///
    /// With no images this degrades to a plain-text turn.
    pub fn user_with_images(text: impl Into<String>, image_urls: &[String]) -> Self {
        let text = text.into();
        if image_urls.is_empty() {
            return Self::user(text);
        }
        let mut parts = Vec::with_capacity(image_urls.len() + 1);
        parts.push(ContentPart::Text { text });
        parts.extend(image_urls.iter().map(|url| ContentPart::ImageUrl {
            image_url: ImageUrl { url: url.clone() },
        }));
        Self {
            role: Role::User,
            content: TurnContent::Parts(parts),
        }
    }

    /// Plain text of this turn, see [`TurnContent::text`].
    pub fn text(&self) -> String {
        self.content.text()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_turn_serializes_as_string_content() {
        let json = serde_json::to_value(ChatTurn::user("hi")).unwrap();
        assert_eq!(json, serde_json::json!({"role": "user", "content": "hi"}));
    }

    #[test]
    fn image_turn_serializes_as_parts() {
        let turn = ChatTurn::user_with_images("look", &["https://x/cat.png".to_string()]);
        let json = serde_json::to_value(&turn).unwrap();
        assert_eq!(
            json["content"],
            serde_json::json!([
                {"type": "text", "text": "look"},
                {"type": "image_url", "image_url": {"url": "https://x/cat.png"}}
            ])
        );
    }

    #[test]
    fn no_images_gives_plain_turn() {
        let turn = ChatTurn::user_with_images("plain", &[]);
        assert_eq!(turn.content, TurnContent::Text("plain".into()));
    }

    #[test]
    fn parts_text_skips_images() {
        let turn = ChatTurn::user_with_images("caption", &["u1".into(), "u2".into()]);
        assert_eq!(turn.text(), "caption");
    }

    #[test]
    fn role_roundtrips_through_str() {
        for role in [Role::System, Role::User, Role::Assistant] {
            assert_eq!(role.as_str().parse::<Role>().unwrap(), role);
        }
        assert!("tool".parse::<Role>().is_err());
    }
}
