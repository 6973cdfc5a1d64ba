//! Prompt assembly.
//!
//! Produces the ordered turn list for one request:
//!
//! 1. One system turn: persona, mode instruction, memory summary, retrieved
//!    passages, pinned messages, emoji hint. Empty sections are left out.
//! 2. History, filtered by [`ChatMode`].
//! 3. The user's message, prefixed with the replied-to text and carrying
//!    any images as extra parts.
//!
//! Assembly is deterministic and never fails.

use parley_core::{ChatMode, ChatTurn, RetrievedPassage, Role};

const SECTION_SEPARATOR: &str = "\n\n";
const PASSAGE_SEPARATOR: &str = "\n---\n";

const QA_INSTRUCTION: &str = "[Q&A mode] Answer only the current question. \
Do not rely on any earlier conversation.";
const SINGLE_INSTRUCTION: &str = "[Single-user chat] You are talking with one user. \
Every message in the history comes from that same person.";
const MULTI_INSTRUCTION: &str = "[Multi-user chat] Several people are talking in this channel \
and each of their messages starts with a [username] tag. Keep the speakers apart and reply \
to the user who mentioned or replied to you.";

/// Everything the assembler needs for one request.
#[derive(Debug, Clone, Copy)]
pub struct PromptInput<'a> {
    pub user_message: &'a str,
    pub history: &'a [ChatTurn],
    pub pinned: &'a [String],
    pub reply_context: Option<&'a str>,
    pub memory_summary: Option<&'a str>,
    pub passages: &'a [RetrievedPassage],
    pub emoji_hints: Option<&'a str>,
    pub image_urls: &'a [String],
    pub mode: ChatMode,
    pub persona: &'a str,
}

/// Stateless prompt builder.
pub struct PromptAssembler;

impl PromptAssembler {
    pub fn build(input: &PromptInput<'_>) -> Vec<ChatTurn> {
        let mut turns = Vec::with_capacity(input.history.len() + 2);
        turns.push(ChatTurn::system(Self::system_prompt(input)));
        turns.extend(Self::history(input.history, input.mode).cloned());
        turns.push(ChatTurn::user_with_images(
            Self::user_text(input.user_message, input.reply_context),
            input.image_urls,
        ));
        turns
    }

    fn system_prompt(input: &PromptInput<'_>) -> String {
        let mut sections: Vec<String> = Vec::with_capacity(6);

        if !input.persona.trim().is_empty() {
            sections.push(input.persona.trim_end().to_string());
        }

        sections.push(
            match input.mode {
                ChatMode::Qa => QA_INSTRUCTION,
                ChatMode::Single => SINGLE_INSTRUCTION,
                ChatMode::Multi => MULTI_INSTRUCTION,
            }
            .to_string(),
        );

        if let Some(memory) = non_blank(input.memory_summary) {
            sections.push(format!("What you remember about the current user:\n{memory}"));
        }

        if !input.passages.is_empty() {
            let joined = input
                .passages
                .iter()
                .map(format_passage)
                .collect::<Vec<_>>()
                .join(PASSAGE_SEPARATOR);
            sections.push(format!("Relevant reference material:\n{joined}"));
        }

        let pinned: Vec<&str> = input
            .pinned
            .iter()
            .map(|p| p.trim())
            .filter(|p| !p.is_empty())
            .collect();
        if !pinned.is_empty() {
            sections.push(format!(
                "Pinned messages in this channel (usable as reference):\n{}",
                pinned.join("\n")
            ));
        }

        if let Some(emojis) = non_blank(input.emoji_hints) {
            sections.push(format!(
                "{emojis}\nYou may use these emojis in your reply, written as :name:"
            ));
        }

        sections.join(SECTION_SEPARATOR)
    }

    fn history(history: &[ChatTurn], mode: ChatMode) -> impl Iterator<Item = &ChatTurn> {
        history.iter().filter(move |turn| match (mode, turn.role) {
            (_, Role::System) => false,
            (ChatMode::Qa, _) => false,
            (ChatMode::Single, Role::User) => !turn.text().starts_with('['),
            _ => true,
        })
    }

    fn user_text(message: &str, reply_context: Option<&str>) -> String {
        match non_blank(reply_context) {
            Some(reply) => format!("[Replying to: {reply}]\n{message}"),
            None => message.to_string(),
        }
    }
}

fn format_passage(passage: &RetrievedPassage) -> String {
    format!("[{}]\n{}", passage.title, passage.body)
}

fn non_blank(s: Option<&str>) -> Option<&str> {
    s.map(str::trim).filter(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use parley_core::TurnContent;

    fn input<'a>(mode: ChatMode, history: &'a [ChatTurn]) -> PromptInput<'a> {
        PromptInput {
            user_message: "What now?",
            history,
            pinned: &[],
            reply_context: None,
            memory_summary: None,
            passages: &[],
            emoji_hints: None,
            image_urls: &[],
            mode,
            persona: "You are Pip.",
        }
    }

    fn sample_history() -> Vec<ChatTurn> {
        vec![
            ChatTurn::system("injected"),
            ChatTurn::user("[bob] hi all"),
            ChatTurn::user("my own question"),
            ChatTurn::assistant("an answer"),
        ]
    }

    fn passage(title: &str, body: &str) -> RetrievedPassage {
        RetrievedPassage {
            id: 1,
            title: title.into(),
            body: body.into(),
            score: 0.9,
            truncated: false,
        }
    }

    #[test]
    fn qa_mode_drops_history() {
        let history = sample_history();
        let turns = PromptAssembler::build(&input(ChatMode::Qa, &history));
        assert_eq!(turns.len(), 2);
        assert_eq!(turns[0].role, Role::System);
        assert!(turns[0].text().contains("[Q&A mode]"));
        assert_eq!(turns[1], ChatTurn::user("What now?"));
    }

    #[test]
    fn single_mode_skips_tagged_speakers() {
        let history = sample_history();
        let turns = PromptAssembler::build(&input(ChatMode::Single, &history));
        let texts: Vec<String> = turns.iter().skip(1).map(ChatTurn::text).collect();
        assert_eq!(texts, ["my own question", "an answer", "What now?"]);
    }

    #[test]
    fn multi_mode_keeps_all_non_system_history() {
        let history = sample_history();
        let turns = PromptAssembler::build(&input(ChatMode::Multi, &history));
        assert_eq!(turns.len(), 5);
        assert!(turns[0].text().contains("[username]"));
        assert_eq!(turns.iter().filter(|t| t.role == Role::System).count(), 1);
        assert_eq!(turns[1].text(), "[bob] hi all");
    }

    #[test]
    fn system_sections_in_order() {
        let passages = [passage("Refunds", "Within 7 days."), passage("Shipping", "2 days.")];
        let pinned = ["Rule 1: be nice".to_string(), "  ".to_string()];
        let turns = PromptAssembler::build(&PromptInput {
            pinned: &pinned,
            memory_summary: Some("Prefers short answers"),
            passages: &passages,
            emoji_hints: Some(":wave: :party:"),
            ..input(ChatMode::Multi, &[])
        });
        let system = turns[0].text();

        let order = [
            "You are Pip.",
            "[Multi-user chat]",
            "Prefers short answers",
            "[Refunds]\nWithin 7 days.\n---\n[Shipping]\n2 days.",
            "Rule 1: be nice",
            ":wave: :party:",
        ];
        let positions: Vec<usize> = order
            .iter()
            .map(|needle| system.find(needle).unwrap_or_else(|| panic!("missing {needle}")))
            .collect();
        assert!(positions.windows(2).all(|w| w[0] < w[1]), "{system}");
    }

    #[test]
    fn empty_sections_are_omitted() {
        let turns = PromptAssembler::build(&PromptInput {
            memory_summary: Some("   "),
            emoji_hints: Some(""),
            ..input(ChatMode::Single, &[])
        });
        let system = turns[0].text();
        assert_eq!(system, format!("You are Pip.\n\n{SINGLE_INSTRUCTION}"));
    }

    #[test]
    fn reply_context_prefixes_user_turn() {
        let turns = PromptAssembler::build(&PromptInput {
            reply_context: Some("the earlier message"),
            ..input(ChatMode::Qa, &[])
        });
        assert_eq!(
            turns[1].text(),
            "[Replying to: the earlier message]\nWhat now?"
        );
    }

    #[test]
    fn images_make_a_multipart_user_turn() {
        let urls = vec!["https://img/a.png".to_string(), "https://img/b.png".to_string()];
        let turns = PromptAssembler::build(&PromptInput {
            image_urls: &urls,
            ..input(ChatMode::Qa, &[])
        });
        match &turns[1].content {
            TurnContent::Parts(parts) => assert_eq!(parts.len(), 3),
            other => panic!("expected parts, got {other:?}"),
        }
        assert_eq!(turns[1].text(), "What now?");

        let plain = PromptAssembler::build(&input(ChatMode::Qa, &[]));
        assert_eq!(plain[1], ChatTurn::user("What now?"));
    }
}
