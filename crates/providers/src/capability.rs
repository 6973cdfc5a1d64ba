//! Capability detection: model name to extra request parameters.

use parley_core::CapabilityHint;

/// Token budget granted to the reasoning phase of extended-reasoning models.
pub const REASONING_BUDGET_TOKENS: u32 = 10_000;

/// Detect model-specific request parameters from the model name.
///
/// Models whose name contains `thinking` (any case) get an extended
/// reasoning budget. Everything else needs nothing extra.
pub fn detect(model: &str) -> Option<CapabilityHint> {
    if model.to_ascii_lowercase().contains("thinking") {
        return Some(CapabilityHint::ExtendedReasoning {
            budget_tokens: REASONING_BUDGET_TOKENS,
        });
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn thinking_models_get_reasoning_budget() {
        assert_eq!(
            detect("claude-3-7-sonnet-thinking"),
            Some(CapabilityHint::ExtendedReasoning { budget_tokens: 10_000 })
        );
        assert!(detect("Gemini-2.5-Flash-Thinking").is_some());
    }

    #[test]
    fn plain_models_get_nothing() {
        assert_eq!(detect("gpt-4o-mini"), None);
        assert_eq!(detect("deepseek-reasoner"), None);
    }
}
