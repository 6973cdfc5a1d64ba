//! Builds live providers from pool entries.

use std::sync::Arc;

use parley_core::{Provider, ProviderEntry};

use crate::openai_compat::OpenAiCompatProvider;

/// Turns a [`ProviderEntry`] into something that can serve requests.
///
/// The orchestrator goes through this seam so tests can hand out scripted
/// providers instead of HTTP clients.
pub trait ProviderFactory: Send + Sync {
    fn build(&self, entry: &ProviderEntry) -> Arc<dyn Provider>;
}

/// Builds [`OpenAiCompatProvider`]s that share one connection pool.
#[derive(Clone, Default)]
pub struct OpenAiCompatFactory {
    client: reqwest::Client,
}

impl OpenAiCompatFactory {
    pub fn new() -> Self {
        Self {
            client: crate::openai_compat::default_client(),
        }
    }
}

impl ProviderFactory for OpenAiCompatFactory {
    fn build(&self, entry: &ProviderEntry) -> Arc<dyn Provider> {
        Arc::new(OpenAiCompatProvider::with_client(
            entry.label(),
            &entry.base_url,
            &entry.api_key,
            self.client.clone(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn factory_names_provider_after_entry() {
        let factory = OpenAiCompatFactory::new();
        let provider = factory.build(&ProviderEntry::new(
            "ds",
            "https://api.deepseek.com/v1/",
            "k",
            "deepseek-chat",
        ));
        assert_eq!(provider.name(), "ds");

        let unnamed = factory.build(&ProviderEntry::new("", "https://x/v1", "k", "gpt-x"));
        assert_eq!(unnamed.name(), "gpt-x");
    }
}
