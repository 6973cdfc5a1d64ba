//! Completion backends for Parley.
//!
//! - [`ProviderPool`]: the shared rotation of interchangeable backends
//! - [`capability::detect`]: model name to extra request parameters
//! - [`OpenAiCompatProvider`] / [`OpenAiCompatEmbedder`]: HTTP clients for
//!   any OpenAI-compatible endpoint
//! - [`ProviderFactory`]: turns a pool entry into a live provider

pub mod capability;
pub mod factory;
pub mod openai_compat;
pub mod pool;

pub use factory::{OpenAiCompatFactory, ProviderFactory};
pub use openai_compat::{OpenAiCompatEmbedder, OpenAiCompatProvider};
pub use pool::{EntryPatch, ProviderPool};
