//! # Parley Core
//!
//! Domain types, traits, and error definitions for the Parley chat pipeline.
//! This crate has **no framework dependencies**. It defines the domain model
//! that every other crate implements against.
//!
//! ## Layout
//!
//! Every external collaborator is a trait here: completion providers,
//! embedding providers and the record store. Implementations live in their
//! own crates, so handlers and tests can swap them freely.

pub mod error;
pub mod message;
pub mod provider;
pub mod knowledge;
pub mod profile;
pub mod store;
pub mod stream;

// Re-export key types at crate root for ergonomics
pub use error::{Error, PoolError, ProtocolError, ProviderError, Result, StoreError};
pub use message::{ChatTurn, ContentPart, ImageUrl, Role, TurnContent};
pub use provider::{
    CapabilityHint, EmbeddingProvider, Provider, ProviderRequest, ProviderResponse, StreamChunk,
    Usage,
};
pub use knowledge::{KnowledgeEntry, NewKnowledgeEntry, RetrievedPassage};
pub use profile::{BanStatus, BotProfile, ChatMode, SensitiveWord, UserRecord};
pub use store::{ConversationTurn, PoolDocument, ProviderEntry, RecordStore};
pub use stream::{SseDecoder, StreamEvent};
