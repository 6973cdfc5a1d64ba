//! The Parley chat pipeline.
//!
//! [`ChatOrchestrator`] drives one inbound message through screening,
//! retrieval, prompt assembly and provider dispatch, emitting
//! [`parley_core::StreamEvent`]s. [`PromptAssembler`] builds the ordered
//! turn list the providers receive.

pub mod orchestrator;
pub mod prompt;
pub mod request;

pub use orchestrator::{ChatOrchestrator, ChatSettings};
pub use prompt::{PromptAssembler, PromptInput};
pub use request::{ChatOutcome, ChatRequest};
