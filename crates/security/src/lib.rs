//! Content screening for Parley.
//!
//! Every inbound message passes through [`SafetyFilter::check`] before any
//! retrieval or model call:
//! - **Jailbreak patterns**: fixed case-insensitive expressions over the raw text
//! - **Lexicon**: operator-managed sensitive words, cached from the record store

pub mod filter;
pub mod lexicon;

pub use filter::{FilterVerdict, SafetyFilter};
pub use lexicon::Lexicon;
