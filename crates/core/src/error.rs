//! Error types for the Parley domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error enum.

use thiserror::Error;

/// The top-level error type for all Parley operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Provider errors ---
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    // --- Storage errors ---
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    // --- Provider pool errors ---
    #[error("Pool error: {0}")]
    Pool(#[from] PoolError),

    // --- Wire protocol errors ---
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    // --- Configuration errors ---
    #[error("Configuration error: {message}")]
    Config { message: String },

    // --- Serialization ---
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // --- Generic ---
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

/// Transport-level failures talking to a completion or embedding backend.
///
/// Every variant is retryable from the orchestrator's point of view.
#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("API request failed: {message} (status: {status_code})")]
    ApiError {
        status_code: u16,
        message: String,
    },

    #[error("Rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Model not found: {0}")]
    ModelNotFound(String),

    #[error("Stream interrupted: {0}")]
    StreamInterrupted(String),

    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Query failed: {0}")]
    QueryFailed(String),

    #[error("Record not found: {0}")]
    NotFound(String),

    #[error("Migration failed: {0}")]
    MigrationFailed(String),

    #[error("Corrupt record: {0}")]
    Corrupt(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PoolError {
    /// The candidate list was empty. Retrying cannot help.
    #[error("No available provider: every pool entry is disabled and no primary is configured")]
    NoAvailableProvider,

    #[error("Provider index {index} out of range (pool has {len} entries)")]
    IndexOutOfRange { index: usize, len: usize },

    /// Saving before the stored pool was read would replace it wholesale.
    #[error("Provider pool was never loaded from the store; refusing to overwrite it")]
    NotLoaded,

    #[error("Provider pool store error: {0}")]
    Store(#[from] StoreError),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    #[error("Event line is missing the `data: ` prefix: {0}")]
    MissingDataPrefix(String),

    #[error("Event payload is not valid JSON: {0}")]
    InvalidJson(String),

    #[error("Malformed stats payload: {0}")]
    MalformedStats(String),
}
