//! Error types for the PulseBot domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error variant.
//!
//! Recoverable failures inside a turn (tool errors, provider timeouts) travel
//! as data on result types; these enums exist for the places where an
//! operation genuinely cannot continue.

use thiserror::Error;

/// The top-level error type for all PulseBot operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Stream substrate errors ---
    #[error("Stream error: {0}")]
    Stream(#[from] StreamError),

    // --- Provider errors ---
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    // --- Embedding errors ---
    #[error("Embedding error: {0}")]
    Embedding(#[from] EmbeddingError),

    // --- Memory errors ---
    #[error("Memory error: {0}")]
    Memory(#[from] MemoryError),

    // --- Skill errors ---
    #[error("Skill error: {0}")]
    Skill(#[from] SkillError),

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

#[derive(Debug, Error)]
pub enum StreamError {
    /// Transport-level failure (connection lost, endpoint unreachable).
    /// Tails surface this kind so callers can restart with a fresh seek.
    #[error("Stream transport error: {0}")]
    Transport(String),

    #[error("Query failed: {reason}")]
    QueryFailed { reason: String },

    #[error("Failed to decode row: {0}")]
    Decode(String),

    #[error("Stream '{stream}' schema mismatch: {detail}")]
    SchemaMismatch { stream: String, detail: String },

    /// The tail was cancelled or its consumer went away.
    #[error("Stream closed")]
    Closed,
}

#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("API request failed: {message} (status: {status_code})")]
    Api { status_code: u16, message: String },

    #[error("Rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Provider not configured: {0}")]
    NotConfigured(String),
}

#[derive(Debug, Clone, Error)]
pub enum EmbeddingError {
    #[error("Embedding API request failed: {message} (status: {status_code})")]
    Api { status_code: u16, message: String },

    #[error("Embedding request timed out after {0}s")]
    Timeout(u64),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Embedding provider not configured: {0}")]
    NotConfigured(String),

    #[error("Failed to decode embedding response: {0}")]
    Decode(String),
}

#[derive(Debug, Error)]
pub enum MemoryError {
    /// No embedding provider configured or reachable; memory retrieval and
    /// extraction are skipped when this surfaces.
    #[error("Memory features unavailable: no embedding provider")]
    Unavailable,

    #[error("Embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Embedding generation failed: {0}")]
    EmbeddingFailed(String),

    #[error("Memory storage error: {0}")]
    Storage(#[from] StreamError),
}

#[derive(Debug, Error)]
pub enum SkillError {
    #[error("unknown tool: {0}")]
    UnknownTool(String),

    #[error("Invalid tool arguments: {0}")]
    InvalidArguments(String),

    #[error("Tool execution failed: {tool_name} — {reason}")]
    ExecutionFailed { tool_name: String, reason: String },

    #[error("Tool timed out: {tool_name} after {timeout_secs}s")]
    Timeout { tool_name: String, timeout_secs: u64 },

    #[error("Tool name collision: '{tool_name}' provided by both '{first}' and '{second}'")]
    Collision {
        tool_name: String,
        first: String,
        second: String,
    },

    #[error("Failed to load skill: {0}")]
    LoadFailed(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_error_displays_correctly() {
        let err = Error::Provider(ProviderError::Api {
            status_code: 429,
            message: "Too many requests".into(),
        });
        assert!(err.to_string().contains("429"));
        assert!(err.to_string().contains("Too many requests"));
    }

    #[test]
    fn unknown_tool_message_is_distinguished() {
        let err = SkillError::UnknownTool("frobnicate".into());
        assert_eq!(err.to_string(), "unknown tool: frobnicate");
    }

    #[test]
    fn schema_mismatch_names_the_stream() {
        let err = StreamError::SchemaMismatch {
            stream: "memory".into(),
            detail: "missing column 'embedding'".into(),
        };
        assert!(err.to_string().contains("memory"));
        assert!(err.to_string().contains("embedding"));
    }

    #[test]
    fn stream_error_converts_to_memory_error() {
        let err: MemoryError = StreamError::Transport("connection reset".into()).into();
        assert!(err.to_string().contains("connection reset"));
    }
}
