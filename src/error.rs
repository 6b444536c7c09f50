//! Error types for Svar.

use thiserror::Error;

/// Library-level error type for Svar operations.
#[derive(Error, Debug)]
pub enum SvarError {
    #[error("Configuration error: {0}")]
    Config(String),

    /// An external service (embedding API, vector store, generation or
    /// judge model) could not be reached. Recoverable: callers degrade
    /// to lexical-only retrieval or surface a failed message.
    #[error("{service} unavailable: {detail}")]
    UpstreamUnavailable { service: &'static str, detail: String },

    /// A query or point vector does not match the dimension of the
    /// collection it targets. Vectors are never truncated or padded.
    #[error("Embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Embedding generation failed: {0}")]
    Embedding(String),

    #[error("Vector store error: {0}")]
    VectorStore(String),

    #[error("Storage error: {0}")]
    Storage(String),

    /// The generation model itself errored (empty completion, malformed
    /// response). Distinct from `UpstreamUnavailable`: the service was
    /// reachable but produced no usable answer.
    #[error("Generation failed: {0}")]
    Generation(String),

    #[error("Transcript not found: {0}")]
    TranscriptNotFound(String),

    #[error("Session not found: {0}")]
    SessionNotFound(String),

    #[error("Message not found: {0}")]
    MessageNotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("OpenAI API error: {0}")]
    OpenAI(String),
}

impl SvarError {
    /// Whether the error indicates an unreachable backend rather than a
    /// bad request, used when deciding to degrade instead of failing.
    pub fn is_unavailable(&self) -> bool {
        matches!(
            self,
            SvarError::UpstreamUnavailable { .. } | SvarError::Http(_)
        )
    }
}

/// Result type alias for Svar operations.
pub type Result<T> = std::result::Result<T, SvarError>;
