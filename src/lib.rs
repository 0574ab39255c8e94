use thiserror::Error;

pub type Result<T> = std::result::Result<T, RecsyncError>;

#[derive(Error, Debug)]
pub enum RecsyncError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Rate limited by embedding provider: {0}")]
    RateLimited(String),

    #[error("Embedding provider unavailable: {0}")]
    ProviderUnavailable(String),

    #[error("Vector index unavailable: {0}")]
    IndexUnavailable(String),

    #[error("Embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Partial batch failure: {written} entries written before error: {message}")]
    PartialBatchFailure { written: usize, message: String },

    #[error("MCP error: {0}")]
    Mcp(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

impl RecsyncError {
    /// Returns whether the error is transient and the operation can be
    /// retried with backoff.
    #[inline]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::RateLimited(_) | Self::ProviderUnavailable(_) | Self::IndexUnavailable(_)
        )
    }
}

pub mod commands;
pub mod config;
pub mod database;
pub mod embeddings;
pub mod mcp;
pub mod normalize;
pub mod recommend;
pub mod sync;
