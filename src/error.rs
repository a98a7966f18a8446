//! Error types for Banter

use thiserror::Error;

/// Result type alias for Banter operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in Banter
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error (fatal at startup)
    #[error("configuration error: {0}")]
    Config(String),

    /// Completion service unreachable, rejected the request, or answered garbage
    #[error("upstream error: {0}")]
    Upstream(String),

    /// Voice channel join failed
    #[error("voice connect error: {0}")]
    Connect(String),

    /// Speech synthesis or playback failed
    #[error("playback error: {0}")]
    Playback(String),

    /// Speech recognition failed
    #[error("recognition error: {0}")]
    Recognition(String),

    /// Audio device error
    #[error("audio error: {0}")]
    Audio(String),

    /// Chat platform error
    #[error("channel error: {0}")]
    Channel(String),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP error
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// TOML parsing error
    #[error("toml error: {0}")]
    Toml(#[from] toml::de::Error),
}
