//! Error types for the voice chat client

use thiserror::Error;

/// Result type alias for voice chat operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the voice chat client
#[derive(Debug, Error)]
pub enum Error {
    /// User submitted blank chat input
    #[error("please enter a message")]
    EmptyInput,

    /// No API credential supplied for the completion service
    #[error("an API key is required")]
    MissingCredential,

    /// Token accounting requested for a model outside the supported family
    #[error("token counting is not implemented for model {0}")]
    UnsupportedModel(String),

    /// BPE tables could not be loaded
    #[error("tokenizer error: {0}")]
    Tokenizer(String),

    /// Completion API error
    #[error("completion error: {0}")]
    Completion(String),

    /// Text-to-speech error
    #[error("TTS error: {0}")]
    Tts(String),

    /// Audio error
    #[error("audio error: {0}")]
    Audio(String),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Resource not found
    #[error("not found: {0}")]
    NotFound(String),

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

impl Error {
    /// Whether the error was caused by the user's submission rather than a fault
    #[must_use]
    pub const fn is_user_error(&self) -> bool {
        matches!(self, Self::EmptyInput | Self::MissingCredential)
    }
}
