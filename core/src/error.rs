use thiserror::Error;

/// docker-spk error types
#[derive(Error, Debug)]
pub enum SpkError {
    /// Malformed or unreadable image, layer, or tar data
    #[error("Image error: {0}")]
    ImageError(String),

    /// I/O error
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// The counting and building passes disagreed about the tree shape
    #[error("Internal consistency error: {0}")]
    InternalConsistency(String),

    /// Keyring could not be read or written
    #[error("Keyring error: {0}")]
    KeyringError(String),

    /// No private key for the requested app id
    #[error("Key not found in keyring: {app_id}")]
    KeyNotFound { app_id: String },

    /// Signing or signature verification failed
    #[error("Signing error: {0}")]
    SigningError(String),

    /// Cap'n Proto message could not be encoded or decoded
    #[error("Encoding error: {0}")]
    EncodingError(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl SpkError {
    /// Whether this error signals a bug in the converter rather than bad input.
    pub fn is_internal(&self) -> bool {
        matches!(self, SpkError::InternalConsistency(_))
    }
}

impl From<serde_json::Error> for SpkError {
    fn from(err: serde_json::Error) -> Self {
        SpkError::SerializationError(err.to_string())
    }
}

impl From<capnp::Error> for SpkError {
    fn from(err: capnp::Error) -> Self {
        SpkError::EncodingError(err.to_string())
    }
}

impl From<capnp::NotInSchema> for SpkError {
    fn from(err: capnp::NotInSchema) -> Self {
        SpkError::EncodingError(format!("unknown union variant {}", err.0))
    }
}

/// Result type alias for docker-spk operations
pub type Result<T> = std::result::Result<T, SpkError>;
