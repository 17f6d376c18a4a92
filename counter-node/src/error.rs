use thiserror::Error;

/// A configuration value that was refused. The previous value stays in place.
#[derive(Error, Debug, Clone, PartialEq, Eq, serde::Serialize)]
#[error("{key}: {message}")]
pub struct ValidationError {
    pub key: String,
    pub message: String,
}

impl ValidationError {
    pub fn new(key: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            message: message.into(),
        }
    }
}

#[derive(Error, Debug)]
pub enum CounterError {
    #[error("Resource unavailable: {0}")]
    ResourceUnavailable(String),

    #[error("Stream ended: {0}")]
    StreamEnded(String),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("Inference error: {0}")]
    Inference(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Image error: {0}")]
    Image(String),

    #[error("Unexpected error: {0}")]
    Unexpected(String),
}

impl CounterError {
    /// Errors the lifecycle recovers from by backing off and retrying.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            CounterError::ResourceUnavailable(_)
                | CounterError::StreamEnded(_)
                | CounterError::Persistence(_)
                | CounterError::Inference(_)
                | CounterError::Validation(_)
        )
    }
}

impl From<serde_json::Error> for CounterError {
    fn from(error: serde_json::Error) -> Self {
        CounterError::Serialization(error.to_string())
    }
}

impl From<image::ImageError> for CounterError {
    fn from(error: image::ImageError) -> Self {
        CounterError::Image(error.to_string())
    }
}

impl From<config::ConfigError> for CounterError {
    fn from(error: config::ConfigError) -> Self {
        CounterError::Config(error.to_string())
    }
}

impl From<prometheus::Error> for CounterError {
    fn from(error: prometheus::Error) -> Self {
        CounterError::Unexpected(error.to_string())
    }
}

pub type Result<T> = std::result::Result<T, CounterError>;
