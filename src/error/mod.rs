//! Error types for the chat service.

pub mod unified;

pub use unified::ErrorCategory;

use thiserror::Error;

/// Primary error type for all chat operations.
#[derive(Error, Debug)]
pub enum ChatError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("The server is busy processing requests.")]
    Busy,

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Model error: {0}")]
    Model(#[from] candle_core::Error),

    #[error("Tokenizer error: {0}")]
    Tokenizer(String),

    #[error("Model hub error: {0}")]
    Hub(String),

    #[error("Model not loaded: call load() before generating")]
    NotLoaded,

    #[error("Stream error: {0}")]
    Stream(String),

    #[error("Background task failed: {0}")]
    Task(String),
}

impl ChatError {
    /// Create an API error from a status code and response body.
    pub fn api(status: u16, message: impl Into<String>) -> Self {
        Self::Api {
            status,
            message: message.into(),
        }
    }

    /// Classify this error into a category.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Configuration(_) => ErrorCategory::Configuration,
            Self::Busy => ErrorCategory::Capacity,
            Self::InvalidArgument(_) => ErrorCategory::InvalidRequest,
            Self::Api { status, .. } => match status {
                400 | 422 => ErrorCategory::InvalidRequest,
                _ => ErrorCategory::Backend,
            },
            Self::Network(_) => ErrorCategory::Network,
            Self::Model(_) | Self::Tokenizer(_) | Self::Hub(_) | Self::NotLoaded => {
                ErrorCategory::Backend
            }
            Self::Io(_) | Self::Serialization(_) | Self::Stream(_) | Self::Task(_) => {
                ErrorCategory::Internal
            }
        }
    }

    /// Whether this error should abort process startup.
    pub fn is_fatal(&self) -> bool {
        matches!(self.category(), ErrorCategory::Configuration)
    }
}

impl From<tokenizers::Error> for ChatError {
    fn from(err: tokenizers::Error) -> Self {
        Self::Tokenizer(err.to_string())
    }
}

impl From<tokio::task::JoinError> for ChatError {
    fn from(err: tokio::task::JoinError) -> Self {
        Self::Task(err.to_string())
    }
}

impl From<hf_hub::api::sync::ApiError> for ChatError {
    fn from(err: hf_hub::api::sync::ApiError) -> Self {
        Self::Hub(err.to_string())
    }
}

/// Convenience alias.
pub type Result<T> = std::result::Result<T, ChatError>;
