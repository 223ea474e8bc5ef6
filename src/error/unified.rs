//! Error classification used for HTTP mapping and log levels.

use serde::Serialize;
use strum::Display;

/// Broad error category for routing failure handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ErrorCategory {
    /// Missing credentials, unusable accelerator, unknown backend. Aborts startup.
    Configuration,
    /// Request limiter saturated. Recoverable by retrying later.
    Capacity,
    /// Caller sent something unusable.
    InvalidRequest,
    /// Model, tokenizer, hub, or upstream API failure.
    Backend,
    Network,
    Internal,
}

impl ErrorCategory {
    /// HTTP status code used when an error of this category reaches the router.
    pub fn status_code(self) -> u16 {
        match self {
            Self::Capacity => 503,
            Self::InvalidRequest => 400,
            Self::Network => 502,
            Self::Configuration | Self::Backend | Self::Internal => 500,
        }
    }
}
