//! Error types for the tide system
//!
//! This module defines all error types used throughout the crate.

use thiserror::Error;

/// Result type alias for tide operations
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for the tide system
#[derive(Error, Debug)]
pub enum Error {
    /// IP source-related errors (transport or malformed response)
    #[error("IP source error: {0}")]
    IpSource(String),

    /// The source answered, but not with a usable IPv4 address
    #[error("Invalid IP address: {0}")]
    InvalidAddress(String),

    /// Cache store-related errors
    #[error("Cache store error: {0}")]
    CacheStore(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// HTTP client errors
    #[error("HTTP error: {0}")]
    Http(String),

    /// A call exceeded its time budget
    #[error("Timed out: {0}")]
    Timeout(String),

    /// DNS provider rejected or failed the request
    ///
    /// `detail` carries provider diagnostics such as a troubleshooting
    /// recommendation, when the provider returns one.
    #[error("Provider error ({provider}): {message}")]
    Provider {
        /// Provider name
        provider: String,
        /// Error message
        message: String,
        /// Optional provider-specific diagnostic
        detail: Option<String>,
    },

    /// Generic error with context
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create an IP source error
    pub fn ip_source(msg: impl Into<String>) -> Self {
        Self::IpSource(msg.into())
    }

    /// Create an invalid address error
    pub fn invalid_address(msg: impl Into<String>) -> Self {
        Self::InvalidAddress(msg.into())
    }

    /// Create a cache store error
    pub fn cache_store(msg: impl Into<String>) -> Self {
        Self::CacheStore(msg.into())
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create an HTTP error
    pub fn http(msg: impl Into<String>) -> Self {
        Self::Http(msg.into())
    }

    /// Create a timeout error
    pub fn timeout(msg: impl Into<String>) -> Self {
        Self::Timeout(msg.into())
    }

    /// Create a provider-specific error
    pub fn provider(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Provider {
            provider: provider.into(),
            message: message.into(),
            detail: None,
        }
    }

    /// Create a provider-specific error with a diagnostic detail
    pub fn provider_with_detail(
        provider: impl Into<String>,
        message: impl Into<String>,
        detail: Option<String>,
    ) -> Self {
        Self::Provider {
            provider: provider.into(),
            message: message.into(),
            detail,
        }
    }

    /// Provider diagnostic detail, if this error carries one
    pub fn detail(&self) -> Option<&str> {
        match self {
            Self::Provider { detail, .. } => detail.as_deref(),
            _ => None,
        }
    }

    /// Render the error with its diagnostic detail appended
    ///
    /// This is the form reported to the notifier.
    pub fn report(&self) -> String {
        match self.detail() {
            Some(detail) => format!("{} ({})", self, detail),
            None => self.to_string(),
        }
    }
}
