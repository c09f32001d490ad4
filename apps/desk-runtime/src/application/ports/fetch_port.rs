//! Fetch Ports (Driven Ports)
//!
//! JSON reads against the desk API: panel data and focus context.

use async_trait::async_trait;
use serde_json::Value;

use crate::domain::focus::FocusFamily;

/// Query string parameters in order.
pub type QueryParams = Vec<(String, String)>;

/// Error from a desk API request.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FetchError {
    /// The server answered with a non-success status.
    ///
    /// The message is the server's own `error`/`message` field when present.
    #[error("{message}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Human-readable message.
        message: String,
    },

    /// The request did not complete within the client timeout.
    #[error("request timed out")]
    Timeout,

    /// Connection-level failure.
    #[error("network error: {message}")]
    Network {
        /// Error details.
        message: String,
    },

    /// The body was not the expected JSON.
    #[error("invalid response: {message}")]
    Decode {
        /// Error details.
        message: String,
    },
}

impl FetchError {
    /// Whether retrying the same request might succeed.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::Status { status, .. } => *status >= 500 || *status == 429,
            Self::Timeout | Self::Network { .. } => true,
            Self::Decode { .. } => false,
        }
    }
}

/// Port for panel data reads.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PanelFetcher: Send + Sync {
    /// Fetch JSON from `path` with query parameters.
    async fn fetch_json(&self, path: &str, query: &QueryParams) -> Result<Value, FetchError>;
}

/// Port for focus-scoped context reads.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ContextFetcher: Send + Sync {
    /// Fetch the context for a focus target.
    async fn fetch_context(&self, family: FocusFamily, target: &str) -> Result<Value, FetchError>;
}
