//! Feed Ports
//!
//! A live topic is served either by a push transport (driven) or by a
//! poller (driven). Connections deliver what they receive into a
//! [`TickSink`] (driver).

use async_trait::async_trait;
use futures::stream::BoxStream;

use super::FetchError;
use crate::domain::feed::{FeedEvent, FeedMode, FeedStatus, SubscriptionKey, Topic};

/// Stream of decoded events from an open push transport.
///
/// The stream ending, or yielding an error, means the transport is gone.
pub type FeedStream = BoxStream<'static, Result<FeedEvent, TransportError>>;

/// Push transport error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    /// The transport could not be opened.
    #[error("push transport unavailable: {message}")]
    Unavailable {
        /// Error details.
        message: String,
    },

    /// An open transport failed.
    #[error("push transport closed: {message}")]
    Closed {
        /// Error details.
        message: String,
    },

    /// A frame could not be decoded.
    #[error("malformed frame: {message}")]
    Protocol {
        /// Error details.
        message: String,
    },
}

/// Port for push transports.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PushTransport: Send + Sync {
    /// Open a push stream for `topic`.
    ///
    /// An error here means no connection was made, which is distinct from a
    /// connected stream that only yields heartbeats.
    async fn open(&self, topic: Topic, key: &SubscriptionKey) -> Result<FeedStream, TransportError>;
}

/// Port for the polling fallback.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait FeedPoller: Send + Sync {
    /// Fetch the current state of `topic` once.
    async fn poll(&self, topic: Topic, key: &SubscriptionKey) -> Result<Vec<FeedEvent>, FetchError>;
}

/// Receiver of feed output.
///
/// Called from connection tasks; implementations must not block.
pub trait TickSink: Send + Sync {
    /// Apply events received on `topic`, in arrival order.
    fn apply(&self, topic: Topic, events: Vec<FeedEvent>);

    /// Record that `topic` answered successfully, even with no data.
    fn synced(&self, topic: Topic);

    /// Record a mode or status change of `topic`.
    fn mode_changed(&self, topic: Topic, mode: FeedMode, status: FeedStatus);
}
