//! Live Feed Domain
//!
//! Topics, subscription keys, the per-connection mode state machine, and the
//! events a feed delivers.

mod backoff;
mod events;
mod mode;

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

pub use backoff::{BackoffConfig, BackoffPolicy};
pub use events::{ActivityNotification, FeedEvent};
pub use mode::{FeedMode, FeedStateMachine, FeedStatus, FeedTransitionError};

/// One logical live-data subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Topic {
    /// Crypto product ticker keyed by product ids.
    CryptoTicker,
    /// Per-user activity notifications.
    Activity,
}

impl Topic {
    /// All topics.
    #[must_use]
    pub const fn all() -> &'static [Self] {
        &[Self::CryptoTicker, Self::Activity]
    }

    /// Stable name used on the wire, in logs, and in metrics.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::CryptoTicker => "crypto-ticker",
            Self::Activity => "activity",
        }
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Canonical identity of what a connection is subscribed to.
///
/// Ordering and duplicates in the input do not matter, so reconnecting with
/// the same symbols in a different order is recognized as a no-op.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct SubscriptionKey(BTreeSet<String>);

impl SubscriptionKey {
    /// Build a key from any collection of ids.
    #[must_use]
    pub fn new<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self(
            ids.into_iter()
                .map(|id| id.as_ref().trim().to_string())
                .filter(|id| !id.is_empty())
                .collect(),
        )
    }

    /// Key for topics that take no parameters.
    #[must_use]
    pub fn unkeyed() -> Self {
        Self::default()
    }

    /// Whether the key carries no ids.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Ids in canonical order.
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    /// Comma-joined ids, as sent in query strings and subscribe frames.
    #[must_use]
    pub fn joined(&self) -> String {
        self.ids().collect::<Vec<_>>().join(",")
    }
}

impl fmt::Display for SubscriptionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.joined())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_is_order_insensitive() {
        let a = SubscriptionKey::new(["ETH-USD", "BTC-USD"]);
        let b = SubscriptionKey::new(["BTC-USD", "ETH-USD", "BTC-USD", " "]);
        assert_eq!(a, b);
        assert_eq!(a.joined(), "BTC-USD,ETH-USD");
    }

    #[test]
    fn topic_names() {
        assert_eq!(Topic::CryptoTicker.to_string(), "crypto-ticker");
        assert_eq!(
            serde_json::to_value(Topic::Activity).unwrap(),
            serde_json::json!("activity")
        );
        assert!(SubscriptionKey::unkeyed().is_empty());
    }
}
