//! Events delivered by a live feed.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::quote::Quote;

/// A user-facing notification from the activity topic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityNotification {
    /// Notification identifier.
    pub id: String,
    /// Notification category (`alert`, `system`, ...).
    #[serde(default)]
    pub kind: String,
    /// Human-readable message.
    pub message: String,
    /// Creation time.
    pub created_at: DateTime<Utc>,
}

/// One decoded feed event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedEvent {
    /// Price updates.
    Quotes(Vec<Quote>),
    /// An activity notification.
    Activity(ActivityNotification),
    /// Keep-alive from a connected but quiet transport.
    Heartbeat,
}

impl FeedEvent {
    /// Whether the event carries data (as opposed to a keep-alive).
    #[must_use]
    pub const fn is_data(&self) -> bool {
        !matches!(self, Self::Heartbeat)
    }
}
