//! Persistence Ports (Driven Ports)
//!
//! Guests persist to a local store; authenticated users persist to the
//! profile endpoint. A single write never goes to both.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::FetchError;
use crate::domain::preferences::Preferences;

/// What the profile endpoint returns.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileSnapshot {
    /// Stored preferences, in whatever shape the server kept them.
    #[serde(default)]
    pub preferences: Option<Value>,
    /// Registered users, if reported.
    #[serde(default)]
    pub user_count: Option<u64>,
    /// Active sessions, if reported.
    #[serde(default)]
    pub session_count: Option<u64>,
}

/// Port for the server-side profile.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ProfileApi: Send + Sync {
    /// `GET` the stored profile.
    async fn fetch_profile(&self) -> Result<ProfileSnapshot, FetchError>;

    /// `PUT` the full preferences document.
    async fn save_preferences(&self, preferences: &Preferences) -> Result<(), FetchError>;
}

/// Local store error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// Reading or writing failed.
    #[error("local store I/O error: {message}")]
    Io {
        /// Error details.
        message: String,
    },

    /// Stored data could not be parsed.
    #[error("local store data corrupt: {message}")]
    Corrupt {
        /// Error details.
        message: String,
    },
}

/// Port for synchronous local key/value storage of guest data.
#[cfg_attr(test, mockall::automock)]
pub trait LocalStore: Send + Sync {
    /// Read the value stored under `key`.
    fn load(&self, key: &str) -> Result<Option<Value>, StoreError>;

    /// Replace the value stored under `key`.
    fn save(&self, key: &str, value: &Value) -> Result<(), StoreError>;
}
