//! Workspace Snapshots
//!
//! A workspace is a named copy of every preference except the workspace
//! library itself. Loading one replaces the live preferences wholesale;
//! fields the snapshot does not carry revert to their defaults rather than
//! keeping their live values.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::panel::PanelUniverse;
use crate::domain::preferences::Preferences;

/// Longest workspace name accepted.
pub const MAX_WORKSPACE_NAME: usize = 64;

/// A named, persisted copy of desk state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkspaceSnapshot {
    /// Display name; unique within the library.
    pub name: String,
    /// When the snapshot was captured.
    pub saved_at: DateTime<Utc>,
    /// Captured preferences, without the `workspaces` field.
    pub state: Value,
}

impl WorkspaceSnapshot {
    /// Capture the current preferences under `name`.
    ///
    /// # Errors
    ///
    /// Returns an error if the preferences cannot be serialized.
    pub fn capture(name: &str, preferences: &Preferences) -> Result<Self, serde_json::Error> {
        let mut state = preferences.to_value()?;
        if let Some(object) = state.as_object_mut() {
            object.remove("workspaces");
        }
        Ok(Self {
            name: name.trim().to_string(),
            saved_at: Utc::now(),
            state,
        })
    }

    /// Build the preferences this snapshot describes.
    ///
    /// The result is normalized against `universe` and carries `library` as
    /// its workspace list, so loading never drops saved workspaces.
    #[must_use]
    pub fn restore(&self, universe: &PanelUniverse, library: Vec<Self>) -> Preferences {
        let mut state = self.state.clone();
        if let Some(object) = state.as_object_mut() {
            object.remove("workspaces");
        }
        let mut preferences = Preferences::from_value(&state, universe);
        preferences.workspaces = library;
        preferences.normalize(universe);
        preferences
    }

    /// Parse a stored snapshot, dropping entries without a name or an object
    /// state. A missing or malformed timestamp becomes "now".
    #[must_use]
    pub fn from_value(value: &Value) -> Option<Self> {
        let object = value.as_object()?;
        let name = object
            .get("name")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|name| is_valid_name(name))?;
        let state = object.get("state").filter(|state| state.is_object())?.clone();
        let saved_at = object
            .get("savedAt")
            .and_then(Value::as_str)
            .and_then(|raw| DateTime::parse_from_rfc3339(raw).ok())
            .map_or_else(Utc::now, |at| at.with_timezone(&Utc));

        Some(Self {
            name: name.to_string(),
            saved_at,
            state,
        })
    }
}

/// Whether a name can label a workspace.
#[must_use]
pub fn is_valid_name(name: &str) -> bool {
    let trimmed = name.trim();
    !trimmed.is_empty() && trimmed.chars().count() <= MAX_WORKSPACE_NAME
}
