//! Preference Persistence and Sync
//!
//! Mutations apply to the in-memory preferences immediately. Guests also
//! write the whole document to the local store on every mutation, so the
//! local copy is always current. Authenticated users persist through the
//! debounced path to the profile endpoint. A single write never goes to
//! both.

use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::debounce::{DebounceCommand, run_debounce};
use crate::application::events::{ChangeReason, NoticeLevel};
use crate::application::ports::{FetchError, LocalStore, ProfileApi, StoreError};
use crate::application::state::{DeskState, ProfileSummary};
use crate::domain::preferences::Preferences;
use crate::domain::workspace::{WorkspaceSnapshot, is_valid_name};
use crate::infrastructure::metrics::{self, Outcome, PersistTarget, RequestKind};

/// Local store key holding the guest preferences.
pub const GUEST_PREFERENCES_KEY: &str = "desk.preferences";

/// Whether writes go to the local store or the profile endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthMode {
    /// Unauthenticated; local store is authoritative.
    Guest,
    /// Signed in; the profile endpoint is authoritative.
    Authenticated,
}

/// Preference sync errors.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    /// A profile request failed.
    #[error(transparent)]
    Fetch(#[from] FetchError),

    /// The local store failed.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Preferences could not be serialized.
    #[error("failed to serialize preferences: {0}")]
    Serialize(#[from] serde_json::Error),

    /// No workspace has the requested name.
    #[error("workspace not found: {0}")]
    WorkspaceNotFound(String),

    /// The name cannot label a workspace.
    #[error("invalid workspace name: {0:?}")]
    InvalidWorkspaceName(String),
}

/// Owns the persistence side of the preferences.
pub struct PreferenceSync {
    state: Arc<DeskState>,
    local: Arc<dyn LocalStore>,
    profile: Arc<dyn ProfileApi>,
    mode: RwLock<AuthMode>,
    quiet: Duration,
    debounce_tx: mpsc::UnboundedSender<DebounceCommand>,
    debounce_rx: Mutex<Option<mpsc::UnboundedReceiver<DebounceCommand>>>,
}

impl std::fmt::Debug for PreferenceSync {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PreferenceSync")
            .field("mode", &self.mode())
            .field("quiet", &self.quiet)
            .finish_non_exhaustive()
    }
}

impl PreferenceSync {
    /// Create a sync engine in guest mode.
    #[must_use]
    pub fn new(
        state: Arc<DeskState>,
        local: Arc<dyn LocalStore>,
        profile: Arc<dyn ProfileApi>,
        quiet: Duration,
    ) -> Self {
        let (debounce_tx, debounce_rx) = mpsc::unbounded_channel();
        Self {
            state,
            local,
            profile,
            mode: RwLock::new(AuthMode::Guest),
            quiet,
            debounce_tx,
            debounce_rx: Mutex::new(Some(debounce_rx)),
        }
    }

    /// Spawn the debounce loop. Only the first call spawns anything.
    pub fn start(self: &Arc<Self>, cancel: CancellationToken) -> Option<JoinHandle<()>> {
        let commands = self.debounce_rx.lock().take()?;
        let weak: Weak<Self> = Arc::downgrade(self);
        Some(tokio::spawn(run_debounce(
            self.quiet,
            commands,
            cancel,
            move || {
                let weak = weak.clone();
                async move {
                    if let Some(sync) = weak.upgrade() {
                        sync.flush_debounced().await;
                    }
                }
            },
        )))
    }

    /// Current persistence mode.
    #[must_use]
    pub fn mode(&self) -> AuthMode {
        *self.mode.read()
    }

    // =========================================================================
    // Mutations
    // =========================================================================

    /// Apply a mutation now and schedule its persistence.
    ///
    /// Returns whether the preferences changed.
    pub fn schedule(&self, mutation: impl FnOnce(&mut Preferences)) -> bool {
        let changed = self.state.mutate_preferences(mutation);
        if changed {
            self.persist_after_change();
        }
        changed
    }

    /// Persist immediately, bypassing the debounce.
    ///
    /// A manual save reports its outcome as a notice.
    ///
    /// # Errors
    ///
    /// Returns the persistence error.
    pub async fn sync_now(&self, manual: bool) -> Result<(), SyncError> {
        let _ = self.debounce_tx.send(DebounceCommand::Cancel);
        let result = self.persist().await;

        match &result {
            Ok(()) if manual => {
                self.state.events().notify(NoticeLevel::Success, "Preferences saved");
            }
            Err(e) if manual => {
                self.state
                    .events()
                    .notify(NoticeLevel::Error, format!("Save failed: {e}"));
            }
            Err(e) => tracing::warn!(error = %e, "Preference sync failed"),
            Ok(()) => {}
        }
        result
    }

    fn persist_after_change(&self) {
        if self.mode() == AuthMode::Guest
            && let Err(e) = self.write_local()
        {
            tracing::warn!(error = %e, "Guest preference write failed");
        }
        let _ = self.debounce_tx.send(DebounceCommand::Arm);
    }

    async fn flush_debounced(&self) {
        if self.mode() == AuthMode::Guest {
            tracing::trace!("Guest preferences already written locally");
            return;
        }
        if let Err(e) = self.persist().await {
            tracing::warn!(error = %e, "Debounced preference sync failed");
        }
    }

    async fn persist(&self) -> Result<(), SyncError> {
        // Preferences are read under the mode lock; mode switches take it
        // for writing, so profile writes only ever carry profile data.
        let remote = {
            let mode = self.mode.read();
            match *mode {
                AuthMode::Guest => None,
                AuthMode::Authenticated => Some(self.state.preferences()),
            }
        };

        match remote {
            None => self.write_local(),
            Some(preferences) => {
                let started = Instant::now();
                let result = self.profile.save_preferences(&preferences).await;
                metrics::record_request_duration(RequestKind::Profile, started.elapsed());
                metrics::record_persist(PersistTarget::Remote, Outcome::of(&result));
                result?;
                tracing::debug!("Preferences saved to profile");
                Ok(())
            }
        }
    }

    fn write_local(&self) -> Result<(), SyncError> {
        let value = {
            let mode = self.mode.read();
            if *mode != AuthMode::Guest {
                return Ok(());
            }
            self.state.with_preferences(Preferences::to_value)?
        };
        let result = self.local.save(GUEST_PREFERENCES_KEY, &value);
        metrics::record_persist(PersistTarget::Local, Outcome::of(&result));
        Ok(result?)
    }

    // =========================================================================
    // Mode Transitions
    // =========================================================================

    /// Read the guest preferences from the local store, merged over defaults.
    ///
    /// Unreadable data falls back to defaults.
    #[must_use]
    pub fn load_guest(&self) -> Preferences {
        let universe = self.state.universe();
        match self.local.load(GUEST_PREFERENCES_KEY) {
            Ok(Some(value)) => Preferences::from_value(&value, universe),
            Ok(None) => Preferences::defaults(universe),
            Err(e) => {
                tracing::warn!(error = %e, "Guest preferences unreadable; using defaults");
                Preferences::defaults(universe)
            }
        }
    }

    /// Switch to authenticated mode with the server's preferences.
    ///
    /// Guest data is never carried over. On failure the runtime stays in
    /// guest mode.
    ///
    /// # Errors
    ///
    /// Returns the profile fetch error.
    pub async fn sign_in(&self) -> Result<(), SyncError> {
        let started = Instant::now();
        let result = self.profile.fetch_profile().await;
        metrics::record_request_duration(RequestKind::Profile, started.elapsed());
        let snapshot = result.inspect_err(|e| {
            tracing::warn!(error = %e, "Profile fetch failed; staying in guest mode");
        })?;

        let _ = self.debounce_tx.send(DebounceCommand::Cancel);

        let universe = self.state.universe();
        let preferences = snapshot.preferences.as_ref().map_or_else(
            || Preferences::defaults(universe),
            |value| Preferences::from_value(value, universe),
        );
        self.state.set_profile(ProfileSummary {
            authenticated: true,
            user_count: snapshot.user_count,
            session_count: snapshot.session_count,
        });
        {
            let mut mode = self.mode.write();
            self.state.replace_preferences(preferences, ChangeReason::SignIn);
            *mode = AuthMode::Authenticated;
        }

        tracing::info!("Signed in; profile preferences loaded");
        Ok(())
    }

    /// Return to guest mode with the locally stored guest preferences.
    ///
    /// Any pending authenticated write is dropped.
    pub fn sign_out(&self) {
        *self.mode.write() = AuthMode::Guest;
        let _ = self.debounce_tx.send(DebounceCommand::Cancel);

        let preferences = self.load_guest();
        self.state.set_profile(ProfileSummary::default());
        self.state.replace_preferences(preferences, ChangeReason::SignOut);

        tracing::info!("Signed out; guest preferences restored");
    }

    // =========================================================================
    // Workspaces
    // =========================================================================

    /// Save the current state under `name`, replacing a snapshot of the same
    /// name.
    ///
    /// # Errors
    ///
    /// Fails on an invalid name or if the state cannot be serialized.
    pub fn save_workspace(&self, name: &str) -> Result<(), SyncError> {
        if !is_valid_name(name) {
            return Err(SyncError::InvalidWorkspaceName(name.to_string()));
        }
        let snapshot = self
            .state
            .with_preferences(|p| WorkspaceSnapshot::capture(name, p))?;

        self.schedule(move |p| {
            p.workspaces.retain(|w| w.name != snapshot.name);
            p.workspaces.push(snapshot);
        });
        Ok(())
    }

    /// Delete the workspace called `name`.
    ///
    /// # Errors
    ///
    /// Fails if no such workspace exists.
    pub fn delete_workspace(&self, name: &str) -> Result<(), SyncError> {
        let name = name.trim();
        let removed = self.schedule(|p| p.workspaces.retain(|w| w.name != name));
        if removed {
            Ok(())
        } else {
            Err(SyncError::WorkspaceNotFound(name.to_string()))
        }
    }

    /// Replace the live preferences with the workspace called `name`.
    ///
    /// # Errors
    ///
    /// Fails if no such workspace exists.
    pub fn load_workspace(&self, name: &str) -> Result<(), SyncError> {
        let name = name.trim();
        let snapshot = self
            .state
            .with_preferences(|p| p.workspaces.iter().find(|w| w.name == name).cloned())
            .ok_or_else(|| SyncError::WorkspaceNotFound(name.to_string()))?;
        self.load_snapshot(&snapshot);
        Ok(())
    }

    /// Replace the live preferences with `snapshot`, keeping the library.
    pub fn load_snapshot(&self, snapshot: &WorkspaceSnapshot) {
        let library = self.state.with_preferences(|p| p.workspaces.clone());
        let preferences = snapshot.restore(self.state.universe(), library);
        self.state
            .replace_preferences(preferences, ChangeReason::WorkspaceLoaded);
        self.persist_after_change();

        tracing::info!(workspace = %snapshot.name, "Workspace loaded");
    }
}
