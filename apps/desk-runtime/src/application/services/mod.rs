//! Application Services
//!
//! Services that orchestrate domain logic and coordinate between ports.
//!
//! - `PreferenceSync`: debounced persistence and guest/authenticated modes
//! - `LayoutEngine`: drag and resize gestures over the panel grid
//! - `FocusLoader`: stale-guarded focus context loads
//! - `FeedConnectionManager`: one live connection per topic
//! - `BootstrapOrchestrator`: initial panel loads and background refresh

pub mod bootstrap;
pub mod debounce;
pub mod feed;
pub mod focus;
pub mod layout;
pub mod sync;

pub use bootstrap::{BootstrapOrchestrator, BootstrapReport, PanelTask, RefreshClass, standard_tasks};
pub use debounce::{DebounceCommand, Debouncer};
pub use feed::FeedConnectionManager;
pub use focus::{FocusLoader, FocusOutcome};
pub use layout::{GestureEvent, GestureHook, GestureTrigger, HookId, LayoutEngine, LayoutError};
pub use sync::{AuthMode, GUEST_PREFERENCES_KEY, PreferenceSync, SyncError};
