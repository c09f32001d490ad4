//! Configuration Module
//!
//! Environment-driven configuration for the desk runtime.

mod settings;

pub use settings::{
    ApiSettings, ConfigError, DeskConfig, FeedSettings, HostingTarget, LayoutSettings,
    RefreshSettings, ServerSettings, SessionToken, SyncSettings,
};
