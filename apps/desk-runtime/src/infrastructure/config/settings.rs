//! Desk Configuration Settings
//!
//! Configuration types for the desk runtime, loaded from environment
//! variables. Every setting has a default, so an empty environment yields a
//! working local configuration.

use std::path::PathBuf;
use std::time::Duration;

/// Where the desk is hosted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HostingTarget {
    /// Long-lived process; push transports are allowed.
    #[default]
    Persistent,
    /// Serverless hosting; persistent push connections are not allowed.
    Serverless,
}

impl HostingTarget {
    /// Parse hosting target from string.
    #[must_use]
    pub fn from_str_case_insensitive(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "serverless" => Self::Serverless,
            _ => Self::Persistent,
        }
    }

    /// Whether persistent push connections may be opened.
    #[must_use]
    pub const fn push_allowed(&self) -> bool {
        matches!(self, Self::Persistent)
    }

    /// Get the hosting target name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Persistent => "persistent",
            Self::Serverless => "serverless",
        }
    }
}

/// Session token for the authenticated profile endpoint.
#[derive(Clone)]
pub struct SessionToken(String);

impl SessionToken {
    /// Wrap a raw token.
    #[must_use]
    pub const fn new(token: String) -> Self {
        Self(token)
    }

    /// Get the raw token.
    #[must_use]
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for SessionToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SessionToken([REDACTED])")
    }
}

/// Desk API endpoints.
#[derive(Debug, Clone)]
pub struct ApiSettings {
    /// Base URL of the desk API (`http(s)://...`).
    pub base_url: String,
    /// WebSocket URL of the push endpoint (`ws(s)://...`).
    pub push_url: String,
    /// Client timeout applied to every HTTP request.
    pub timeout: Duration,
    /// Session token; present means the desk starts authenticated.
    pub session_token: Option<SessionToken>,
}

impl Default for ApiSettings {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:3000".to_string(),
            push_url: "ws://localhost:3000/api/stream".to_string(),
            timeout: Duration::from_secs(10),
            session_token: None,
        }
    }
}

/// Live feed settings.
#[derive(Debug, Clone, Copy)]
pub struct FeedSettings {
    /// Whether push transports may be attempted.
    pub push_enabled: bool,
    /// Interval between successful polls.
    pub poll_interval: Duration,
    /// Cap on the poll retry backoff.
    pub poll_backoff_max: Duration,
    /// Consecutive poll failures before status turns `Degraded`.
    pub degraded_after_failures: u32,
    /// First delay before re-probing the push transport while polling.
    pub push_retry_initial: Duration,
    /// Cap on the push re-probe backoff.
    pub push_retry_max: Duration,
    /// Ping interval on an open push transport.
    pub heartbeat_interval: Duration,
    /// Silence on an open push transport before it is considered dead.
    pub heartbeat_timeout: Duration,
}

impl Default for FeedSettings {
    fn default() -> Self {
        Self {
            push_enabled: true,
            poll_interval: Duration::from_secs(15),
            poll_backoff_max: Duration::from_secs(120),
            degraded_after_failures: 2,
            push_retry_initial: Duration::from_secs(5),
            push_retry_max: Duration::from_secs(120),
            heartbeat_interval: Duration::from_secs(15),
            heartbeat_timeout: Duration::from_secs(45),
        }
    }
}

/// Preference sync settings.
#[derive(Debug, Clone)]
pub struct SyncSettings {
    /// Quiet period before a debounced persist.
    pub debounce: Duration,
    /// File backing the guest local store.
    pub local_store_path: PathBuf,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            debounce: Duration::from_millis(1_000),
            local_store_path: PathBuf::from(".desk/guest.json"),
        }
    }
}

/// Grid geometry.
#[derive(Debug, Clone, Copy)]
pub struct LayoutSettings {
    /// Gap between grid tracks in pixels.
    pub gap_px: f64,
    /// Viewport width below which panels stack at full width.
    pub collapse_breakpoint_px: u32,
}

impl Default for LayoutSettings {
    fn default() -> Self {
        Self {
            gap_px: 12.0,
            collapse_breakpoint_px: 1_100,
        }
    }
}

/// Background refresh intervals.
#[derive(Debug, Clone, Copy)]
pub struct RefreshSettings {
    /// Refresh interval for quote-driven panels.
    pub quotes_interval: Duration,
    /// Refresh interval for slower panels (news, calendar).
    pub panels_interval: Duration,
}

impl Default for RefreshSettings {
    fn default() -> Self {
        Self {
            quotes_interval: Duration::from_secs(30),
            panels_interval: Duration::from_secs(300),
        }
    }
}

/// Server port settings.
#[derive(Debug, Clone)]
pub struct ServerSettings {
    /// Port for the snapshot, health, and metrics HTTP server.
    pub http_port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self { http_port: 8090 }
    }
}

/// Complete desk configuration.
#[derive(Debug, Clone, Default)]
pub struct DeskConfig {
    /// Hosting target.
    pub hosting: HostingTarget,
    /// API endpoints.
    pub api: ApiSettings,
    /// Feed settings.
    pub feed: FeedSettings,
    /// Sync settings.
    pub sync: SyncSettings,
    /// Layout settings.
    pub layout: LayoutSettings,
    /// Refresh settings.
    pub refresh: RefreshSettings,
    /// Server settings.
    pub server: ServerSettings,
}

impl DeskConfig {
    /// Create configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if an endpoint URL is empty or malformed.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Create configuration from any key lookup.
    ///
    /// # Errors
    ///
    /// Returns an error if an endpoint URL is empty or malformed.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let hosting = lookup("DESK_HOSTING")
            .map(|s| HostingTarget::from_str_case_insensitive(&s))
            .unwrap_or_default();

        let api_defaults = ApiSettings::default();
        let base_url = match lookup("DESK_API_BASE_URL") {
            Some(url) => validate_url("DESK_API_BASE_URL", &url, &["http://", "https://"])?,
            None => api_defaults.base_url,
        };
        let push_url = match lookup("DESK_PUSH_URL") {
            Some(url) => validate_url("DESK_PUSH_URL", &url, &["ws://", "wss://"])?,
            None => derive_push_url(&base_url),
        };
        let session_token = lookup("DESK_SESSION_TOKEN")
            .map(|token| token.trim().to_string())
            .filter(|token| !token.is_empty())
            .map(SessionToken::new);
        let api = ApiSettings {
            base_url,
            push_url,
            timeout: parse_duration_secs(&lookup, "DESK_API_TIMEOUT_SECS", api_defaults.timeout),
            session_token,
        };

        let feed_defaults = FeedSettings::default();
        let feed = FeedSettings {
            push_enabled: hosting.push_allowed(),
            poll_interval: parse_duration_secs(
                &lookup,
                "DESK_POLL_INTERVAL_SECS",
                feed_defaults.poll_interval,
            ),
            poll_backoff_max: parse_duration_secs(
                &lookup,
                "DESK_POLL_BACKOFF_MAX_SECS",
                feed_defaults.poll_backoff_max,
            ),
            degraded_after_failures: parse_u32(
                &lookup,
                "DESK_DEGRADED_AFTER_FAILURES",
                feed_defaults.degraded_after_failures,
            ),
            push_retry_initial: parse_duration_secs(
                &lookup,
                "DESK_PUSH_RETRY_INITIAL_SECS",
                feed_defaults.push_retry_initial,
            ),
            push_retry_max: parse_duration_secs(
                &lookup,
                "DESK_PUSH_RETRY_MAX_SECS",
                feed_defaults.push_retry_max,
            ),
            heartbeat_interval: parse_duration_secs(
                &lookup,
                "DESK_HEARTBEAT_INTERVAL_SECS",
                feed_defaults.heartbeat_interval,
            ),
            heartbeat_timeout: parse_duration_secs(
                &lookup,
                "DESK_HEARTBEAT_TIMEOUT_SECS",
                feed_defaults.heartbeat_timeout,
            ),
        };

        let sync_defaults = SyncSettings::default();
        let sync = SyncSettings {
            debounce: parse_duration_millis(&lookup, "DESK_SYNC_DEBOUNCE_MS", sync_defaults.debounce),
            local_store_path: lookup("DESK_LOCAL_STORE_PATH")
                .filter(|path| !path.trim().is_empty())
                .map_or(sync_defaults.local_store_path, PathBuf::from),
        };

        let layout_defaults = LayoutSettings::default();
        let layout = LayoutSettings {
            gap_px: parse_f64(&lookup, "DESK_LAYOUT_GAP_PX", layout_defaults.gap_px).max(0.0),
            collapse_breakpoint_px: parse_u32(
                &lookup,
                "DESK_LAYOUT_BREAKPOINT_PX",
                layout_defaults.collapse_breakpoint_px,
            ),
        };

        let refresh_defaults = RefreshSettings::default();
        let refresh = RefreshSettings {
            quotes_interval: parse_duration_secs(
                &lookup,
                "DESK_REFRESH_QUOTES_SECS",
                refresh_defaults.quotes_interval,
            ),
            panels_interval: parse_duration_secs(
                &lookup,
                "DESK_REFRESH_PANELS_SECS",
                refresh_defaults.panels_interval,
            ),
        };

        let server = ServerSettings {
            http_port: parse_u16(&lookup, "DESK_HTTP_PORT", ServerSettings::default().http_port),
        };

        Ok(Self {
            hosting,
            api,
            feed,
            sync,
            layout,
            refresh,
            server,
        })
    }

    /// Whether the desk starts in authenticated mode.
    #[must_use]
    pub const fn is_authenticated(&self) -> bool {
        self.api.session_token.is_some()
    }
}

/// Configuration error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Environment variable has empty value.
    #[error("environment variable {0} cannot be empty")]
    EmptyValue(String),
    /// Environment variable has a value of the wrong shape.
    #[error("environment variable {key} has invalid value {value:?}: {reason}")]
    InvalidValue {
        /// Variable name.
        key: String,
        /// Offending value.
        value: String,
        /// What was expected.
        reason: String,
    },
}

fn validate_url(key: &str, raw: &str, schemes: &[&str]) -> Result<String, ConfigError> {
    let url = raw.trim().trim_end_matches('/');
    if url.is_empty() {
        return Err(ConfigError::EmptyValue(key.to_string()));
    }
    if !schemes.iter().any(|scheme| url.starts_with(scheme)) {
        return Err(ConfigError::InvalidValue {
            key: key.to_string(),
            value: raw.to_string(),
            reason: format!("expected a URL starting with {}", schemes.join(" or ")),
        });
    }
    Ok(url.to_string())
}

fn derive_push_url(base_url: &str) -> String {
    let ws_base = base_url
        .strip_prefix("https://")
        .map(|rest| format!("wss://{rest}"))
        .or_else(|| base_url.strip_prefix("http://").map(|rest| format!("ws://{rest}")))
        .unwrap_or_else(|| base_url.to_string());
    format!("{ws_base}/api/stream")
}

fn parse_u16<F: Fn(&str) -> Option<String>>(lookup: &F, key: &str, default: u16) -> u16 {
    lookup(key)
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

fn parse_u32<F: Fn(&str) -> Option<String>>(lookup: &F, key: &str, default: u32) -> u32 {
    lookup(key)
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

fn parse_f64<F: Fn(&str) -> Option<String>>(lookup: &F, key: &str, default: f64) -> f64 {
    lookup(key)
        .and_then(|v| v.trim().parse::<f64>().ok())
        .filter(|v| v.is_finite())
        .unwrap_or(default)
}

fn parse_duration_secs<F: Fn(&str) -> Option<String>>(
    lookup: &F,
    key: &str,
    default: Duration,
) -> Duration {
    lookup(key)
        .and_then(|v| v.trim().parse::<u64>().ok())
        .filter(|secs| *secs > 0)
        .map_or(default, Duration::from_secs)
}

fn parse_duration_millis<F: Fn(&str) -> Option<String>>(
    lookup: &F,
    key: &str,
    default: Duration,
) -> Duration {
    lookup(key)
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map_or(default, Duration::from_millis)
}
