//! Desk Runtime
//!
//! The facade the binary and embedders drive. It owns the shared state and
//! every service, and keeps the live feeds in line with the preferences:
//! the crypto ticker runs while the active page hosts the crypto panel, and
//! the activity stream runs while a user is signed in.

use std::sync::Arc;

use parking_lot::Mutex;
use rust_decimal::Decimal;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::events::{ChangeReason, SharedEventHub};
use super::ports::{ContextFetcher, FeedPoller, LocalStore, PanelFetcher, ProfileApi, PushTransport, TickSink};
use super::services::{
    AuthMode, BootstrapOrchestrator, BootstrapReport, FeedConnectionManager, FocusLoader,
    FocusOutcome, LayoutEngine, PreferenceSync, SyncError, standard_tasks,
};
use super::state::{DeskSnapshot, DeskState};
use crate::domain::alerts::{AlertDirection, PriceAlert};
use crate::domain::feed::{SubscriptionKey, Topic};
use crate::domain::focus::FocusFamily;
use crate::domain::panel::PanelUniverse;
use crate::domain::preferences::PortfolioPosition;
use crate::domain::quote::normalize_symbol;
use crate::infrastructure::config::DeskConfig;

/// Products streamed when the watchlist holds none.
pub const DEFAULT_CRYPTO_PRODUCTS: [&str; 2] = ["BTC-USD", "ETH-USD"];

/// Panel whose page gates the crypto ticker.
const CRYPTO_PANEL: &str = "crypto";

/// External collaborators of the runtime.
#[derive(Clone)]
pub struct DeskPorts {
    /// Panel data reads.
    pub panels: Arc<dyn PanelFetcher>,
    /// Focus context reads.
    pub context: Arc<dyn ContextFetcher>,
    /// Polling fallback.
    pub poller: Arc<dyn FeedPoller>,
    /// Push transport, if one exists.
    pub push: Option<Arc<dyn PushTransport>>,
    /// Server-side profile.
    pub profile: Arc<dyn ProfileApi>,
    /// Local guest storage.
    pub local: Arc<dyn LocalStore>,
}

impl std::fmt::Debug for DeskPorts {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeskPorts")
            .field("push", &self.push.is_some())
            .finish_non_exhaustive()
    }
}

/// The live desk.
pub struct DeskRuntime {
    config: DeskConfig,
    state: Arc<DeskState>,
    sync: Arc<PreferenceSync>,
    layout: LayoutEngine,
    focus: FocusLoader,
    feeds: FeedConnectionManager,
    bootstrap: Arc<BootstrapOrchestrator>,
    shutdown: CancellationToken,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl std::fmt::Debug for DeskRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeskRuntime")
            .field("mode", &self.sync.mode())
            .field("feeds", &self.feeds)
            .finish_non_exhaustive()
    }
}

impl DeskRuntime {
    /// Wire the runtime over the standard panel universe.
    ///
    /// The push transport is dropped when the hosting target or the feed
    /// settings disallow it.
    #[must_use]
    pub fn new(config: DeskConfig, ports: DeskPorts, events: SharedEventHub) -> Self {
        Self::with_universe(config, ports, events, PanelUniverse::standard())
    }

    /// Wire the runtime over a custom panel universe.
    #[must_use]
    pub fn with_universe(
        config: DeskConfig,
        ports: DeskPorts,
        events: SharedEventHub,
        universe: PanelUniverse,
    ) -> Self {
        let shutdown = CancellationToken::new();
        let state = Arc::new(DeskState::new(universe, events));

        let sync = Arc::new(PreferenceSync::new(
            Arc::clone(&state),
            ports.local,
            ports.profile,
            config.sync.debounce,
        ));
        let layout = LayoutEngine::new(Arc::clone(&state), Arc::clone(&sync), config.layout);
        let focus = FocusLoader::new(Arc::clone(&state), ports.context);

        let push = ports
            .push
            .filter(|_| config.hosting.push_allowed() && config.feed.push_enabled);
        let sink: Arc<dyn TickSink> = Arc::clone(&state) as Arc<dyn TickSink>;
        let feeds = FeedConnectionManager::new(
            push,
            ports.poller,
            sink,
            config.feed,
            shutdown.child_token(),
        );
        let bootstrap = Arc::new(BootstrapOrchestrator::new(
            Arc::clone(&state),
            ports.panels,
            standard_tasks(),
        ));

        Self {
            config,
            state,
            sync,
            layout,
            focus,
            feeds,
            bootstrap,
            shutdown,
            tasks: Mutex::new(Vec::new()),
        }
    }

    /// Load the session's preferences, start feeds and background work, and
    /// run the initial bootstrap.
    ///
    /// With a session token the profile is loaded; if that fails the desk
    /// runs as a guest.
    pub async fn start(&self) -> BootstrapReport {
        let guest = self.sync.load_guest();
        self.state
            .replace_preferences(guest, ChangeReason::SessionStart);

        if self.config.is_authenticated()
            && let Err(e) = self.sync.sign_in().await
        {
            tracing::warn!(error = %e, "Starting as guest");
        }

        {
            let mut tasks = self.tasks.lock();
            tasks.extend(self.sync.start(self.shutdown.child_token()));
            tasks.extend(
                self.bootstrap
                    .spawn_refresh(self.config.refresh, &self.shutdown),
            );
        }

        self.reconcile_feeds().await;
        self.bootstrap.run_all().await
    }

    /// Stop feeds and background work, flushing a pending write.
    pub async fn shutdown(&self) {
        self.feeds.disconnect_all().await;
        self.shutdown.cancel();

        let tasks: Vec<_> = self.tasks.lock().drain(..).collect();
        for task in tasks {
            if let Err(e) = task.await {
                tracing::warn!(error = %e, "Background task ended abnormally");
            }
        }
        tracing::info!("Desk runtime stopped");
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    /// Shared desk state.
    #[must_use]
    pub const fn state(&self) -> &Arc<DeskState> {
        &self.state
    }

    /// Event hub.
    #[must_use]
    pub fn events(&self) -> &SharedEventHub {
        self.state.events()
    }

    /// Layout engine for drag and resize gestures.
    #[must_use]
    pub const fn layout(&self) -> &LayoutEngine {
        &self.layout
    }

    /// Feed connections.
    #[must_use]
    pub const fn feeds(&self) -> &FeedConnectionManager {
        &self.feeds
    }

    /// Persistence mode.
    #[must_use]
    pub fn auth_mode(&self) -> AuthMode {
        self.sync.mode()
    }

    /// Read-side snapshot for a viewport width.
    #[must_use]
    pub fn snapshot(&self, viewport_px: u32) -> DeskSnapshot {
        self.state.snapshot(
            self.layout.placements(viewport_px),
            viewport_px,
            self.layout.is_collapsed(viewport_px),
        )
    }

    // =========================================================================
    // Watchlist and Navigation
    // =========================================================================

    /// Add a symbol to the watchlist. Returns `false` for invalid or
    /// already-watched symbols.
    pub async fn add_symbol(&self, raw: &str) -> bool {
        let Some(symbol) = normalize_symbol(raw) else {
            return false;
        };
        let changed = self.sync.schedule(|p| {
            if !p.watchlist_symbols.contains(&symbol) {
                p.watchlist_symbols.push(symbol);
            }
        });
        if changed {
            self.after_watchlist_change().await;
        }
        changed
    }

    /// Remove a symbol from the watchlist.
    pub async fn remove_symbol(&self, raw: &str) -> bool {
        let Some(symbol) = normalize_symbol(raw) else {
            return false;
        };
        let changed = self
            .sync
            .schedule(|p| p.watchlist_symbols.retain(|s| *s != symbol));
        if changed {
            self.after_watchlist_change().await;
        }
        changed
    }

    async fn after_watchlist_change(&self) {
        self.reconcile_feeds().await;
        let _ = self.bootstrap.run_panel("watchlist").await;
    }

    /// Make `page` the active page. Unknown pages are ignored.
    pub async fn switch_page(&self, page: &str) -> bool {
        if !self.state.universe().has_page(page) {
            return false;
        }
        let changed = self.sync.schedule(|p| p.active_page = page.to_string());
        if changed {
            self.reconcile_feeds().await;
        }
        changed
    }

    /// Show `raw` in the detail panel.
    pub async fn set_detail_symbol(&self, raw: &str) -> bool {
        let Some(symbol) = normalize_symbol(raw) else {
            return false;
        };
        let changed = self.sync.schedule(|p| p.detail_symbol = symbol);
        if changed {
            let _ = tokio::join!(
                self.bootstrap.run_panel("detail"),
                self.bootstrap.run_panel("relationships"),
            );
        }
        changed
    }

    // =========================================================================
    // Focus
    // =========================================================================

    /// Focus a heatmap symbol.
    pub async fn focus_symbol(&self, symbol: &str, force: bool) -> FocusOutcome {
        self.focus
            .focus(FocusFamily::HeatmapSymbol, symbol, force)
            .await
    }

    /// Focus a sector. The choice is also stored in the preferences.
    pub async fn focus_sector(&self, sector: &str, force: bool) -> FocusOutcome {
        let sector = sector.trim();
        self.sync
            .schedule(|p| p.sector_focus = Some(sector.to_string()));
        self.focus.focus(FocusFamily::Sector, sector, force).await
    }

    // =========================================================================
    // Alerts and Portfolio
    // =========================================================================

    /// Add a price alert. Returns its id, or `None` for an invalid symbol.
    pub fn add_alert(
        &self,
        symbol: &str,
        direction: AlertDirection,
        threshold: Decimal,
    ) -> Option<String> {
        let alert = PriceAlert::new(normalize_symbol(symbol)?, direction, threshold);
        let id = alert.id.clone();
        self.sync.schedule(move |p| p.price_alerts.push(alert));
        Some(id)
    }

    /// Remove the alert with `id`.
    pub fn remove_alert(&self, id: &str) -> bool {
        self.sync.schedule(|p| p.price_alerts.retain(|a| a.id != id))
    }

    /// Add a portfolio position. Returns its id, or `None` for an invalid
    /// symbol.
    pub fn add_position(&self, symbol: &str, quantity: Decimal, cost: Decimal) -> Option<String> {
        let position = PortfolioPosition {
            id: uuid::Uuid::new_v4().to_string(),
            symbol: normalize_symbol(symbol)?,
            quantity,
            cost,
        };
        let id = position.id.clone();
        self.sync.schedule(move |p| p.portfolio.push(position));
        Some(id)
    }

    /// Remove the position with `id`.
    pub fn remove_position(&self, id: &str) -> bool {
        self.sync.schedule(|p| p.portfolio.retain(|pos| pos.id != id))
    }

    // =========================================================================
    // Persistence and Session
    // =========================================================================

    /// Save now, reporting the outcome as a notice.
    ///
    /// # Errors
    ///
    /// Returns the persistence error.
    pub async fn save_now(&self) -> Result<(), SyncError> {
        self.sync.sync_now(true).await
    }

    /// Sign in and reload the desk from the profile.
    ///
    /// # Errors
    ///
    /// Returns the profile fetch error; the desk stays in guest mode.
    pub async fn sign_in(&self) -> Result<BootstrapReport, SyncError> {
        self.sync.sign_in().await?;
        Ok(self.reload().await)
    }

    /// Sign out and reload the desk from the guest copy.
    pub async fn sign_out(&self) -> BootstrapReport {
        self.sync.sign_out();
        self.reload().await
    }

    /// Save the current desk as a named workspace.
    ///
    /// # Errors
    ///
    /// Fails on an invalid name.
    pub fn save_workspace(&self, name: &str) -> Result<(), SyncError> {
        self.sync.save_workspace(name)
    }

    /// Delete a named workspace.
    ///
    /// # Errors
    ///
    /// Fails if no such workspace exists.
    pub fn delete_workspace(&self, name: &str) -> Result<(), SyncError> {
        self.sync.delete_workspace(name)
    }

    /// Replace the desk with a named workspace and reload every panel.
    ///
    /// # Errors
    ///
    /// Fails if no such workspace exists.
    pub async fn load_workspace(&self, name: &str) -> Result<BootstrapReport, SyncError> {
        self.layout.cancel();
        self.sync.load_workspace(name)?;
        Ok(self.reload().await)
    }

    async fn reload(&self) -> BootstrapReport {
        self.focus.clear_cache();
        self.reconcile_feeds().await;
        self.bootstrap.run_all().await
    }

    // =========================================================================
    // Feeds
    // =========================================================================

    /// Connect or disconnect each topic to match the current preferences
    /// and session.
    pub async fn reconcile_feeds(&self) {
        let (on_crypto_page, products) = self.state.with_preferences(|p| {
            let on_page = self.state.universe().page_of(CRYPTO_PANEL) == Some(p.active_page.as_str());
            (on_page, p.crypto_products())
        });

        if on_crypto_page {
            let key = if products.is_empty() {
                SubscriptionKey::new(DEFAULT_CRYPTO_PRODUCTS)
            } else {
                SubscriptionKey::new(products)
            };
            self.feeds.connect(Topic::CryptoTicker, key).await;
        } else {
            self.feeds.disconnect(Topic::CryptoTicker).await;
        }

        if self.sync.mode() == AuthMode::Authenticated {
            self.feeds
                .connect(Topic::Activity, SubscriptionKey::unkeyed())
                .await;
        } else {
            self.feeds.disconnect(Topic::Activity).await;
        }
    }
}
