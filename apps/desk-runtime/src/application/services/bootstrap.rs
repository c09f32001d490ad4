//! Bootstrap and Refresh Orchestration
//!
//! Every panel owns one independent load: a path plus query parameters
//! derived from the current preferences. Bootstrap fires them all at once;
//! each failure stays with its own panel. Background refresh re-fires the
//! fast and slow groups on their own intervals.

use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::join_all;
use serde::Serialize;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::application::ports::{FetchError, PanelFetcher, QueryParams};
use crate::application::state::DeskState;
use crate::domain::panel::PanelId;
use crate::domain::preferences::Preferences;
use crate::infrastructure::config::RefreshSettings;
use crate::infrastructure::metrics::{self, Outcome, RequestKind};

/// Refresh group of a panel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RefreshClass {
    /// Quote-driven panels.
    Fast,
    /// News, calendars, and other slow-moving panels.
    Slow,
}

/// One panel's load.
#[derive(Debug, Clone)]
pub struct PanelTask {
    /// Panel the data belongs to.
    pub panel: PanelId,
    /// API path.
    pub path: String,
    /// Query builder over the current preferences.
    pub query: fn(&Preferences) -> QueryParams,
    /// Refresh group.
    pub refresh: RefreshClass,
}

impl PanelTask {
    /// Create a task.
    #[must_use]
    pub fn new(
        panel: &str,
        path: &str,
        refresh: RefreshClass,
        query: fn(&Preferences) -> QueryParams,
    ) -> Self {
        Self {
            panel: panel.to_string(),
            path: path.to_string(),
            query,
            refresh,
        }
    }
}

fn param(name: &str, value: impl Into<String>) -> (String, String) {
    (name.to_string(), value.into())
}

fn joined<'a>(values: impl IntoIterator<Item = &'a String>) -> String {
    values
        .into_iter()
        .map(String::as_str)
        .collect::<Vec<_>>()
        .join(",")
}

const fn no_query(_: &Preferences) -> QueryParams {
    Vec::new()
}

fn watchlist_query(p: &Preferences) -> QueryParams {
    vec![param("symbols", joined(&p.watchlist_symbols))]
}

fn detail_query(p: &Preferences) -> QueryParams {
    vec![param("symbol", p.detail_symbol.clone())]
}

fn crypto_query(p: &Preferences) -> QueryParams {
    vec![param("products", joined(&p.crypto_products()))]
}

fn sector_query(p: &Preferences) -> QueryParams {
    p.sector_focus
        .iter()
        .map(|sector| param("focus", sector.clone()))
        .collect()
}

fn screener_query(p: &Preferences) -> QueryParams {
    let config = &p.screen_config;
    let mut query = vec![
        param("preset", config.preset.clone()),
        param("sortBy", config.sort_by.clone()),
        param("limit", config.limit.to_string()),
    ];
    if let Some(cap) = config.min_market_cap {
        query.push(param("minMarketCap", cap.to_string()));
    }
    if !config.sectors.is_empty() {
        query.push(param("sectors", joined(&config.sectors)));
    }
    query
}

fn compare_query(p: &Preferences) -> QueryParams {
    vec![
        param("symbols", joined(&p.compare_config.symbols)),
        param("range", p.compare_config.range.clone()),
    ]
}

fn portfolio_query(p: &Preferences) -> QueryParams {
    vec![param(
        "symbols",
        joined(p.portfolio.iter().map(|position| &position.symbol)),
    )]
}

fn alerts_query(p: &Preferences) -> QueryParams {
    vec![param(
        "symbols",
        joined(p.price_alerts.iter().map(|alert| &alert.symbol)),
    )]
}

/// Loads for the standard panel universe.
#[must_use]
pub fn standard_tasks() -> Vec<PanelTask> {
    use RefreshClass::{Fast, Slow};
    vec![
        PanelTask::new("watchlist", "/api/quotes", Fast, watchlist_query),
        PanelTask::new("detail", "/api/quote", Fast, detail_query),
        PanelTask::new("crypto", "/api/crypto", Fast, crypto_query),
        PanelTask::new("news", "/api/news", Slow, watchlist_query),
        PanelTask::new("breadth", "/api/breadth", Fast, no_query),
        PanelTask::new("heatmap", "/api/heatmap", Fast, no_query),
        PanelTask::new("sectors", "/api/sectors", Fast, sector_query),
        PanelTask::new("screener", "/api/screener", Slow, screener_query),
        PanelTask::new("calendar", "/api/calendar", Slow, no_query),
        PanelTask::new("compare", "/api/compare", Slow, compare_query),
        PanelTask::new("relationships", "/api/relationships", Slow, detail_query),
        PanelTask::new("portfolio", "/api/quotes", Fast, portfolio_query),
        PanelTask::new("alerts", "/api/quotes", Fast, alerts_query),
    ]
}

/// Outcome of a batch of loads.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BootstrapReport {
    /// Panels that loaded.
    pub succeeded: Vec<PanelId>,
    /// Panels that failed, with their error messages.
    pub failed: Vec<(PanelId, String)>,
}

impl BootstrapReport {
    /// Whether every panel loaded.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Fires panel loads into the desk state.
pub struct BootstrapOrchestrator {
    state: Arc<DeskState>,
    fetcher: Arc<dyn PanelFetcher>,
    tasks: Vec<PanelTask>,
}

impl std::fmt::Debug for BootstrapOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BootstrapOrchestrator")
            .field("tasks", &self.tasks.len())
            .finish_non_exhaustive()
    }
}

impl BootstrapOrchestrator {
    /// Create an orchestrator. Tasks for panels outside the universe are
    /// ignored.
    #[must_use]
    pub fn new(state: Arc<DeskState>, fetcher: Arc<dyn PanelFetcher>, tasks: Vec<PanelTask>) -> Self {
        let tasks = tasks
            .into_iter()
            .filter(|task| state.universe().contains(&task.panel))
            .collect();
        Self {
            state,
            fetcher,
            tasks,
        }
    }

    /// Load every panel concurrently.
    pub async fn run_all(&self) -> BootstrapReport {
        let report = self.run(self.tasks.iter()).await;
        tracing::info!(
            succeeded = report.succeeded.len(),
            failed = report.failed.len(),
            "Bootstrap complete"
        );
        report
    }

    /// Load the panels of one refresh group.
    pub async fn run_class(&self, class: RefreshClass) -> BootstrapReport {
        self.run(self.tasks.iter().filter(|task| task.refresh == class))
            .await
    }

    /// Load one panel by id. Returns `None` for panels without a task.
    pub async fn run_panel(&self, panel: &str) -> Option<Result<(), FetchError>> {
        let task = self.tasks.iter().find(|task| task.panel == panel)?;
        Some(self.load(task).await)
    }

    async fn run<'a>(&self, tasks: impl Iterator<Item = &'a PanelTask>) -> BootstrapReport {
        let outcomes = join_all(tasks.map(|task| async move { (task, self.load(task).await) })).await;

        let mut report = BootstrapReport::default();
        for (task, outcome) in outcomes {
            match outcome {
                Ok(()) => report.succeeded.push(task.panel.clone()),
                Err(e) => report.failed.push((task.panel.clone(), e.to_string())),
            }
        }
        report
    }

    async fn load(&self, task: &PanelTask) -> Result<(), FetchError> {
        let query = self.state.with_preferences(task.query);
        let started = Instant::now();
        let result = self.fetcher.fetch_json(&task.path, &query).await;
        metrics::record_request_duration(RequestKind::Panel, started.elapsed());
        metrics::record_bootstrap_task(&task.panel, Outcome::of(&result));

        match result {
            Ok(data) => {
                self.state.set_panel_data(&task.panel, data);
                Ok(())
            }
            Err(e) => {
                tracing::warn!(panel = %task.panel, error = %e, "Panel load failed");
                self.state.set_panel_error(&task.panel, &e.to_string());
                Err(e)
            }
        }
    }

    /// Re-run the fast and slow groups on their intervals until cancelled.
    #[must_use]
    pub fn spawn_refresh(
        self: &Arc<Self>,
        settings: RefreshSettings,
        cancel: &CancellationToken,
    ) -> Vec<JoinHandle<()>> {
        [
            (RefreshClass::Fast, settings.quotes_interval),
            (RefreshClass::Slow, settings.panels_interval),
        ]
        .into_iter()
        .map(|(class, every)| {
            let orchestrator = Arc::clone(self);
            let cancel = cancel.clone();
            tokio::spawn(async move { orchestrator.refresh_loop(class, every, cancel).await })
        })
        .collect()
    }

    async fn refresh_loop(&self, class: RefreshClass, every: Duration, cancel: CancellationToken) {
        let mut interval = tokio::time::interval_at(tokio::time::Instant::now() + every, every);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                () = cancel.cancelled() => {
                    tracing::debug!(?class, "Refresh loop cancelled");
                    break;
                }
                _ = interval.tick() => {
                    let report = self.run_class(class).await;
                    tracing::debug!(
                        ?class,
                        succeeded = report.succeeded.len(),
                        failed = report.failed.len(),
                        "Refresh complete"
                    );
                }
            }
        }
    }
}
