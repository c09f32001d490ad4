//! Focus Context Loading
//!
//! Loads the context behind a focus target (heatmap symbol, sector) while
//! guarding against out-of-order responses. A cache hit renders immediately
//! without issuing a token; a fetch renders only if its token is still
//! current when it completes. Stale results, including stale errors, are
//! dropped and never cached.

use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;
use serde_json::Value;

use crate::application::ports::ContextFetcher;
use crate::application::state::{DeskState, FocusView};
use crate::domain::focus::{ContextCache, ContextGuard, FocusFamily};
use crate::infrastructure::metrics::{self, RequestKind};

/// How a focus request ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FocusOutcome {
    /// Rendered from the result cache.
    Cached,
    /// Fetched and rendered.
    Fresh,
    /// The fetch failed and the error was rendered.
    Failed(String),
    /// Superseded before completing; nothing was rendered.
    Discarded,
}

/// Focus loader shared by all focus families.
pub struct FocusLoader {
    state: Arc<DeskState>,
    fetcher: Arc<dyn ContextFetcher>,
    guard: Mutex<ContextGuard>,
    cache: Mutex<ContextCache<Value>>,
}

impl std::fmt::Debug for FocusLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FocusLoader")
            .field("cached", &self.cache.lock().len())
            .finish_non_exhaustive()
    }
}

impl FocusLoader {
    /// Create a loader.
    #[must_use]
    pub fn new(state: Arc<DeskState>, fetcher: Arc<dyn ContextFetcher>) -> Self {
        Self {
            state,
            fetcher,
            guard: Mutex::new(ContextGuard::new()),
            cache: Mutex::new(ContextCache::new()),
        }
    }

    /// Focus `target` in `family`, fetching unless cached (or `force`d).
    pub async fn focus(&self, family: FocusFamily, target: &str, force: bool) -> FocusOutcome {
        if !force {
            let cached = self.cache.lock().get(family, target);
            if let Some(data) = cached {
                self.guard.lock().set_live_target(family, target);
                self.state.set_focus_view(
                    family,
                    FocusView::Ready {
                        target: target.to_string(),
                        data,
                        cached: true,
                    },
                );
                return FocusOutcome::Cached;
            }
        }

        let token = self.guard.lock().begin_request(family, target);
        self.state.set_focus_view(
            family,
            FocusView::Loading {
                target: target.to_string(),
            },
        );

        let started = Instant::now();
        let result = self.fetcher.fetch_context(family, target).await;
        metrics::record_request_duration(RequestKind::Context, started.elapsed());

        // Hold the guard while rendering so a newer request cannot slip in
        // between the currency check and the write.
        let guard = self.guard.lock();
        if !guard.is_current(&token) {
            drop(guard);
            metrics::record_stale_response(family);
            tracing::debug!(family = %family, target, token = token.value, "Stale focus response discarded");
            return FocusOutcome::Discarded;
        }

        match result {
            Ok(data) => {
                self.cache.lock().insert(family, target, data.clone());
                self.state.set_focus_view(
                    family,
                    FocusView::Ready {
                        target: target.to_string(),
                        data,
                        cached: false,
                    },
                );
                FocusOutcome::Fresh
            }
            Err(e) => {
                let message = e.to_string();
                tracing::warn!(family = %family, target, error = %message, "Focus fetch failed");
                self.state.set_focus_view(
                    family,
                    FocusView::Failed {
                        target: target.to_string(),
                        message: message.clone(),
                    },
                );
                FocusOutcome::Failed(message)
            }
        }
    }

    /// Live focus target of a family.
    #[must_use]
    pub fn live_target(&self, family: FocusFamily) -> Option<String> {
        self.guard.lock().live_target(family).map(str::to_string)
    }

    /// Drop every cached context.
    pub fn clear_cache(&self) {
        self.cache.lock().clear();
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use async_trait::async_trait;
    use serde_json::json;

    use super::*;
    use crate::application::events::EventHub;
    use crate::application::ports::{FetchError, MockContextFetcher};
    use crate::domain::panel::PanelUniverse;

    /// Answers after a per-target delay.
    struct SlowFetcher;

    #[async_trait]
    impl ContextFetcher for SlowFetcher {
        async fn fetch_context(&self, _family: FocusFamily, target: &str) -> Result<Value, FetchError> {
            let delay = if target == "AAPL" { 120 } else { 10 };
            tokio::time::sleep(Duration::from_millis(delay)).await;
            if target == "FAIL" {
                return Err(FetchError::Status {
                    status: 404,
                    message: "no relationships for FAIL".to_string(),
                });
            }
            Ok(json!({ "symbol": target }))
        }
    }

    fn desk() -> Arc<DeskState> {
        Arc::new(DeskState::new(
            PanelUniverse::standard(),
            Arc::new(EventHub::with_defaults()),
        ))
    }

    #[tokio::test]
    async fn slow_then_fast_renders_only_the_newest() {
        let state = desk();
        let loader = FocusLoader::new(Arc::clone(&state), Arc::new(SlowFetcher));

        let slow = loader.focus(FocusFamily::HeatmapSymbol, "AAPL", false);
        let fast = async {
            tokio::time::sleep(Duration::from_millis(20)).await;
            loader.focus(FocusFamily::HeatmapSymbol, "MSFT", false).await
        };
        let (slow, fast) = tokio::join!(slow, fast);

        assert_eq!(slow, FocusOutcome::Discarded);
        assert_eq!(fast, FocusOutcome::Fresh);
        assert_eq!(
            state.focus_view(FocusFamily::HeatmapSymbol),
            Some(FocusView::Ready {
                target: "MSFT".to_string(),
                data: json!({ "symbol": "MSFT" }),
                cached: false,
            })
        );
    }

    #[tokio::test]
    async fn cache_hit_skips_fetch_and_supersedes_in_flight() {
        let state = desk();
        let loader = FocusLoader::new(Arc::clone(&state), Arc::new(SlowFetcher));
        assert_eq!(
            loader.focus(FocusFamily::Sector, "Energy", false).await,
            FocusOutcome::Fresh
        );

        let slow = loader.focus(FocusFamily::Sector, "AAPL", false);
        let cached = async {
            tokio::time::sleep(Duration::from_millis(20)).await;
            loader.focus(FocusFamily::Sector, "Energy", false).await
        };
        let (slow, cached) = tokio::join!(slow, cached);

        assert_eq!(slow, FocusOutcome::Discarded);
        assert_eq!(cached, FocusOutcome::Cached);
        assert_eq!(loader.live_target(FocusFamily::Sector).as_deref(), Some("Energy"));
    }

    #[tokio::test]
    async fn current_error_is_rendered_stale_error_is_not() {
        let state = desk();
        let loader = FocusLoader::new(Arc::clone(&state), Arc::new(SlowFetcher));

        let outcome = loader.focus(FocusFamily::HeatmapSymbol, "FAIL", false).await;
        assert_eq!(
            outcome,
            FocusOutcome::Failed("no relationships for FAIL".to_string())
        );
        assert!(matches!(
            state.focus_view(FocusFamily::HeatmapSymbol),
            Some(FocusView::Failed { .. })
        ));

        let failing = loader.focus(FocusFamily::HeatmapSymbol, "FAIL", true);
        let newer = async {
            tokio::time::sleep(Duration::from_millis(2)).await;
            loader.focus(FocusFamily::HeatmapSymbol, "AAPL", false).await
        };
        let (failing, _) = tokio::join!(failing, newer);
        assert_eq!(failing, FocusOutcome::Discarded);
    }

    #[tokio::test]
    async fn families_are_independent_and_force_refetches() {
        let mut fetcher = MockContextFetcher::new();
        fetcher
            .expect_fetch_context()
            .times(3)
            .returning(|family, target| Ok(json!({ "family": family.as_str(), "target": target })));
        let loader = FocusLoader::new(desk(), Arc::new(fetcher));

        loader.focus(FocusFamily::Sector, "Tech", false).await;
        loader.focus(FocusFamily::HeatmapSymbol, "Tech", false).await;
        assert_eq!(
            loader.focus(FocusFamily::Sector, "Tech", false).await,
            FocusOutcome::Cached
        );
        assert_eq!(
            loader.focus(FocusFamily::Sector, "Tech", true).await,
            FocusOutcome::Fresh
        );

        loader.clear_cache();
    }
}
