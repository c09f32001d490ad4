//! Focus Tokens and Stale-Response Guarding
//!
//! When the user flips focus quickly (heatmap symbol A, then B), responses
//! can arrive out of order. Each focus family keeps a monotonically
//! increasing counter and the live focus target. A response applies only if
//! its token is still the newest one issued for the family **and** the live
//! target still equals the target captured when the request began.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// A group of focus targets sharing one token counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FocusFamily {
    /// Symbol selected on the heatmap; drives the relationship context.
    HeatmapSymbol,
    /// Sector selected on the sector panels.
    Sector,
}

impl FocusFamily {
    /// Stable name used in logs and metrics.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::HeatmapSymbol => "heatmap-symbol",
            Self::Sector => "sector",
        }
    }
}

impl fmt::Display for FocusFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Proof of which request a response belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextToken {
    /// Family the request was issued for.
    pub family: FocusFamily,
    /// Counter value at issue time.
    pub value: u64,
    /// Focus target at issue time.
    pub target: String,
}

#[derive(Debug, Default)]
struct FamilyState {
    counter: u64,
    live_target: Option<String>,
}

/// Per-family token counters and live focus targets.
#[derive(Debug, Default)]
pub struct ContextGuard {
    families: HashMap<FocusFamily, FamilyState>,
}

impl ContextGuard {
    /// Create a guard with no requests issued.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a request for `target`, superseding every earlier request of
    /// the family. The target becomes the live focus.
    pub fn begin_request(&mut self, family: FocusFamily, target: &str) -> ContextToken {
        let state = self.families.entry(family).or_default();
        state.counter += 1;
        state.live_target = Some(target.to_string());
        ContextToken {
            family,
            value: state.counter,
            target: target.to_string(),
        }
    }

    /// Move the live focus without issuing a request (cache hits).
    ///
    /// The counter is left alone; an in-flight request for another target
    /// still becomes stale because its target no longer matches.
    pub fn set_live_target(&mut self, family: FocusFamily, target: &str) {
        self.families.entry(family).or_default().live_target = Some(target.to_string());
    }

    /// Whether a response carrying `token` may still be applied.
    #[must_use]
    pub fn is_current(&self, token: &ContextToken) -> bool {
        self.families.get(&token.family).is_some_and(|state| {
            state.counter == token.value && state.live_target.as_deref() == Some(token.target.as_str())
        })
    }

    /// Live focus target of a family.
    #[must_use]
    pub fn live_target(&self, family: FocusFamily) -> Option<&str> {
        self.families.get(&family)?.live_target.as_deref()
    }

    /// Newest counter value issued for a family.
    #[must_use]
    pub fn current_value(&self, family: FocusFamily) -> u64 {
        self.families.get(&family).map_or(0, |state| state.counter)
    }
}

/// Per-family, per-target result cache.
#[derive(Debug)]
pub struct ContextCache<T> {
    entries: HashMap<(FocusFamily, String), T>,
}

impl<T> Default for ContextCache<T> {
    fn default() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }
}

impl<T: Clone> ContextCache<T> {
    /// Create an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached result for a target.
    #[must_use]
    pub fn get(&self, family: FocusFamily, target: &str) -> Option<T> {
        self.entries.get(&(family, target.to_string())).cloned()
    }

    /// Store a result.
    pub fn insert(&mut self, family: FocusFamily, target: &str, value: T) {
        self.entries.insert((family, target.to_string()), value);
    }

    /// Drop every cached result.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Number of cached results.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the cache is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn newer_request_supersedes_older() {
        let mut guard = ContextGuard::new();
        let a = guard.begin_request(FocusFamily::HeatmapSymbol, "AAPL");
        let b = guard.begin_request(FocusFamily::HeatmapSymbol, "MSFT");

        assert!(!guard.is_current(&a));
        assert!(guard.is_current(&b));
        assert_eq!(guard.current_value(FocusFamily::HeatmapSymbol), 2);
    }

    #[test]
    fn families_are_independent() {
        let mut guard = ContextGuard::new();
        let symbol = guard.begin_request(FocusFamily::HeatmapSymbol, "AAPL");
        let sector = guard.begin_request(FocusFamily::Sector, "Energy");

        assert!(guard.is_current(&symbol));
        assert!(guard.is_current(&sector));
    }

    #[test]
    fn live_target_change_invalidates_without_new_token() {
        let mut guard = ContextGuard::new();
        let a = guard.begin_request(FocusFamily::Sector, "Energy");

        guard.set_live_target(FocusFamily::Sector, "Utilities");

        assert!(!guard.is_current(&a));
        assert_eq!(guard.current_value(FocusFamily::Sector), 1);
        assert_eq!(guard.live_target(FocusFamily::Sector), Some("Utilities"));
    }

    #[test]
    fn returning_to_target_does_not_revive_old_token() {
        let mut guard = ContextGuard::new();
        let first = guard.begin_request(FocusFamily::HeatmapSymbol, "AAPL");
        let _second = guard.begin_request(FocusFamily::HeatmapSymbol, "MSFT");
        let third = guard.begin_request(FocusFamily::HeatmapSymbol, "AAPL");

        assert!(!guard.is_current(&first));
        assert!(guard.is_current(&third));
    }

    #[test]
    fn unknown_family_is_never_current() {
        let guard = ContextGuard::new();
        let token = ContextToken {
            family: FocusFamily::Sector,
            value: 0,
            target: String::new(),
        };
        assert!(!guard.is_current(&token));
    }

    #[test]
    fn cache_keys_by_family_and_target() {
        let mut cache = ContextCache::new();
        cache.insert(FocusFamily::Sector, "Energy", 1);
        cache.insert(FocusFamily::HeatmapSymbol, "Energy", 2);

        assert_eq!(cache.get(FocusFamily::Sector, "Energy"), Some(1));
        assert_eq!(cache.get(FocusFamily::HeatmapSymbol, "Energy"), Some(2));
        cache.clear();
        assert!(cache.is_empty());
    }
}
