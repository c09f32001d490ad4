//! Preferences
//!
//! The canonical, in-memory user configuration. Stored documents (local
//! guest data, server profiles, workspace snapshots) are parsed leniently:
//! every field is read on its own and falls back to its default when
//! missing or malformed, so a bad sub-object never fails the whole document.
//!
//! All invariants are re-established by [`Preferences::normalize`], which
//! runs on every external read and after every in-memory mutation.

mod config;

use std::collections::{BTreeMap, HashSet};

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::alerts::{PriceAlert, decimal_from_value};
use crate::domain::panel::{PageId, PagePlacement, PanelId, PanelUniverse, parse_overrides};
use crate::domain::quote::{Symbol, normalize_symbol};
use crate::domain::workspace::WorkspaceSnapshot;

pub use config::{CompareConfig, ScreenConfig};

/// Symbol shown in the detail panel when nothing else is stored.
pub const DEFAULT_DETAIL_SYMBOL: &str = "SPY";

/// Watchlist for a fresh guest.
pub const DEFAULT_WATCHLIST: [&str; 7] = ["SPY", "QQQ", "AAPL", "MSFT", "NVDA", "BTC-USD", "ETH-USD"];

/// Largest watchlist kept.
pub const MAX_WATCHLIST: usize = 50;

// =============================================================================
// Portfolio
// =============================================================================

/// One holding in the user's paper portfolio.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PortfolioPosition {
    /// Position identifier.
    pub id: String,
    /// Held symbol.
    pub symbol: Symbol,
    /// Quantity held.
    pub quantity: Decimal,
    /// Cost basis per unit.
    pub cost: Decimal,
}

impl PortfolioPosition {
    /// Parse a stored position. Entries without a usable symbol are dropped;
    /// entries without an id receive a fresh one.
    #[must_use]
    pub fn from_value(value: &Value) -> Option<Self> {
        let object = value.as_object()?;
        let symbol = object.get("symbol").and_then(Value::as_str).and_then(normalize_symbol)?;
        let id = object
            .get("id")
            .and_then(Value::as_str)
            .filter(|id| !id.trim().is_empty())
            .map_or_else(|| uuid::Uuid::new_v4().to_string(), str::to_string);
        let quantity = object
            .get("quantity")
            .and_then(decimal_from_value)
            .unwrap_or_default();
        let cost = object
            .get("cost")
            .and_then(decimal_from_value)
            .filter(|cost| !cost.is_sign_negative())
            .unwrap_or_default();

        Some(Self {
            id,
            symbol,
            quantity,
            cost,
        })
    }
}

// =============================================================================
// Preferences
// =============================================================================

/// The canonical user configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Preferences {
    /// Watched symbols in display order.
    pub watchlist_symbols: Vec<Symbol>,
    /// Global panel order; always a permutation of the universe.
    pub panel_layout: Vec<PanelId>,
    /// Column span per panel; always within `[3, 12]`.
    pub panel_sizes: BTreeMap<PanelId, u8>,
    /// Symbol shown in the detail panel.
    pub detail_symbol: Symbol,
    /// Sector the sector panels are focused on.
    pub sector_focus: Option<String>,
    /// Page currently shown.
    pub active_page: PageId,
    /// Per-page placement overrides.
    #[serde(default)]
    pub page_overrides: BTreeMap<PageId, BTreeMap<PanelId, PagePlacement>>,
    /// Screener settings.
    pub screen_config: ScreenConfig,
    /// Comparison chart settings.
    pub compare_config: CompareConfig,
    /// Paper portfolio.
    pub portfolio: Vec<PortfolioPosition>,
    /// Price alerts.
    #[serde(default)]
    pub price_alerts: Vec<PriceAlert>,
    /// Saved workspace library.
    #[serde(default)]
    pub workspaces: Vec<WorkspaceSnapshot>,
}

impl Preferences {
    /// Hard defaults for a fresh session.
    #[must_use]
    pub fn defaults(universe: &PanelUniverse) -> Self {
        Self {
            watchlist_symbols: DEFAULT_WATCHLIST.iter().map(ToString::to_string).collect(),
            panel_layout: universe.default_layout(),
            panel_sizes: universe.default_sizes(),
            detail_symbol: DEFAULT_DETAIL_SYMBOL.to_string(),
            sector_focus: None,
            active_page: universe.default_page(),
            page_overrides: BTreeMap::new(),
            screen_config: ScreenConfig::default(),
            compare_config: CompareConfig::default(),
            portfolio: Vec::new(),
            price_alerts: Vec::new(),
            workspaces: Vec::new(),
        }
    }

    /// Build preferences from an arbitrary stored document merged over
    /// the hard defaults.
    #[must_use]
    pub fn from_value(value: &Value, universe: &PanelUniverse) -> Self {
        let defaults = Self::defaults(universe);
        let Some(object) = value.as_object() else {
            return defaults;
        };
        let field = |name: &str| object.get(name);

        let watchlist_symbols = field("watchlistSymbols")
            .and_then(Value::as_array)
            .map_or(defaults.watchlist_symbols, |items| {
                normalize_symbols(items.iter().filter_map(Value::as_str))
            });

        let detail_symbol = field("detailSymbol")
            .and_then(Value::as_str)
            .and_then(normalize_symbol)
            .unwrap_or(defaults.detail_symbol);

        let sector_focus = field("sectorFocus")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string);

        let active_page = field("activePage")
            .and_then(Value::as_str)
            .filter(|page| universe.has_page(page))
            .map_or(defaults.active_page, str::to_string);

        let portfolio = field("portfolio")
            .and_then(Value::as_array)
            .map(|items| items.iter().filter_map(PortfolioPosition::from_value).collect())
            .unwrap_or_default();

        let price_alerts = field("priceAlerts")
            .and_then(Value::as_array)
            .map(|items| items.iter().filter_map(PriceAlert::from_value).collect())
            .unwrap_or_default();

        let workspaces = field("workspaces")
            .and_then(Value::as_array)
            .map(|items| items.iter().filter_map(WorkspaceSnapshot::from_value).collect())
            .unwrap_or_default();

        let mut preferences = Self {
            watchlist_symbols,
            panel_layout: universe.normalize_layout_value(field("panelLayout")),
            panel_sizes: universe.normalize_sizes_value(field("panelSizes")),
            detail_symbol,
            sector_focus,
            active_page,
            page_overrides: parse_overrides(universe, field("pageOverrides")),
            screen_config: field("screenConfig").map_or_else(ScreenConfig::default, ScreenConfig::from_value),
            compare_config: field("compareConfig")
                .map_or_else(CompareConfig::default, CompareConfig::from_value),
            portfolio,
            price_alerts,
            workspaces,
        };
        preferences.normalize(universe);
        preferences
    }

    /// Re-establish every invariant in place.
    pub fn normalize(&mut self, universe: &PanelUniverse) {
        self.watchlist_symbols = normalize_symbols(&self.watchlist_symbols);
        self.panel_layout = universe.normalize_layout(&self.panel_layout);
        self.panel_sizes = universe.normalize_sizes(&self.panel_sizes);
        if let Some(symbol) = normalize_symbol(&self.detail_symbol) {
            self.detail_symbol = symbol;
        } else {
            self.detail_symbol = DEFAULT_DETAIL_SYMBOL.to_string();
        }
        if !universe.has_page(&self.active_page) {
            self.active_page = universe.default_page();
        }
        self.page_overrides.retain(|page, panels| {
            *panels = std::mem::take(panels)
                .into_iter()
                .filter(|(panel, _)| universe.page_of(panel) == Some(page.as_str()))
                .filter_map(|(panel, placement)| Some((panel, placement.normalized()?)))
                .collect();
            universe.has_page(page) && !panels.is_empty()
        });
        self.screen_config.normalize();
        self.compare_config.normalize();

        let mut seen_positions = HashSet::new();
        self.portfolio.retain(|position| seen_positions.insert(position.id.clone()));
        let mut seen_alerts = HashSet::new();
        self.price_alerts.retain(|alert| seen_alerts.insert(alert.id.clone()));
        let mut seen_workspaces = HashSet::new();
        self.workspaces
            .retain(|workspace| seen_workspaces.insert(workspace.name.clone()));
    }

    /// Serialize to the persisted JSON shape.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_value(&self) -> Result<Value, serde_json::Error> {
        serde_json::to_value(self)
    }

    /// Crypto products on the watchlist.
    #[must_use]
    pub fn crypto_products(&self) -> Vec<Symbol> {
        self.watchlist_symbols
            .iter()
            .filter(|symbol| crate::domain::quote::is_crypto_product(symbol))
            .cloned()
            .collect()
    }
}

/// Trim, upper-case, and de-duplicate symbols, keeping first occurrences.
fn normalize_symbols<I, S>(raw: I) -> Vec<Symbol>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut seen = HashSet::new();
    raw.into_iter()
        .filter_map(|symbol| normalize_symbol(symbol.as_ref()))
        .filter(|symbol| seen.insert(symbol.clone()))
        .take(MAX_WATCHLIST)
        .collect()
}
