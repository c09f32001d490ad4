//! Panel Universe and Layout Normalization
//!
//! The desk is a fixed set of panels spread across pages. Every stored
//! layout, whatever its origin, is normalized against this universe before
//! it is read or written:
//!
//! - the order is a total permutation of the universe (unknown ids dropped,
//!   duplicates collapse to the first occurrence, missing ids appended in
//!   default order)
//! - every panel has a column span clamped to `[MIN_SPAN, MAX_SPAN]`

mod placement;

use std::collections::{BTreeMap, HashSet};

use serde_json::Value;

pub use placement::{EffectivePlacement, PagePlacement, effective_placements};
pub(crate) use placement::parse_overrides;

// =============================================================================
// Types
// =============================================================================

/// Stable identifier of a dashboard panel.
pub type PanelId = String;

/// Identifier of a dashboard page.
pub type PageId = String;

/// Number of columns in the desk grid.
pub const GRID_COLUMNS: u8 = 12;

/// Narrowest span a panel may take.
pub const MIN_SPAN: u8 = 3;

/// Widest span a panel may take.
pub const MAX_SPAN: u8 = GRID_COLUMNS;

/// Static description of one panel in the universe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PanelSpec {
    /// Panel identifier.
    pub id: PanelId,
    /// Page the panel belongs to.
    pub page: PageId,
    /// Column span used when no valid size is stored.
    pub default_span: u8,
}

impl PanelSpec {
    /// Create a panel spec.
    #[must_use]
    pub fn new(id: &str, page: &str, default_span: u8) -> Self {
        Self {
            id: id.to_string(),
            page: page.to_string(),
            default_span: default_span.clamp(MIN_SPAN, MAX_SPAN),
        }
    }
}

// =============================================================================
// Universe
// =============================================================================

/// The fixed, ordered set of panels the desk knows about.
///
/// Declaration order is the default layout order; the page order is the
/// order in which pages first appear.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PanelUniverse {
    panels: Vec<PanelSpec>,
    pages: Vec<PageId>,
}

impl PanelUniverse {
    /// Build a universe from panel specs. Duplicate ids keep the first spec.
    #[must_use]
    pub fn new(specs: impl IntoIterator<Item = PanelSpec>) -> Self {
        let mut seen = HashSet::new();
        let mut panels = Vec::new();
        let mut pages: Vec<PageId> = Vec::new();

        for spec in specs {
            if !seen.insert(spec.id.clone()) {
                continue;
            }
            if !pages.contains(&spec.page) {
                pages.push(spec.page.clone());
            }
            panels.push(spec);
        }

        Self { panels, pages }
    }

    /// The desk's standard panel set.
    #[must_use]
    pub fn standard() -> Self {
        Self::new([
            PanelSpec::new("watchlist", "overview", 4),
            PanelSpec::new("detail", "overview", 8),
            PanelSpec::new("crypto", "overview", 6),
            PanelSpec::new("news", "overview", 6),
            PanelSpec::new("breadth", "overview", 4),
            PanelSpec::new("heatmap", "markets", 8),
            PanelSpec::new("sectors", "markets", 4),
            PanelSpec::new("screener", "markets", 8),
            PanelSpec::new("calendar", "markets", 4),
            PanelSpec::new("compare", "research", 6),
            PanelSpec::new("relationships", "research", 6),
            PanelSpec::new("portfolio", "research", 8),
            PanelSpec::new("alerts", "research", 4),
        ])
    }

    /// All panel specs in default order.
    #[must_use]
    pub fn panels(&self) -> &[PanelSpec] {
        &self.panels
    }

    /// All pages in display order.
    #[must_use]
    pub fn pages(&self) -> &[PageId] {
        &self.pages
    }

    /// Number of panels.
    #[must_use]
    pub fn len(&self) -> usize {
        self.panels.len()
    }

    /// Whether the universe has no panels.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.panels.is_empty()
    }

    /// Look up a panel spec.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<&PanelSpec> {
        self.panels.iter().find(|spec| spec.id == id)
    }

    /// Whether the id names a panel in the universe.
    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.get(id).is_some()
    }

    /// Whether the id names a known page.
    #[must_use]
    pub fn has_page(&self, page: &str) -> bool {
        self.pages.iter().any(|p| p == page)
    }

    /// The first page, used when the stored page is unknown.
    #[must_use]
    pub fn default_page(&self) -> PageId {
        self.pages.first().cloned().unwrap_or_default()
    }

    /// Page a panel belongs to.
    #[must_use]
    pub fn page_of(&self, id: &str) -> Option<&str> {
        self.get(id).map(|spec| spec.page.as_str())
    }

    /// Default span of a panel (`MIN_SPAN` for unknown ids).
    #[must_use]
    pub fn default_span(&self, id: &str) -> u8 {
        self.get(id).map_or(MIN_SPAN, |spec| spec.default_span)
    }

    /// Default layout order.
    #[must_use]
    pub fn default_layout(&self) -> Vec<PanelId> {
        self.panels.iter().map(|spec| spec.id.clone()).collect()
    }

    /// Default span for every panel.
    #[must_use]
    pub fn default_sizes(&self) -> BTreeMap<PanelId, u8> {
        self.panels
            .iter()
            .map(|spec| (spec.id.clone(), spec.default_span))
            .collect()
    }

    /// Normalize a candidate ordering into a total permutation of the universe.
    #[must_use]
    pub fn normalize_layout<I, S>(&self, candidate: I) -> Vec<PanelId>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut seen: HashSet<&str> = HashSet::with_capacity(self.panels.len());
        let mut layout = Vec::with_capacity(self.panels.len());

        for id in candidate {
            let Some(spec) = self.get(id.as_ref()) else {
                continue;
            };
            if seen.insert(spec.id.as_str()) {
                layout.push(spec.id.clone());
            }
        }

        for spec in &self.panels {
            if seen.insert(spec.id.as_str()) {
                layout.push(spec.id.clone());
            }
        }

        layout
    }

    /// Normalize a layout read from an arbitrary JSON value.
    ///
    /// Non-array values yield the default layout; non-string entries are
    /// ignored.
    #[must_use]
    pub fn normalize_layout_value(&self, value: Option<&Value>) -> Vec<PanelId> {
        match value.and_then(Value::as_array) {
            Some(items) => self.normalize_layout(items.iter().filter_map(Value::as_str)),
            None => self.default_layout(),
        }
    }

    /// Normalize a span map so that every panel has a clamped span.
    #[must_use]
    pub fn normalize_sizes(&self, raw: &BTreeMap<PanelId, u8>) -> BTreeMap<PanelId, u8> {
        self.panels
            .iter()
            .map(|spec| {
                let span = raw
                    .get(&spec.id)
                    .map_or(spec.default_span, |span| (*span).clamp(MIN_SPAN, MAX_SPAN));
                (spec.id.clone(), span)
            })
            .collect()
    }

    /// Normalize sizes read from an arbitrary JSON value.
    ///
    /// Non-numeric entries and a non-object value fall back to default spans.
    #[must_use]
    pub fn normalize_sizes_value(&self, value: Option<&Value>) -> BTreeMap<PanelId, u8> {
        let object = value.and_then(Value::as_object);
        self.panels
            .iter()
            .map(|spec| {
                let span = object
                    .and_then(|map| map.get(&spec.id))
                    .and_then(span_from_value)
                    .unwrap_or(spec.default_span);
                (spec.id.clone(), span)
            })
            .collect()
    }

    /// Panels hosted on a page, in the order given by `layout`.
    #[must_use]
    pub fn panels_on_page<'a>(&self, layout: &'a [PanelId], page: &str) -> Vec<&'a PanelId> {
        layout
            .iter()
            .filter(|id| self.page_of(id) == Some(page))
            .collect()
    }
}

impl Default for PanelUniverse {
    fn default() -> Self {
        Self::standard()
    }
}

// =============================================================================
// Span Helpers
// =============================================================================

/// Clamp a raw span to the allowed range.
///
/// Fractions round to the nearest column, negatives clamp to `MIN_SPAN`.
/// Returns `None` for non-finite input.
#[must_use]
pub fn clamp_span(raw: f64) -> Option<u8> {
    if !raw.is_finite() {
        return None;
    }
    let rounded = raw.round().clamp(f64::from(MIN_SPAN), f64::from(MAX_SPAN));
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    Some(rounded as u8)
}

/// Parse a span from a JSON number or numeric string.
#[must_use]
pub fn span_from_value(value: &Value) -> Option<u8> {
    match value {
        Value::Number(n) => n.as_f64().and_then(clamp_span),
        Value::String(s) => s.trim().parse::<f64>().ok().and_then(clamp_span),
        _ => None,
    }
}

// =============================================================================
// Reordering
// =============================================================================

/// Side of the target panel a dragged panel is dropped on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DropSide {
    /// Insert immediately before the target.
    Before,
    /// Insert immediately after the target.
    After,
}

impl DropSide {
    /// Pick a side by comparing the pointer with the target's vertical midpoint.
    #[must_use]
    pub fn from_pointer(pointer_y: f64, target_top: f64, target_height: f64) -> Self {
        if pointer_y < target_top + target_height / 2.0 {
            Self::Before
        } else {
            Self::After
        }
    }
}

/// Move `source` next to `target` on the given side.
///
/// Returns `None` when the move is a no-op: unknown ids, `source == target`,
/// or a resulting order identical to the input.
#[must_use]
pub fn move_panel(
    universe: &PanelUniverse,
    layout: &[PanelId],
    source: &str,
    target: &str,
    side: DropSide,
) -> Option<Vec<PanelId>> {
    if source == target || !universe.contains(source) || !universe.contains(target) {
        return None;
    }

    let current = universe.normalize_layout(layout);
    let mut reordered: Vec<PanelId> = current.iter().filter(|id| *id != source).cloned().collect();
    let target_index = reordered.iter().position(|id| id == target)?;
    let insert_at = match side {
        DropSide::Before => target_index,
        DropSide::After => target_index + 1,
    };
    reordered.insert(insert_at, source.to_string());

    let normalized = universe.normalize_layout(&reordered);
    (normalized != current).then_some(normalized)
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;
    use serde_json::json;
    use test_case::test_case;

    use super::*;

    fn ids(layout: &[PanelId]) -> Vec<&str> {
        layout.iter().map(String::as_str).collect()
    }

    #[test]
    fn standard_universe_pages() {
        let universe = PanelUniverse::standard();
        assert_eq!(universe.pages(), ["overview", "markets", "research"]);
        assert_eq!(universe.page_of("crypto"), Some("overview"));
        assert_eq!(universe.default_page(), "overview");
    }

    #[test]
    fn normalize_drops_unknown_and_appends_missing() {
        let universe = PanelUniverse::standard();
        let layout = universe.normalize_layout(["news", "bogus", "detail", "news"]);

        assert_eq!(layout.len(), universe.len());
        assert_eq!(&ids(&layout)[..3], ["news", "detail", "watchlist"]);
        assert!(!layout.iter().any(|id| id == "bogus"));
    }

    #[test]
    fn normalize_layout_value_non_array_defaults() {
        let universe = PanelUniverse::standard();
        assert_eq!(
            universe.normalize_layout_value(Some(&json!("detail"))),
            universe.default_layout()
        );
        assert_eq!(universe.normalize_layout_value(None), universe.default_layout());
    }

    #[test_case(json!(-4) => 3 ; "negative clamps up")]
    #[test_case(json!(7.6) => 8 ; "fraction rounds")]
    #[test_case(json!(40) => 12 ; "too wide clamps down")]
    #[test_case(json!("5") => 5 ; "numeric string")]
    #[test_case(json!("wide") => 6 ; "garbage falls back")]
    #[test_case(json!(null) => 6 ; "null falls back")]
    fn normalize_sizes_value_for_news(raw: Value) -> u8 {
        let universe = PanelUniverse::standard();
        let sizes = universe.normalize_sizes_value(Some(&json!({ "news": raw })));
        sizes["news"]
    }

    #[test]
    fn normalize_sizes_fills_every_panel() {
        let universe = PanelUniverse::standard();
        let sizes = universe.normalize_sizes_value(Some(&json!({ "ghost": 9 })));
        assert_eq!(sizes.len(), universe.len());
        assert!(!sizes.contains_key("ghost"));
    }

    #[test]
    fn clamp_span_rejects_non_finite() {
        assert_eq!(clamp_span(f64::NAN), None);
        assert_eq!(clamp_span(f64::INFINITY), None);
    }

    #[test]
    fn move_before_target() {
        let universe = PanelUniverse::standard();
        let layout = universe.default_layout();

        let moved = move_panel(&universe, &layout, "alerts", "detail", DropSide::Before).unwrap();

        let x = moved.iter().position(|id| id == "alerts").unwrap();
        let y = moved.iter().position(|id| id == "detail").unwrap();
        assert_eq!(x + 1, y);
        assert_eq!(moved.len(), layout.len());
    }

    #[test]
    fn move_after_target() {
        let universe = PanelUniverse::standard();
        let layout = universe.default_layout();

        let moved = move_panel(&universe, &layout, "watchlist", "news", DropSide::After).unwrap();

        assert_eq!(&ids(&moved)[..4], ["detail", "crypto", "news", "watchlist"]);
    }

    #[test]
    fn move_onto_self_is_noop() {
        let universe = PanelUniverse::standard();
        let layout = universe.default_layout();
        assert!(move_panel(&universe, &layout, "news", "news", DropSide::After).is_none());
    }

    #[test]
    fn move_to_current_position_is_noop() {
        let universe = PanelUniverse::standard();
        let layout = universe.default_layout();
        assert!(move_panel(&universe, &layout, "watchlist", "detail", DropSide::Before).is_none());
    }

    #[test]
    fn drop_side_from_midpoint() {
        assert_eq!(DropSide::from_pointer(10.0, 0.0, 100.0), DropSide::Before);
        assert_eq!(DropSide::from_pointer(50.0, 0.0, 100.0), DropSide::After);
        assert_eq!(DropSide::from_pointer(180.0, 100.0, 100.0), DropSide::After);
    }

    fn candidate_ids() -> impl Strategy<Value = Vec<String>> {
        let known = PanelUniverse::standard().default_layout();
        let pool: Vec<String> = known
            .into_iter()
            .chain(["ghost", "", "WATCHLIST"].map(String::from))
            .collect();
        prop::collection::vec(prop::sample::select(pool), 0..30)
    }

    proptest! {
        #[test]
        fn normalized_layout_is_permutation(candidate in candidate_ids()) {
            let universe = PanelUniverse::standard();
            let layout = universe.normalize_layout(&candidate);

            let mut sorted = layout.clone();
            sorted.sort();
            let mut expected = universe.default_layout();
            expected.sort();
            prop_assert_eq!(sorted, expected);
        }

        #[test]
        fn normalization_is_idempotent(candidate in candidate_ids()) {
            let universe = PanelUniverse::standard();
            let once = universe.normalize_layout(&candidate);
            let twice = universe.normalize_layout(&once);
            prop_assert_eq!(once, twice);
        }

        #[test]
        fn sizes_always_in_range(raw in prop::collection::vec(-100.0f64..100.0, 13)) {
            let universe = PanelUniverse::standard();
            let object: serde_json::Map<String, Value> = universe
                .default_layout()
                .into_iter()
                .zip(raw)
                .map(|(id, span)| (id, json!(span)))
                .collect();
            let sizes = universe.normalize_sizes_value(Some(&Value::Object(object)));

            prop_assert_eq!(sizes.len(), universe.len());
            for span in sizes.values() {
                prop_assert!((MIN_SPAN..=MAX_SPAN).contains(span));
            }
        }

        #[test]
        fn move_preserves_permutation(
            source in 0usize..13,
            target in 0usize..13,
            before in any::<bool>(),
        ) {
            let universe = PanelUniverse::standard();
            let layout = universe.default_layout();
            let side = if before { DropSide::Before } else { DropSide::After };
            let moved = move_panel(&universe, &layout, &layout[source], &layout[target], side)
                .unwrap_or_else(|| layout.clone());
            prop_assert_eq!(universe.normalize_layout(&moved), moved);
        }
    }
}
