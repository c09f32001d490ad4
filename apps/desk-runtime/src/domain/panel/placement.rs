//! Page-aware grid placement.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{GRID_COLUMNS, PanelId, PanelUniverse};

/// Page-specific placement override for one panel.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PagePlacement {
    /// Display order on the page, replacing the global order.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order: Option<u32>,
    /// 1-based grid column the panel starts in.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub column: Option<u8>,
    /// 1-based grid row the panel starts in.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub row: Option<u16>,
}

impl PagePlacement {
    /// Parse an override leniently. Returns `None` if nothing usable remains.
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn from_value(value: &Value) -> Option<Self> {
        let object = value.as_object()?;
        let order = object
            .get("order")
            .and_then(Value::as_f64)
            .filter(|n| n.is_finite() && *n >= 0.0)
            .map(|n| n.round().min(f64::from(u32::MAX)) as u32);
        let column = object
            .get("column")
            .and_then(Value::as_f64)
            .filter(|n| n.is_finite())
            .map(|n| n.round().clamp(1.0, f64::from(GRID_COLUMNS)) as u8);
        let row = object
            .get("row")
            .and_then(Value::as_f64)
            .filter(|n| n.is_finite())
            .map(|n| n.round().clamp(1.0, f64::from(u16::MAX)) as u16);

        Self { order, column, row }.normalized()
    }

    /// Clamp the column into the grid and the row to at least 1. Returns
    /// `None` for an override that sets nothing.
    #[must_use]
    pub fn normalized(self) -> Option<Self> {
        let placement = Self {
            order: self.order,
            column: self.column.map(|column| column.clamp(1, GRID_COLUMNS)),
            row: self.row.map(|row| row.max(1)),
        };
        (placement != Self::default()).then_some(placement)
    }
}

/// Computed placement of one panel for rendering.
///
/// Document order is 1-based, so an override order of `0` sorts a panel
/// ahead of everything else on the page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EffectivePlacement {
    /// Panel identifier.
    pub panel: PanelId,
    /// Render order on the page.
    pub order: u32,
    /// Column span.
    pub span: u8,
    /// 1-based start column, if pinned.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub column: Option<u8>,
    /// 1-based start row, if pinned.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub row: Option<u16>,
}

/// Compute the effective placements of the panels on `page`.
///
/// Page overrides win over the global permutation and sizes. When `collapsed`
/// (viewport below the breakpoint) overrides are ignored entirely and every
/// panel stacks at full width in global order. `preview` substitutes a
/// transient span for one panel while a resize gesture is in progress.
#[must_use]
pub fn effective_placements(
    universe: &PanelUniverse,
    layout: &[PanelId],
    sizes: &BTreeMap<PanelId, u8>,
    overrides: Option<&BTreeMap<PanelId, PagePlacement>>,
    page: &str,
    collapsed: bool,
    preview: Option<(&str, u8)>,
) -> Vec<EffectivePlacement> {
    let layout = universe.normalize_layout(layout);
    let mut placements: Vec<(usize, EffectivePlacement)> = universe
        .panels_on_page(&layout, page)
        .into_iter()
        .enumerate()
        .map(|(index, panel)| {
            let document_order = u32::try_from(index + 1).unwrap_or(u32::MAX);
            let stored_span = sizes
                .get(panel)
                .copied()
                .unwrap_or_else(|| universe.default_span(panel));
            let span = match preview {
                Some((id, span)) if *panel == id => span,
                _ => stored_span,
            };

            if collapsed {
                return (
                    index,
                    EffectivePlacement {
                        panel: panel.clone(),
                        order: document_order,
                        span: GRID_COLUMNS,
                        column: None,
                        row: None,
                    },
                );
            }

            let placement = overrides.and_then(|o| o.get(panel)).copied().unwrap_or_default();
            // A pinned column must leave room for the full span.
            let column = placement
                .column
                .map(|column| column.min(GRID_COLUMNS.saturating_sub(span) + 1).max(1));

            (
                index,
                EffectivePlacement {
                    panel: panel.clone(),
                    order: placement.order.unwrap_or(document_order),
                    span,
                    column,
                    row: placement.row,
                },
            )
        })
        .collect();

    placements.sort_by_key(|(index, placement)| (placement.order, *index));
    placements.into_iter().map(|(_, placement)| placement).collect()
}

/// Parse stored page overrides. Unknown pages, panels hosted on another page,
/// and unusable entries are dropped.
#[must_use]
pub(crate) fn parse_overrides(
    universe: &PanelUniverse,
    value: Option<&Value>,
) -> BTreeMap<String, BTreeMap<PanelId, PagePlacement>> {
    let Some(pages) = value.and_then(Value::as_object) else {
        return BTreeMap::new();
    };

    pages
        .iter()
        .filter(|(page, _)| universe.has_page(page))
        .filter_map(|(page, panels)| {
            let panels: BTreeMap<PanelId, PagePlacement> = panels
                .as_object()?
                .iter()
                .filter(|(panel, _)| universe.page_of(panel) == Some(page.as_str()))
                .filter_map(|(panel, raw)| Some((panel.clone(), PagePlacement::from_value(raw)?)))
                .collect();
            (!panels.is_empty()).then(|| (page.clone(), panels))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn overview(
        overrides: Option<&BTreeMap<PanelId, PagePlacement>>,
        collapsed: bool,
    ) -> Vec<EffectivePlacement> {
        let universe = PanelUniverse::standard();
        effective_placements(
            &universe,
            &universe.default_layout(),
            &universe.default_sizes(),
            overrides,
            "overview",
            collapsed,
            None,
        )
    }

    #[test]
    fn global_order_without_overrides() {
        let placements = overview(None, false);
        let panels: Vec<&str> = placements.iter().map(|p| p.panel.as_str()).collect();
        assert_eq!(panels, ["watchlist", "detail", "crypto", "news", "breadth"]);
        assert_eq!(placements[1].span, 8);
    }

    #[test]
    fn override_reorders_and_pins() {
        let mut overrides = BTreeMap::new();
        overrides.insert(
            "breadth".to_string(),
            PagePlacement {
                order: Some(0),
                column: Some(12),
                row: Some(2),
            },
        );

        let placements = overview(Some(&overrides), false);

        assert_eq!(placements[0].panel, "breadth");
        // Span 4 starting at column 12 would overflow the grid.
        assert_eq!(placements[0].column, Some(9));
        assert_eq!(placements[0].row, Some(2));
        assert_eq!(placements[1].panel, "watchlist");
    }

    #[test]
    fn collapsed_ignores_overrides() {
        let mut overrides = BTreeMap::new();
        overrides.insert(
            "breadth".to_string(),
            PagePlacement {
                order: Some(0),
                column: Some(1),
                row: Some(1),
            },
        );

        let placements = overview(Some(&overrides), true);

        assert_eq!(placements[0].panel, "watchlist");
        assert!(placements.iter().all(|p| p.span == GRID_COLUMNS));
        assert!(placements.iter().all(|p| p.column.is_none() && p.row.is_none()));
    }

    #[test]
    fn preview_span_applies_to_one_panel() {
        let universe = PanelUniverse::standard();
        let placements = effective_placements(
            &universe,
            &universe.default_layout(),
            &universe.default_sizes(),
            None,
            "overview",
            false,
            Some(("news", 11)),
        );
        let news = placements.iter().find(|p| p.panel == "news").unwrap();
        assert_eq!(news.span, 11);
        assert_eq!(placements[0].span, 4);
    }

    #[test]
    fn parse_overrides_filters_foreign_panels() {
        let universe = PanelUniverse::standard();
        let raw = json!({
            "overview": {
                "news": { "order": 2, "column": 40, "row": 0 },
                "heatmap": { "order": 1 },
                "detail": "garbage"
            },
            "nowhere": { "news": { "order": 1 } }
        });

        let parsed = parse_overrides(&universe, Some(&raw));

        assert_eq!(parsed.len(), 1);
        let overview = &parsed["overview"];
        assert_eq!(overview.len(), 1);
        assert_eq!(
            overview["news"],
            PagePlacement {
                order: Some(2),
                column: Some(12),
                row: Some(1),
            }
        );
    }
}
