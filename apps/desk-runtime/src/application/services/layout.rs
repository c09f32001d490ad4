//! Panel Layout Engine
//!
//! Turns drag and resize gestures into persisted layout changes. At most one
//! gesture is active at a time. Drags commit through `move_panel`; resizes
//! show a transient preview span while the pointer moves and persist only on
//! release. Abandoned gestures leave the preferences untouched.

use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use serde::Serialize;

use super::sync::PreferenceSync;
use crate::application::state::DeskState;
use crate::domain::panel::{
    DropSide, EffectivePlacement, GRID_COLUMNS, MAX_SPAN, MIN_SPAN, PagePlacement, PanelId,
    effective_placements, move_panel,
};
use crate::infrastructure::config::LayoutSettings;

// =============================================================================
// Grid Geometry
// =============================================================================

/// Width of one grid track for a container of `container_px`.
#[must_use]
pub fn track_width(container_px: f64, gap_px: f64) -> f64 {
    let gaps = gap_px * f64::from(GRID_COLUMNS - 1);
    ((container_px - gaps) / f64::from(GRID_COLUMNS)).max(1.0)
}

/// Column delta for a horizontal pointer movement.
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub fn columns_for_delta(delta_px: f64, track_px: f64, gap_px: f64) -> i32 {
    let step = track_px + gap_px;
    if !delta_px.is_finite() || step <= 0.0 {
        return 0;
    }
    (delta_px / step)
        .round()
        .clamp(-f64::from(GRID_COLUMNS), f64::from(GRID_COLUMNS)) as i32
}

/// `span + delta`, clamped to the allowed range.
#[must_use]
pub fn apply_delta(span: u8, delta: i32) -> u8 {
    let resized = (i32::from(span) + delta).clamp(i32::from(MIN_SPAN), i32::from(MAX_SPAN));
    u8::try_from(resized).unwrap_or(MAX_SPAN)
}

// =============================================================================
// Gesture Hooks
// =============================================================================

/// Named point in a gesture's lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum GestureTrigger {
    /// A drag began.
    DragStart,
    /// A drag ended (dropped, abandoned, or cancelled).
    DragEnd,
    /// A resize began.
    ResizeStart,
    /// A resize ended.
    ResizeEnd,
}

/// What a hook is told about a gesture.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GestureEvent {
    /// Lifecycle point.
    pub trigger: GestureTrigger,
    /// Panel being dragged or resized.
    pub panel: PanelId,
    /// Drop target, for drag ends.
    pub target: Option<PanelId>,
    /// Drop side, for drag ends.
    pub side: Option<DropSide>,
    /// Span, for resizes.
    pub span: Option<u8>,
    /// Whether the gesture changed the persisted layout.
    pub committed: bool,
}

impl GestureEvent {
    fn new(trigger: GestureTrigger, panel: &str) -> Self {
        Self {
            trigger,
            panel: panel.to_string(),
            target: None,
            side: None,
            span: None,
            committed: false,
        }
    }
}

/// Handle for unregistering a hook.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HookId(u64);

/// Gesture hook callback.
pub type GestureHook = Arc<dyn Fn(&GestureEvent) + Send + Sync>;

#[derive(Default)]
struct HookRegistry {
    next_id: u64,
    hooks: Vec<(HookId, GestureTrigger, GestureHook)>,
}

impl HookRegistry {
    fn register(&mut self, trigger: GestureTrigger, hook: GestureHook) -> HookId {
        self.next_id += 1;
        let id = HookId(self.next_id);
        self.hooks.push((id, trigger, hook));
        id
    }

    fn unregister(&mut self, id: HookId) -> bool {
        let before = self.hooks.len();
        self.hooks.retain(|(hook_id, _, _)| *hook_id != id);
        self.hooks.len() != before
    }

    fn matching(&self, trigger: GestureTrigger) -> Vec<GestureHook> {
        self.hooks
            .iter()
            .filter(|(_, hook_trigger, _)| *hook_trigger == trigger)
            .map(|(_, _, hook)| Arc::clone(hook))
            .collect()
    }
}

// =============================================================================
// Gesture Sessions
// =============================================================================

/// Layout gesture errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LayoutError {
    /// Another gesture is still active.
    #[error("a gesture is already in progress")]
    GestureInProgress,

    /// The panel id is not part of the universe.
    #[error("unknown panel: {0}")]
    UnknownPanel(String),

    /// The resize was cancelled before it could be released.
    #[error("resize of {0} was interrupted")]
    ResizeInterrupted(String),
}

#[derive(Debug, Clone)]
struct DragSession {
    source: PanelId,
    hover: Option<(PanelId, DropSide)>,
}

#[derive(Debug, Clone)]
struct ResizeSession {
    panel: PanelId,
    start_span: u8,
    track_px: f64,
    preview: u8,
}

#[derive(Debug, Clone)]
enum Gesture {
    Drag(DragSession),
    Resize(ResizeSession),
}

// =============================================================================
// Engine
// =============================================================================

/// Layout engine bound to the desk preferences.
pub struct LayoutEngine {
    state: Arc<DeskState>,
    sync: Arc<PreferenceSync>,
    settings: LayoutSettings,
    gesture: Mutex<Option<Gesture>>,
    hooks: RwLock<HookRegistry>,
}

impl std::fmt::Debug for LayoutEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LayoutEngine")
            .field("settings", &self.settings)
            .field("gesture", &*self.gesture.lock())
            .field("hooks", &self.hooks.read().hooks.len())
            .finish_non_exhaustive()
    }
}

impl LayoutEngine {
    /// Create an engine.
    #[must_use]
    pub fn new(state: Arc<DeskState>, sync: Arc<PreferenceSync>, settings: LayoutSettings) -> Self {
        Self {
            state,
            sync,
            settings,
            gesture: Mutex::new(None),
            hooks: RwLock::new(HookRegistry::default()),
        }
    }

    /// Register a hook for `trigger`.
    pub fn register_hook(
        &self,
        trigger: GestureTrigger,
        hook: impl Fn(&GestureEvent) + Send + Sync + 'static,
    ) -> HookId {
        self.hooks.write().register(trigger, Arc::new(hook))
    }

    /// Remove a hook. Returns whether it was registered.
    pub fn unregister_hook(&self, id: HookId) -> bool {
        self.hooks.write().unregister(id)
    }

    fn emit(&self, event: &GestureEvent) {
        let hooks = self.hooks.read().matching(event.trigger);
        for hook in hooks {
            hook(event);
        }
    }

    fn begin(&self, gesture: Gesture) -> Result<(), LayoutError> {
        let mut slot = self.gesture.lock();
        if slot.is_some() {
            return Err(LayoutError::GestureInProgress);
        }
        *slot = Some(gesture);
        Ok(())
    }

    fn ensure_known(&self, panel: &str) -> Result<(), LayoutError> {
        if self.state.universe().contains(panel) {
            Ok(())
        } else {
            Err(LayoutError::UnknownPanel(panel.to_string()))
        }
    }

    // =========================================================================
    // Drag
    // =========================================================================

    /// Start dragging `source`.
    ///
    /// # Errors
    ///
    /// Fails for unknown panels or while another gesture is active.
    pub fn begin_drag(&self, source: &str) -> Result<(), LayoutError> {
        self.ensure_known(source)?;
        self.begin(Gesture::Drag(DragSession {
            source: source.to_string(),
            hover: None,
        }))?;
        self.emit(&GestureEvent::new(GestureTrigger::DragStart, source));
        Ok(())
    }

    /// Pointer is over `target`; returns the side a drop would use.
    ///
    /// Hovering the source itself, or an unknown panel, clears the hover.
    pub fn hover(
        &self,
        target: &str,
        pointer_y: f64,
        target_top: f64,
        target_height: f64,
    ) -> Option<DropSide> {
        let mut slot = self.gesture.lock();
        let Some(Gesture::Drag(session)) = slot.as_mut() else {
            return None;
        };
        if target == session.source || !self.state.universe().contains(target) {
            session.hover = None;
            return None;
        }
        let side = DropSide::from_pointer(pointer_y, target_top, target_height);
        session.hover = Some((target.to_string(), side));
        Some(side)
    }

    /// Drop onto `target` on `side`. Returns whether the layout changed.
    pub fn drop_on(&self, target: &str, side: DropSide) -> bool {
        let Some(session) = self.take_drag() else {
            return false;
        };

        let universe = self.state.universe();
        let committed = self.sync.schedule(|prefs| {
            if let Some(layout) = move_panel(universe, &prefs.panel_layout, &session.source, target, side) {
                prefs.panel_layout = layout;
            }
        });

        if committed {
            tracing::debug!(source = %session.source, target, ?side, "Panel moved");
        }
        self.emit(&GestureEvent {
            target: Some(target.to_string()),
            side: Some(side),
            committed,
            ..GestureEvent::new(GestureTrigger::DragEnd, &session.source)
        });
        committed
    }

    /// Release the pointer over whatever was last hovered.
    pub fn drop_hovered(&self) -> bool {
        let hover = match self.gesture.lock().as_ref() {
            Some(Gesture::Drag(session)) => session.hover.clone(),
            _ => return false,
        };
        match hover {
            Some((target, side)) => self.drop_on(&target, side),
            None => {
                self.drop_outside();
                false
            }
        }
    }

    /// Release outside any valid target; nothing changes.
    pub fn drop_outside(&self) {
        if let Some(session) = self.take_drag() {
            self.emit(&GestureEvent::new(GestureTrigger::DragEnd, &session.source));
        }
    }

    fn take_drag(&self) -> Option<DragSession> {
        let mut slot = self.gesture.lock();
        match slot.take() {
            Some(Gesture::Drag(session)) => Some(session),
            other => {
                *slot = other;
                None
            }
        }
    }

    // =========================================================================
    // Resize
    // =========================================================================

    /// Start resizing `panel` inside a grid container `container_px` wide.
    ///
    /// # Errors
    ///
    /// Fails for unknown panels or while another gesture is active.
    pub fn begin_resize(&self, panel: &str, container_px: f64) -> Result<(), LayoutError> {
        self.ensure_known(panel)?;
        let start_span = self.state.with_preferences(|p| {
            p.panel_sizes
                .get(panel)
                .copied()
                .unwrap_or_else(|| self.state.universe().default_span(panel))
        });
        self.begin(Gesture::Resize(ResizeSession {
            panel: panel.to_string(),
            start_span,
            track_px: track_width(container_px, self.settings.gap_px),
            preview: start_span,
        }))?;
        self.emit(&GestureEvent {
            span: Some(start_span),
            ..GestureEvent::new(GestureTrigger::ResizeStart, panel)
        });
        Ok(())
    }

    /// Pointer moved `delta_px` from where the resize began; updates and
    /// returns the unsaved preview span.
    pub fn resize_to(&self, delta_px: f64) -> Option<u8> {
        let mut slot = self.gesture.lock();
        let Some(Gesture::Resize(session)) = slot.as_mut() else {
            return None;
        };
        let delta = columns_for_delta(delta_px, session.track_px, self.settings.gap_px);
        session.preview = apply_delta(session.start_span, delta);
        Some(session.preview)
    }

    /// Release the pointer, persisting the previewed span.
    ///
    /// Returns the committed span, or `None` without an active resize.
    pub fn end_resize(&self) -> Option<u8> {
        let session = {
            let mut slot = self.gesture.lock();
            match slot.take() {
                Some(Gesture::Resize(session)) => session,
                other => {
                    *slot = other;
                    return None;
                }
            }
        };

        let committed = self.sync.schedule(|prefs| {
            prefs
                .panel_sizes
                .insert(session.panel.clone(), session.preview);
        });
        if committed {
            tracing::debug!(panel = %session.panel, span = session.preview, "Panel resized");
        }
        self.emit(&GestureEvent {
            span: Some(session.preview),
            committed,
            ..GestureEvent::new(GestureTrigger::ResizeEnd, &session.panel)
        });
        Some(session.preview)
    }

    /// Resize in one step: begin, move by `delta_px`, release.
    ///
    /// # Errors
    ///
    /// Fails for unknown panels, while another gesture is active, or when
    /// the resize is cancelled before release.
    pub fn resize(&self, panel: &str, delta_px: f64, container_px: f64) -> Result<u8, LayoutError> {
        self.begin_resize(panel, container_px)?;
        self.resize_to(delta_px);
        self.end_resize()
            .ok_or_else(|| LayoutError::ResizeInterrupted(panel.to_string()))
    }

    /// Abandon any active gesture without changing the layout.
    pub fn cancel(&self) {
        let Some(gesture) = self.gesture.lock().take() else {
            return;
        };
        let event = match gesture {
            Gesture::Drag(session) => GestureEvent::new(GestureTrigger::DragEnd, &session.source),
            Gesture::Resize(session) => GestureEvent {
                span: Some(session.start_span),
                ..GestureEvent::new(GestureTrigger::ResizeEnd, &session.panel)
            },
        };
        self.emit(&event);
    }

    /// Whether a gesture is active.
    #[must_use]
    pub fn is_gesture_active(&self) -> bool {
        self.gesture.lock().is_some()
    }

    fn preview(&self) -> Option<(PanelId, u8)> {
        match self.gesture.lock().as_ref() {
            Some(Gesture::Resize(session)) => Some((session.panel.clone(), session.preview)),
            _ => None,
        }
    }

    // =========================================================================
    // Page Overrides
    // =========================================================================

    /// Pin `panel` to an explicit order/column/row on its own page.
    ///
    /// # Errors
    ///
    /// Fails for unknown panels.
    pub fn set_page_placement(&self, panel: &str, placement: PagePlacement) -> Result<bool, LayoutError> {
        self.ensure_known(panel)?;
        let Some(page) = self.state.universe().page_of(panel).map(str::to_string) else {
            return Err(LayoutError::UnknownPanel(panel.to_string()));
        };
        Ok(self.sync.schedule(|prefs| {
            prefs
                .page_overrides
                .entry(page)
                .or_default()
                .insert(panel.to_string(), placement);
        }))
    }

    /// Remove the override of `panel`. Returns whether one existed.
    pub fn clear_page_placement(&self, panel: &str) -> bool {
        self.sync.schedule(|prefs| {
            for overrides in prefs.page_overrides.values_mut() {
                overrides.remove(panel);
            }
        })
    }

    // =========================================================================
    // Placement
    // =========================================================================

    /// Whether a viewport stacks panels at full width.
    #[must_use]
    pub const fn is_collapsed(&self, viewport_px: u32) -> bool {
        viewport_px < self.settings.collapse_breakpoint_px
    }

    /// Effective placements of the active page for a viewport.
    #[must_use]
    pub fn placements(&self, viewport_px: u32) -> Vec<EffectivePlacement> {
        let page = self.state.with_preferences(|p| p.active_page.clone());
        self.placements_for_page(&page, viewport_px)
    }

    /// Effective placements of `page` for a viewport, including any resize
    /// preview.
    #[must_use]
    pub fn placements_for_page(&self, page: &str, viewport_px: u32) -> Vec<EffectivePlacement> {
        let collapsed = self.is_collapsed(viewport_px);
        let preview = self.preview();
        let preview = preview.as_ref().map(|(panel, span)| (panel.as_str(), *span));
        self.state.with_preferences(|prefs| {
            effective_placements(
                self.state.universe(),
                &prefs.panel_layout,
                &prefs.panel_sizes,
                prefs.page_overrides.get(page),
                page,
                collapsed,
                preview,
            )
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use test_case::test_case;

    use super::*;
    use crate::application::events::EventHub;
    use crate::application::ports::{MockLocalStore, MockProfileApi};
    use crate::domain::panel::PanelUniverse;

    fn engine() -> (Arc<DeskState>, LayoutEngine) {
        let state = Arc::new(DeskState::new(
            PanelUniverse::standard(),
            Arc::new(EventHub::with_defaults()),
        ));
        let mut local = MockLocalStore::new();
        local.expect_save().returning(|_, _| Ok(()));
        let sync = Arc::new(PreferenceSync::new(
            Arc::clone(&state),
            Arc::new(local),
            Arc::new(MockProfileApi::new()),
            Duration::from_secs(1),
        ));
        let engine = LayoutEngine::new(Arc::clone(&state), sync, LayoutSettings::default());
        (state, engine)
    }

    fn position(state: &DeskState, id: &str) -> usize {
        state.with_preferences(|p| p.panel_layout.iter().position(|panel| panel == id).unwrap())
    }

    #[test]
    fn drag_before_target_places_source_immediately_before() {
        let (state, engine) = engine();
        let count = state.universe().len();

        engine.begin_drag("portfolio").unwrap();
        assert_eq!(engine.hover("news", 10.0, 0.0, 100.0), Some(DropSide::Before));
        assert!(engine.drop_hovered());

        assert_eq!(position(&state, "portfolio") + 1, position(&state, "news"));
        assert_eq!(state.preferences().panel_layout.len(), count);
        assert!(!engine.is_gesture_active());
    }

    #[test]
    fn abandoned_drags_leave_layout_unchanged() {
        let (state, engine) = engine();
        let before = state.preferences().panel_layout;

        engine.begin_drag("news").unwrap();
        engine.drop_outside();
        engine.begin_drag("news").unwrap();
        assert_eq!(engine.hover("news", 80.0, 0.0, 100.0), None);
        assert!(!engine.drop_hovered());
        engine.begin_drag("news").unwrap();
        engine.cancel();
        engine.begin_drag("news").unwrap();
        assert!(!engine.drop_on("news", DropSide::After));

        assert_eq!(state.preferences().panel_layout, before);
    }

    #[test]
    fn second_gesture_is_rejected() {
        let (_, engine) = engine();
        engine.begin_drag("news").unwrap();
        assert_eq!(
            engine.begin_resize("news", 1_200.0),
            Err(LayoutError::GestureInProgress)
        );
        assert_eq!(
            engine.begin_drag("nope"),
            Err(LayoutError::UnknownPanel("nope".to_string()))
        );
    }

    #[test_case(1_200.0, 0.0, 0 ; "no movement")]
    #[test_case(1_200.0, 100.0, 1 ; "one column right")]
    #[test_case(1_200.0, -210.0, -2 ; "two columns left")]
    #[test_case(1_200.0, 40.0, 0 ; "below half a step")]
    fn pixel_delta_to_columns(container: f64, delta: f64, expected: i32) {
        // track = (1200 - 11 * 12) / 12 = 89, step = 101
        let track = track_width(container, 12.0);
        assert!((track - 89.0).abs() < f64::EPSILON);
        assert_eq!(columns_for_delta(delta, track, 12.0), expected);
    }

    #[test]
    fn resize_previews_then_persists_on_release() {
        let (state, engine) = engine();

        engine.begin_resize("news", 1_212.0).unwrap();
        assert_eq!(engine.resize_to(2_000.0), Some(12));
        assert_eq!(state.preferences().panel_sizes["news"], 6);
        let preview = engine
            .placements_for_page("overview", 1_400)
            .into_iter()
            .find(|p| p.panel == "news")
            .unwrap();
        assert_eq!(preview.span, 12);

        assert_eq!(engine.resize_to(-10_000.0), Some(MIN_SPAN));
        assert_eq!(engine.end_resize(), Some(MIN_SPAN));
        assert_eq!(state.preferences().panel_sizes["news"], MIN_SPAN);
    }

    #[test]
    fn cancelled_resize_keeps_size() {
        let (state, engine) = engine();
        engine.begin_resize("news", 1_212.0).unwrap();
        engine.resize_to(300.0);
        engine.cancel();
        assert_eq!(state.preferences().panel_sizes["news"], 6);
    }

    #[test]
    fn hooks_fire_until_unregistered() {
        let (_, engine) = engine();
        let ends = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&ends);
        let id = engine.register_hook(GestureTrigger::ResizeEnd, move |event| {
            assert_eq!(event.panel, "watchlist");
            seen.fetch_add(1, Ordering::SeqCst);
        });

        engine.resize("watchlist", 101.0, 1_212.0).unwrap();
        assert_eq!(ends.load(Ordering::SeqCst), 1);

        assert!(engine.unregister_hook(id));
        assert!(!engine.unregister_hook(id));
        engine.resize("watchlist", 101.0, 1_212.0).unwrap();
        assert_eq!(ends.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn resize_cancelled_mid_gesture_reports_interruption() {
        let (state, engine) = engine();
        let engine = Arc::new(engine);
        let handle: Arc<std::sync::OnceLock<std::sync::Weak<LayoutEngine>>> =
            Arc::new(std::sync::OnceLock::new());
        let hook_handle = Arc::clone(&handle);
        engine.register_hook(GestureTrigger::ResizeStart, move |_| {
            if let Some(engine) = hook_handle.get().and_then(std::sync::Weak::upgrade) {
                engine.cancel();
            }
        });
        handle.set(Arc::downgrade(&engine)).unwrap();

        assert_eq!(
            engine.resize("news", 303.0, 1_212.0),
            Err(LayoutError::ResizeInterrupted("news".to_string()))
        );
        assert_eq!(state.preferences().panel_sizes["news"], 6);
        assert!(!engine.is_gesture_active());
    }

    #[test]
    fn page_placement_is_clamped_and_empty_overrides_dropped() {
        let (state, engine) = engine();

        assert!(
            engine
                .set_page_placement(
                    "news",
                    PagePlacement {
                        order: None,
                        column: Some(40),
                        row: Some(0),
                    },
                )
                .unwrap()
        );
        let stored = state.with_preferences(|p| p.page_overrides["overview"]["news"]);
        assert_eq!(
            stored,
            PagePlacement {
                order: None,
                column: Some(GRID_COLUMNS),
                row: Some(1),
            }
        );
        let news = engine
            .placements_for_page("overview", 1_400)
            .into_iter()
            .find(|p| p.panel == "news")
            .unwrap();
        assert_eq!(news.row, Some(1));

        assert!(engine.clear_page_placement("news"));
        assert!(!engine.set_page_placement("news", PagePlacement::default()).unwrap());
        assert!(state.with_preferences(|p| p.page_overrides.is_empty()));
    }

    #[test]
    fn collapsed_viewport_stacks_in_document_order() {
        let (_, engine) = engine();
        engine
            .set_page_placement(
                "news",
                PagePlacement {
                    order: Some(0),
                    column: Some(7),
                    row: Some(1),
                },
            )
            .unwrap();

        let wide = engine.placements(1_400);
        assert_eq!(wide[0].panel, "news");
        assert_eq!(wide[0].column, Some(7));

        let narrow = engine.placements(800);
        assert!(narrow.iter().all(|p| p.span == GRID_COLUMNS && p.column.is_none()));
        assert_eq!(narrow[0].panel, "watchlist");

        assert!(engine.clear_page_placement("news"));
        assert_eq!(engine.placements(1_400)[0].panel, "watchlist");
    }
}
