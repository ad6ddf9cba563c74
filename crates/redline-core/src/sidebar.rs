//! Keeps a floating edit menu in sync with the focused edit.
//!
//! The controller owns no UI. It talks to the host through two traits:
//! [`MenuLayout`] reports element bounds and [`MenuRenderer`] receives the
//! menu content plus show/hide calls.

use serde::{Deserialize, Serialize};

use crate::core::Editor;
use crate::edit_registry::SummaryCounts;
use crate::focus::{FocusMode, FocusState, FocusTracker};

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Bounds {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn left(&self) -> f32 {
        self.x
    }

    pub fn right(&self) -> f32 {
        self.x + self.width
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BoxSide {
    Left,
    Right,
}

/// The side with more horizontal room between the anchor and the container
/// edge. Ties go right.
pub fn choose_side(container: &Bounds, anchor: &Bounds) -> BoxSide {
    let room_left = anchor.left() - container.left();
    let room_right = container.right() - anchor.right();
    if room_left > room_right {
        BoxSide::Left
    } else {
        BoxSide::Right
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SidebarMenuUpdate {
    pub anchor_id: String,
    pub anchor_bounds: Bounds,
    pub box_side: BoxSide,
    pub mode: FocusMode,
    pub old_text: String,
    pub new_text: String,
    pub summary_counts: Option<SummaryCounts>,
}

pub trait MenuLayout {
    fn container_bounds(&self) -> Bounds;
    /// `None` while the element for `anchor_id` is not mounted yet.
    fn anchor_bounds(&self, anchor_id: &str) -> Option<Bounds>;
}

pub trait MenuRenderer {
    fn update_sidebar_menu(&mut self, update: SidebarMenuUpdate);
    fn show_floating_menu(&mut self);
    fn hide_floating_menu(&mut self);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostEvent {
    Focus,
    /// `into_menu` is set when focus moves into the menu itself.
    Blur { into_menu: bool },
}

pub struct SidebarMenuController<R: MenuRenderer> {
    renderer: R,
    layout: Option<Box<dyn MenuLayout>>,
    tracker: FocusTracker,
    has_focus: bool,
    visible: bool,
    deferred: bool,
    last_update: Option<SidebarMenuUpdate>,
}

impl<R: MenuRenderer> SidebarMenuController<R> {
    pub fn new(renderer: R) -> Self {
        Self {
            renderer,
            layout: None,
            tracker: FocusTracker::new(),
            has_focus: false,
            visible: false,
            deferred: false,
            last_update: None,
        }
    }

    /// Second half of construction. Any update that was waiting for a layout
    /// is delivered right away.
    pub fn attach(&mut self, layout: impl MenuLayout + 'static) {
        self.layout = Some(Box::new(layout));
        self.flush_deferred();
    }

    pub fn renderer(&self) -> &R {
        &self.renderer
    }

    pub fn renderer_mut(&mut self) -> &mut R {
        &mut self.renderer
    }

    pub fn tracker(&self) -> &FocusTracker {
        &self.tracker
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    pub fn has_deferred_update(&self) -> bool {
        self.deferred
    }

    pub fn handle_host_event(&mut self, editor: &Editor, event: HostEvent) {
        match event {
            HostEvent::Focus => {
                self.has_focus = true;
                self.refresh(editor);
            }
            HostEvent::Blur { into_menu: true } => {}
            HostEvent::Blur { into_menu: false } => {
                self.has_focus = false;
                self.deferred = false;
                self.set_visible(false);
            }
        }
    }

    /// Drains the editor's change notifications and refreshes once for the
    /// whole batch. Returns whether there was anything to process.
    pub fn sync(&mut self, editor: &mut Editor) -> bool {
        let events = editor.take_events();
        if events.is_empty() {
            return false;
        }
        tracing::trace!(?events, "syncing sidebar menu");
        self.refresh(editor);
        true
    }

    pub fn refresh(&mut self, editor: &Editor) {
        let focus = self.tracker.update(editor).cloned();
        match focus {
            Some(focus) if self.has_focus => self.push_update(&focus),
            _ => {
                self.deferred = false;
                self.set_visible(false);
            }
        }
    }

    /// Retries an update that could not be positioned earlier. Returns
    /// whether it went through.
    pub fn flush_deferred(&mut self) -> bool {
        if !self.deferred {
            return false;
        }
        let Some(focus) = self.tracker.current().cloned() else {
            self.deferred = false;
            return false;
        };
        self.push_update(&focus);
        !self.deferred
    }

    fn push_update(&mut self, focus: &FocusState) {
        let Some(layout) = self.layout.as_deref() else {
            self.deferred = true;
            return;
        };
        let Some(anchor_bounds) = layout.anchor_bounds(&focus.anchor_id) else {
            tracing::trace!(anchor = %focus.anchor_id, "anchor not mounted yet");
            self.deferred = true;
            return;
        };
        let container = layout.container_bounds();
        let box_side = self
            .tracker
            .resolve_side(|| choose_side(&container, &anchor_bounds));

        let update = SidebarMenuUpdate {
            anchor_id: focus.anchor_id.clone(),
            anchor_bounds,
            box_side,
            mode: focus.mode,
            old_text: focus.old_text.clone(),
            new_text: focus.new_text.clone(),
            summary_counts: focus.summary_counts,
        };

        self.deferred = false;
        if self.last_update.as_ref() != Some(&update) {
            self.renderer.update_sidebar_menu(update.clone());
            self.last_update = Some(update);
        }
        self.set_visible(true);
    }

    fn set_visible(&mut self, visible: bool) {
        if self.visible == visible {
            return;
        }
        self.visible = visible;
        if visible {
            self.renderer.show_floating_menu();
        } else {
            self.last_update = None;
            self.renderer.hide_floating_menu();
        }
    }
}
