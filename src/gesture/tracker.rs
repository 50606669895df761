use std::time::Instant;

use crate::layout::Position;
use crate::models::UserId;

use super::config::GestureConfig;
use super::state::{DragFeedback, DragState, GestureOutcome, GesturePhase};

/// Tracks one pointer drag of a user bubble toward the anchor.
///
/// Pointer samples are the dragged bubble's centre. Each sample is O(1).
#[derive(Debug)]
pub struct SelectionGesture {
    config: GestureConfig,
    anchor: Position,
    phase: GesturePhase,
    drag: Option<DragState>,
    pressed_at: Option<Instant>,
}

impl SelectionGesture {
    pub fn new(config: GestureConfig, anchor: Position) -> Self {
        Self {
            config,
            anchor,
            phase: GesturePhase::Idle,
            drag: None,
            pressed_at: None,
        }
    }

    pub fn phase(&self) -> GesturePhase {
        self.phase
    }

    pub fn drag_state(&self) -> Option<&DragState> {
        self.drag.as_ref()
    }

    pub fn anchor(&self) -> Position {
        self.anchor
    }

    /// Start tracking. A press while another drag is live replaces it.
    pub fn press(&mut self, user_id: UserId, start: Position, at: Instant) {
        self.drag = Some(DragState {
            user_id,
            start_position: start,
            current_offset: Default::default(),
            is_snapped: false,
        });
        self.pressed_at = Some(at);
        self.phase = GesturePhase::Pressed;
    }

    /// Feed a pointer sample. `None` when no gesture is live.
    ///
    /// A press turns into a drag once it is older than `tap_delay` and the
    /// pointer has moved at least `tap_slop`.
    pub fn move_to(&mut self, pointer: Position, at: Instant) -> Option<DragFeedback> {
        let snap_zone = self.config.snap_zone();
        let tap_slop = self.config.tap_slop;
        let debounced = self.is_debounced(at);
        let drag = self.drag.as_mut()?;
        drag.current_offset = pointer - drag.start_position;

        if self.phase == GesturePhase::Pressed
            && debounced
            && drag.current_offset.length() >= tap_slop
        {
            self.phase = GesturePhase::Dragging;
        }

        let distance = pointer.distance_to(self.anchor);
        if self.phase.is_dragging() {
            let inside = distance < snap_zone;
            self.phase = match (inside, drag.is_snapped) {
                (true, _) => GesturePhase::Snapped,
                (false, true) => GesturePhase::Unsnapped,
                (false, false) => self.phase,
            };
            drag.is_snapped = inside;
        }

        let display_position = if drag.is_snapped {
            self.pulled(pointer, distance)
        } else {
            pointer
        };

        Some(DragFeedback {
            phase: self.phase,
            display_position,
            distance_to_anchor: distance,
        })
    }

    /// End the gesture and decide its outcome. `None` when no gesture is live.
    pub fn release(&mut self, pointer: Position, at: Instant) -> Option<GestureOutcome> {
        let drag = self.drag.take()?;
        let pressed_at = self.pressed_at.take();
        let phase = std::mem::take(&mut self.phase);

        let moved = pointer.distance_to(drag.start_position);
        let debounced = pressed_at.map_or(true, |p| {
            at.saturating_duration_since(p) >= self.config.tap_delay()
        });

        if !phase.is_dragging() {
            if moved < self.config.tap_slop && !debounced {
                return Some(GestureOutcome::Tapped(drag.user_id));
            }
            if moved < self.config.tap_slop || !debounced {
                return Some(GestureOutcome::Cancelled(drag.user_id));
            }
        }

        if pointer.distance_to(self.anchor) < self.config.drop_threshold() {
            Some(GestureOutcome::Selected(drag.user_id))
        } else {
            Some(GestureOutcome::Cancelled(drag.user_id))
        }
    }

    /// Abandon the live gesture, e.g. when the pointer is captured elsewhere.
    pub fn cancel(&mut self) -> Option<GestureOutcome> {
        self.pressed_at = None;
        self.phase = GesturePhase::Idle;
        self.drag
            .take()
            .map(|drag| GestureOutcome::Cancelled(drag.user_id))
    }

    fn is_debounced(&self, at: Instant) -> bool {
        self.pressed_at
            .map_or(true, |p| at.saturating_duration_since(p) >= self.config.tap_delay())
    }

    fn pulled(&self, pointer: Position, distance: f64) -> Position {
        let pull = (self.config.magnetic_pull * self.config.snap_zone()).min(distance);
        pointer + (self.anchor - pointer).normalized().scaled(pull)
    }
}
