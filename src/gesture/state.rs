use serde::{Deserialize, Serialize};

use crate::layout::{Offset, Position};
use crate::models::UserId;

/// Live drag of one bubble. Dropped on release.
#[derive(Debug, Clone, PartialEq)]
pub struct DragState {
    pub user_id: UserId,
    pub start_position: Position,
    /// Raw pointer displacement from `start_position`
    pub current_offset: Offset,
    pub is_snapped: bool,
}

impl DragState {
    pub fn pointer(&self) -> Position {
        self.start_position + self.current_offset
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub enum GesturePhase {
    #[default]
    Idle,
    Pressed,
    Dragging,
    Snapped,
    Unsnapped,
}

impl GesturePhase {
    pub fn is_dragging(&self) -> bool {
        matches!(
            self,
            GesturePhase::Dragging | GesturePhase::Snapped | GesturePhase::Unsnapped
        )
    }
}

/// How a gesture ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "kind", content = "userId")]
pub enum GestureOutcome {
    /// Short press without movement: open the profile
    Tapped(UserId),
    /// Dropped on the anchor: start a conversation
    Selected(UserId),
    Cancelled(UserId),
}

impl GestureOutcome {
    pub fn user_id(&self) -> &UserId {
        match self {
            GestureOutcome::Tapped(id)
            | GestureOutcome::Selected(id)
            | GestureOutcome::Cancelled(id) => id,
        }
    }
}

/// What the surface should draw after a pointer sample.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DragFeedback {
    pub phase: GesturePhase,
    /// Where the bubble is drawn, magnetic pull applied
    pub display_position: Position,
    pub distance_to_anchor: f64,
}
