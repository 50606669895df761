pub mod config;
pub mod state;
mod tracker;

pub use config::GestureConfig;
pub use state::{DragFeedback, DragState, GestureOutcome, GesturePhase};
pub use tracker::SelectionGesture;
