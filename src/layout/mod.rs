pub mod config;
mod engine;
pub mod geometry;
mod radar;
mod slots;

pub use config::{LayoutConfig, LayoutPolicy};
pub use engine::{Layout, LayoutEngine, PlacedUser};
pub use geometry::{Offset, Position};
pub use radar::base_radius;
pub use slots::{slot_positions, usable_slot_count};
