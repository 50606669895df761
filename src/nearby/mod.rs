mod controller;
pub mod roster;

pub use controller::NearbyController;
pub use roster::{Roster, RosterChange};
