pub mod sighting;
pub mod user;

pub use sighting::Sighting;
pub use user::{DiscoveredUser, UserId, UserRecord};
