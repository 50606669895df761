pub mod conversation;
pub mod discovery;
pub mod error;
pub mod gesture;
pub mod identity;
pub mod layout;
pub mod models;
pub mod nearby;
pub mod radio;
pub mod settings;
pub mod sim;
mod utils;

pub use conversation::{ConversationInitiator, ConversationRequest};
pub use discovery::{DiscoveryConfig, DiscoverySession, SelfIdentity, SessionState};
pub use error::{DirectoryError, DiscoveryError, ResolveError};
pub use gesture::{GestureConfig, GestureOutcome, SelectionGesture};
pub use identity::{Directory, IdentityConfig, IdentityResolver};
pub use layout::{Layout, LayoutConfig, LayoutEngine, LayoutPolicy, PlacedUser, Position};
pub use models::{DiscoveredUser, Sighting, UserId, UserRecord};
pub use nearby::NearbyController;
pub use radio::RadioAdapter;
pub use settings::{RadarSettings, SettingsStore};
pub use utils::init_logging;
