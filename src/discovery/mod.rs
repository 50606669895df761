pub mod config;
pub mod filter;
mod loop_worker;
pub mod session;
pub mod state;

pub use config::DiscoveryConfig;
pub use filter::{FilterVerdict, SelfIdentity, SightingFilter};
pub use session::{DiscoverySession, SightingSink};
pub use state::SessionState;
