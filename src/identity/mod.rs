pub mod config;
pub mod directory;
pub mod resolver;

pub use config::IdentityConfig;
pub use directory::Directory;
pub use resolver::{normalize_token, IdentityResolver};
