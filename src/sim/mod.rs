//! In-memory stand-ins for the radio driver and the user directory.

pub mod directory;
pub mod radio;

pub use directory::MemoryDirectory;
pub use radio::SimulatedRadio;
