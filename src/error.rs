use thiserror::Error;

use crate::discovery::SessionState;

/// Failures of the scan/advertise lifecycle. None of them is fatal to the process.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DiscoveryError {
    #[error("radio adapter unavailable: {0}")]
    AdapterUnavailable(String),
    #[error("scan callback failed (device: {}): {message}", .device_id.as_deref().unwrap_or("-"))]
    ScanCallback {
        device_id: Option<String>,
        message: String,
    },
    #[error("adapter refused to start scanning: {0}")]
    ScanStartFailed(String),
    #[error("session is not ready (state: {0:?})")]
    NotInitialized(SessionState),
    #[error("scan already active")]
    AlreadyScanning,
    #[error("adapter refused to advertise")]
    AdvertiseFailed,
    #[error("no tokio runtime available to drive the scan cycle")]
    NoRuntime,
}

/// Error reported by the external directory.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("directory query failed: {0}")]
pub struct DirectoryError(pub String);

/// Outcome of a failed token resolution.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolveError {
    /// Expected outcome: the token belongs to nobody we know.
    #[error("no user advertises token '{token}'")]
    NotFound { token: String },
    /// Transient; the next fresh sighting of the device retries.
    #[error(transparent)]
    DirectoryUnavailable(#[from] DirectoryError),
}
