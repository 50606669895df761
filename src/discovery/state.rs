use serde::{Deserialize, Serialize};

/// Lifecycle of a discovery session. Advertising is tracked separately.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub enum SessionState {
    #[default]
    Idle,
    Initializing,
    Ready,
    Scanning,
    RestartingCycle,
    /// Scanning halted after an unrecoverable adapter error.
    Stopped,
}

impl SessionState {
    /// The adapter has been initialized and is usable.
    pub fn is_ready(&self) -> bool {
        matches!(
            self,
            SessionState::Ready
                | SessionState::Scanning
                | SessionState::RestartingCycle
                | SessionState::Stopped
        )
    }

    pub fn is_scanning(&self) -> bool {
        matches!(self, SessionState::Scanning | SessionState::RestartingCycle)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SessionState::Idle => "idle",
            SessionState::Initializing => "initializing",
            SessionState::Ready => "ready",
            SessionState::Scanning => "scanning",
            SessionState::RestartingCycle => "restarting",
            SessionState::Stopped => "stopped",
        }
    }
}
