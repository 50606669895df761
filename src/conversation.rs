use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::models::UserId;

/// Emitted when a drag ends on the anchor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationRequest {
    pub user_id: UserId,
    pub first_message: Option<String>,
}

/// Host-side component that opens a conversation with a selected user.
pub trait ConversationInitiator: Send + Sync {
    fn initiate(&self, request: ConversationRequest);
}

impl ConversationInitiator for mpsc::UnboundedSender<ConversationRequest> {
    fn initiate(&self, request: ConversationRequest) {
        if self.send(request).is_err() {
            log::warn!("conversation receiver dropped, selection discarded");
        }
    }
}
