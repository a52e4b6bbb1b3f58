//! Notifications emitted by the core.
//!
//! Delivery is fire-and-forget: a closed or slow consumer never blocks a run.

use serde::Serialize;
use tokio::sync::mpsc;

/// Events for presentation layers. Consumers re-read state on receipt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AppEvent {
    /// Messages or the generating flag of a conversation changed.
    ConversationUpdated { conversation_id: i64 },

    /// A pending approval was added to or removed from a conversation.
    ApprovalsUpdated { conversation_id: i64 },

    /// A conversation was created or deleted.
    ConversationsUpdated,

    /// A background failure the user should see.
    AsyncError { error: String },
}

pub type EventSender = mpsc::UnboundedSender<AppEvent>;

/// Send without caring whether anyone is listening
pub(crate) fn emit(events: &EventSender, event: AppEvent) {
    let _ = events.send(event);
}
