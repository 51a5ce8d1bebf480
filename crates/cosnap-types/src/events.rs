use serde::{Deserialize, Serialize};

use crate::models::{Conversation, Message};

/// Events sent over the WebSocket gateway.
///
/// Snapshot events always carry the complete current state of what the
/// client is watching, never a delta.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum GatewayEvent {
    /// Server confirms successful authentication
    Ready { user_id: String, name: String },

    /// The user's conversations, most recently updated first
    InboxSnapshot {
        conversations: Vec<Conversation>,
        total_unread: u64,
    },

    /// Every message of a watched conversation, oldest first
    ConversationSnapshot {
        conversation_id: String,
        messages: Vec<Message>,
    },

    /// A command could not be honoured
    Error { message: String },
}

/// Commands sent FROM client TO server over WebSocket.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum GatewayCommand {
    /// Authenticate the WebSocket connection
    Identify { token: String },

    /// Start receiving snapshots of one conversation
    WatchConversation { conversation_id: String },

    /// Stop receiving snapshots of one conversation
    UnwatchConversation { conversation_id: String },
}
