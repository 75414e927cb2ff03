use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::identity::UserId;
use crate::message::ClientKey;

/// Events pushed from the platform to connected clients.
///
/// Frames are JSON with a `type` tag; payload fields use the same
/// camelCase names as the REST API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum ServerEvent {
    /// A message addressed to this client was delivered.
    NewMessage {
        sender_id: UserId,
        content: String,
        timestamp: DateTime<Utc>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        client_key: Option<ClientKey>,
    },
    /// The given user started typing to this client.
    TypingStart { user_id: UserId },
    /// The given user stopped typing to this client.
    TypingStop { user_id: UserId },
}

/// Commands a client publishes over the push transport.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum ClientCommand {
    SendMessage {
        receiver_id: UserId,
        content: String,
        client_key: ClientKey,
    },
    TypingStart { receiver_id: UserId },
    TypingStop { receiver_id: UserId },
    MarkRead { peer_id: UserId },
}
