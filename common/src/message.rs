use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::identity::UserId;

/// Unique identifier for a message. Server-assigned for persisted
/// messages; optimistic local copies carry a `local-` prefixed id derived
/// from their [`ClientKey`].
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct MessageId(pub String);

/// Idempotency key attached to push sends (random u64, hex-rendered).
///
/// The transport echoes it back with the delivered copy, letting the
/// receiving side drop the echo of its own optimistic append.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ClientKey(pub String);

impl ClientKey {
    pub fn generate() -> Self {
        ClientKey(format!("{:016x}", rand::random::<u64>()))
    }
}

/// A direct message between two users.
///
/// Sender/receiver display fields are denormalized by the server so the
/// conversation view renders without extra profile lookups.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: MessageId,
    pub sender_id: UserId,
    pub receiver_id: UserId,
    pub content: String,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender_avatar: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub receiver_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub receiver_avatar: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_key: Option<ClientKey>,
}

impl Message {
    /// Build the optimistic local copy of an outbound message.
    pub fn outgoing(
        sender: UserId,
        receiver: UserId,
        content: impl Into<String>,
        key: ClientKey,
    ) -> Self {
        Message {
            id: MessageId(format!("local-{}", key.0)),
            sender_id: sender,
            receiver_id: receiver,
            content: content.into(),
            created_at: Utc::now(),
            sender_name: None,
            sender_avatar: None,
            receiver_name: None,
            receiver_avatar: None,
            client_key: Some(key),
        }
    }
}

/// One entry in a user's conversation list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationSummary {
    pub peer_id: UserId,
    pub peer_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub peer_avatar: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_activity: Option<DateTime<Utc>>,
    #[serde(default)]
    pub unread: u32,
}
