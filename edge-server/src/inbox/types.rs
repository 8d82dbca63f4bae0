//! Canonical message types stored in the inbox.
//!
//! QQ delivers group and direct messages with different author shapes. Both
//! are normalized into a [`CanonicalMessage`] whose origin is a tagged union
//! keyed by the event type, so consumers never check optional fields.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Event type for a bot @-mention inside a group.
pub const GROUP_AT_MESSAGE_CREATE: &str = "GROUP_AT_MESSAGE_CREATE";

/// Event type for a direct (one-to-one) message.
pub const C2C_MESSAGE_CREATE: &str = "C2C_MESSAGE_CREATE";

/// Where a message came from, tagged by its QQ event type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum MessageOrigin {
    #[serde(rename = "GROUP_AT_MESSAGE_CREATE", rename_all = "camelCase")]
    GroupAt {
        group_id: String,
        sender_id: String,
        sender_nickname: String,
    },
    #[serde(rename = "C2C_MESSAGE_CREATE", rename_all = "camelCase")]
    Direct {
        sender_id: String,
        sender_nickname: String,
    },
}

impl MessageOrigin {
    pub fn event_type(&self) -> &'static str {
        match self {
            MessageOrigin::GroupAt { .. } => GROUP_AT_MESSAGE_CREATE,
            MessageOrigin::Direct { .. } => C2C_MESSAGE_CREATE,
        }
    }

    /// Task source label used when the message becomes a task.
    pub fn task_source(&self) -> &'static str {
        match self {
            MessageOrigin::GroupAt { .. } => "qq_group",
            MessageOrigin::Direct { .. } => "qq_private",
        }
    }

    pub fn group_id(&self) -> Option<&str> {
        match self {
            MessageOrigin::GroupAt { group_id, .. } => Some(group_id),
            MessageOrigin::Direct { .. } => None,
        }
    }

    pub fn sender_nickname(&self) -> &str {
        match self {
            MessageOrigin::GroupAt { sender_nickname, .. }
            | MessageOrigin::Direct { sender_nickname, .. } => sender_nickname,
        }
    }
}

/// A normalized message before the inbox has accepted it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewMessage {
    pub id: String,
    pub origin: MessageOrigin,
    pub content: String,
    /// Platform event time in epoch milliseconds.
    pub source_timestamp: i64,
}

/// A message as stored in, and served from, the inbox.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CanonicalMessage {
    pub id: String,
    #[serde(flatten)]
    pub origin: MessageOrigin,
    pub content: String,
    pub source_timestamp: i64,
    pub created_at: DateTime<Utc>,
    pub processed: bool,
}

impl CanonicalMessage {
    pub(crate) fn accept(message: NewMessage, created_at: DateTime<Utc>) -> Self {
        Self {
            id: message.id,
            origin: message.origin,
            content: message.content,
            source_timestamp: message.source_timestamp,
            created_at,
            processed: false,
        }
    }
}

/// Result of a "mark processed" request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkOutcome {
    Marked,
    AlreadyProcessed,
    NotFound,
}

/// Inbox counters for the status endpoint.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InboxStats {
    pub total_messages: usize,
    pub unprocessed_messages: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn group_message() -> CanonicalMessage {
        CanonicalMessage {
            id: "msg_1_abc".to_string(),
            origin: MessageOrigin::GroupAt {
                group_id: "G1".to_string(),
                sender_id: "M1".to_string(),
                sender_nickname: "Alice".to_string(),
            },
            content: "hello".to_string(),
            source_timestamp: 1_700_000_000_000,
            created_at: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            processed: false,
        }
    }

    #[test]
    fn test_group_message_wire_shape() {
        let json = serde_json::to_value(group_message()).unwrap();

        assert_eq!(json["type"], "GROUP_AT_MESSAGE_CREATE");
        assert_eq!(json["groupId"], "G1");
        assert_eq!(json["senderId"], "M1");
        assert_eq!(json["senderNickname"], "Alice");
        assert_eq!(json["sourceTimestamp"], 1_700_000_000_000i64);
        assert_eq!(json["processed"], false);
        assert!(json["createdAt"].as_str().unwrap().starts_with("2024-01-01T00:00:00"));
    }

    #[test]
    fn test_direct_message_has_no_group_id() {
        let mut message = group_message();
        message.origin = MessageOrigin::Direct {
            sender_id: "U1".to_string(),
            sender_nickname: "Bob".to_string(),
        };

        let json = serde_json::to_value(&message).unwrap();
        assert_eq!(json["type"], "C2C_MESSAGE_CREATE");
        assert!(json.get("groupId").is_none());

        let parsed: CanonicalMessage = serde_json::from_value(json).unwrap();
        assert_eq!(parsed, message);
    }

    #[test]
    fn test_origin_helpers() {
        let message = group_message();
        assert_eq!(message.origin.event_type(), GROUP_AT_MESSAGE_CREATE);
        assert_eq!(message.origin.task_source(), "qq_group");
        assert_eq!(message.origin.group_id(), Some("G1"));
        assert_eq!(message.origin.sender_nickname(), "Alice");
    }
}
