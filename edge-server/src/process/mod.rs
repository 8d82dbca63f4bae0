//! Webhook payload processing module.
//!
//! Turns QQ event payloads into messages ready for the inbox.
//!
//! ## Processing Flow
//!
//! ```text
//! InboundEnvelope → QqEvent::parse() → normalize() → NewMessage
//! ```

pub mod qq;

use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::info;

use crate::inbox::{MessageOrigin, NewMessage};
use crate::util::generate_id;

pub use qq::{InboundEnvelope, QqEvent, ValidationChallenge, OP_CALLBACK_VALIDATION, OP_DISPATCH};

/// Nickname recorded when the platform omits one.
pub const UNKNOWN_NICKNAME: &str = "未知用户";

/// Normalize an event into an inbox message.
///
/// Returns `None` for event types that are acknowledged but not stored.
pub fn normalize(event: QqEvent, now: DateTime<Utc>) -> Option<NewMessage> {
    let (origin, content, timestamp) = match event {
        QqEvent::GroupAtMessage(payload) => (
            MessageOrigin::GroupAt {
                group_id: payload.group_openid,
                sender_id: payload.author.member_openid,
                sender_nickname: nickname_or_unknown(payload.author.member_nickname),
            },
            payload.content,
            payload.timestamp,
        ),
        QqEvent::DirectMessage(payload) => (
            MessageOrigin::Direct {
                sender_id: payload.author.user_openid,
                sender_nickname: nickname_or_unknown(payload.author.user_nickname),
            },
            payload.content,
            payload.timestamp,
        ),
        QqEvent::Unhandled(event_type) => {
            info!(event_type = %event_type, "qq_event_ignored");
            return None;
        }
    };

    let message = NewMessage {
        id: generate_id("msg"),
        source_timestamp: source_timestamp(timestamp.as_ref(), now),
        origin,
        content,
    };

    info!(
        message_id = %message.id,
        message_type = message.origin.event_type(),
        sender = %message.origin.sender_nickname(),
        content_length = message.content.chars().count(),
        "qq_event_normalized"
    );

    Some(message)
}

fn nickname_or_unknown(nickname: Option<String>) -> String {
    nickname
        .filter(|n| !n.trim().is_empty())
        .unwrap_or_else(|| UNKNOWN_NICKNAME.to_string())
}

/// Platform event time as epoch milliseconds.
///
/// Accepts an integer, an integer string, or an RFC 3339 string; anything
/// else falls back to the ingestion time.
fn source_timestamp(raw: Option<&Value>, now: DateTime<Utc>) -> i64 {
    let parsed = match raw {
        Some(Value::Number(n)) => n.as_i64(),
        Some(Value::String(s)) => s.trim().parse::<i64>().ok().or_else(|| {
            DateTime::parse_from_rfc3339(s.trim())
                .ok()
                .map(|dt| dt.timestamp_millis())
        }),
        _ => None,
    };

    parsed.unwrap_or_else(|| now.timestamp_millis())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inbox::{C2C_MESSAGE_CREATE, GROUP_AT_MESSAGE_CREATE};
    use chrono::TimeZone;
    use serde_json::json;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 4, 0, 0).unwrap()
    }

    #[test]
    fn test_normalize_group_message() {
        let event = QqEvent::parse(
            Some(GROUP_AT_MESSAGE_CREATE.to_string()),
            Some(json!({
                "group_openid": "G1",
                "author": {"member_openid": "M1", "member_nickname": "Alice"},
                "content": "今天下午3点前完成报告",
                "timestamp": 1714536000000i64
            })),
        )
        .unwrap();

        let message = normalize(event, now()).unwrap();

        assert!(message.id.starts_with("msg_"));
        assert_eq!(message.content, "今天下午3点前完成报告");
        assert_eq!(message.source_timestamp, 1714536000000);
        assert_eq!(
            message.origin,
            MessageOrigin::GroupAt {
                group_id: "G1".to_string(),
                sender_id: "M1".to_string(),
                sender_nickname: "Alice".to_string(),
            }
        );
    }

    #[test]
    fn test_normalize_direct_message_defaults() {
        let event = QqEvent::parse(
            Some(C2C_MESSAGE_CREATE.to_string()),
            Some(json!({"author": {"user_openid": "U1"}, "content": "hi"})),
        )
        .unwrap();

        let message = normalize(event, now()).unwrap();

        assert_eq!(message.origin.event_type(), C2C_MESSAGE_CREATE);
        assert_eq!(message.origin.sender_nickname(), UNKNOWN_NICKNAME);
        assert_eq!(message.source_timestamp, now().timestamp_millis());
    }

    #[test]
    fn test_normalize_unhandled_event() {
        assert!(normalize(QqEvent::Unhandled("FRIEND_ADD".to_string()), now()).is_none());
    }

    #[test]
    fn test_source_timestamp_variants() {
        assert_eq!(source_timestamp(Some(&json!(1700)), now()), 1700);
        assert_eq!(source_timestamp(Some(&json!("1700")), now()), 1700);
        assert_eq!(
            source_timestamp(Some(&json!("2024-05-01T12:00:00+08:00")), now()),
            now().timestamp_millis()
        );
        assert_eq!(
            source_timestamp(Some(&json!("yesterday")), now()),
            now().timestamp_millis()
        );
        assert_eq!(source_timestamp(None, now()), now().timestamp_millis());
    }

    #[test]
    fn test_blank_nickname_becomes_unknown() {
        assert_eq!(nickname_or_unknown(Some("  ".to_string())), UNKNOWN_NICKNAME);
        assert_eq!(nickname_or_unknown(Some("Bob".to_string())), "Bob");
    }
}
