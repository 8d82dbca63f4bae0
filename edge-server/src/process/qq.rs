//! QQ open platform webhook payloads.
//!
//! Field names follow the platform's JSON. Every payload field is optional on
//! the wire; missing values fall back to defaults during normalization.

use serde::Deserialize;
use serde_json::Value;

use crate::inbox::{C2C_MESSAGE_CREATE, GROUP_AT_MESSAGE_CREATE};

/// Opcode for an event push.
pub const OP_DISPATCH: i64 = 0;

/// Opcode for the callback URL validation challenge.
pub const OP_CALLBACK_VALIDATION: i64 = 13;

/// One webhook delivery.
///
/// `op` and `t` read as `None` when absent or not of the expected JSON type,
/// so an odd envelope is acknowledged instead of rejected.
#[derive(Debug, Clone, Default)]
pub struct InboundEnvelope {
    pub op: Option<i64>,
    pub t: Option<String>,
    pub d: Option<Value>,
}

impl InboundEnvelope {
    pub fn from_value(body: Value) -> Self {
        let Value::Object(mut fields) = body else {
            return Self::default();
        };

        Self {
            op: fields.get("op").and_then(Value::as_i64),
            t: fields.get("t").and_then(Value::as_str).map(str::to_string),
            d: fields.remove("d"),
        }
    }
}

/// The `d` payload of an `op = 13` delivery.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ValidationChallenge {
    pub plain_token: String,
    pub event_ts: String,
}

impl ValidationChallenge {
    /// Read the challenge out of `d`. Non-object or mistyped payloads read as empty.
    pub fn from_payload(d: Option<Value>) -> Self {
        match d {
            Some(v @ Value::Object(_)) => serde_json::from_value(v).unwrap_or_default(),
            _ => Self::default(),
        }
    }

    pub fn is_complete(&self) -> bool {
        !self.plain_token.is_empty() && !self.event_ts.is_empty()
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct GroupAuthor {
    pub member_openid: String,
    pub member_nickname: Option<String>,
}

/// `GROUP_AT_MESSAGE_CREATE` payload.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct GroupAtPayload {
    pub id: String,
    pub group_openid: String,
    pub author: GroupAuthor,
    pub content: String,
    pub timestamp: Option<Value>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct C2cAuthor {
    pub user_openid: String,
    pub user_nickname: Option<String>,
}

/// `C2C_MESSAGE_CREATE` payload.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct C2cPayload {
    pub id: String,
    pub author: C2cAuthor,
    pub content: String,
    pub timestamp: Option<Value>,
}

/// An `op = 0` event, dispatched on its `t` tag.
#[derive(Debug, Clone)]
pub enum QqEvent {
    GroupAtMessage(GroupAtPayload),
    DirectMessage(C2cPayload),
    /// Any other event type; acknowledged and dropped.
    Unhandled(String),
}

impl QqEvent {
    pub fn parse(t: Option<String>, d: Option<Value>) -> Result<Self, serde_json::Error> {
        let event_type = t.unwrap_or_default();
        let payload = match d {
            Some(Value::Null) | None => Value::Object(Default::default()),
            Some(v) => v,
        };

        match event_type.as_str() {
            GROUP_AT_MESSAGE_CREATE => {
                Ok(QqEvent::GroupAtMessage(serde_json::from_value(payload)?))
            }
            C2C_MESSAGE_CREATE => Ok(QqEvent::DirectMessage(serde_json::from_value(payload)?)),
            _ => Ok(QqEvent::Unhandled(event_type)),
        }
    }

    pub fn event_type(&self) -> &str {
        match self {
            QqEvent::GroupAtMessage(_) => GROUP_AT_MESSAGE_CREATE,
            QqEvent::DirectMessage(_) => C2C_MESSAGE_CREATE,
            QqEvent::Unhandled(t) => t,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_envelope_unknown_op() {
        let envelope = InboundEnvelope::from_value(json!({"op": 99}));
        assert_eq!(envelope.op, Some(99));
        assert!(envelope.t.is_none());
        assert!(envelope.d.is_none());
    }

    #[test]
    fn test_envelope_mistyped_fields_read_as_absent() {
        let envelope = InboundEnvelope::from_value(json!({"op": "13", "t": 5, "d": {"x": 1}}));
        assert!(envelope.op.is_none());
        assert!(envelope.t.is_none());
        assert_eq!(envelope.d, Some(json!({"x": 1})));

        assert!(InboundEnvelope::from_value(json!({"op": 1.5})).op.is_none());
        assert!(InboundEnvelope::from_value(json!([0, 13])).op.is_none());
    }

    #[test]
    fn test_challenge_from_payload() {
        let challenge = ValidationChallenge::from_payload(Some(json!({
            "plain_token": "Arq0D5A61EgUu4OxUvOp",
            "event_ts": "1725442341"
        })));
        assert!(challenge.is_complete());
        assert_eq!(challenge.plain_token, "Arq0D5A61EgUu4OxUvOp");
    }

    #[test]
    fn test_challenge_incomplete_shapes() {
        assert!(!ValidationChallenge::from_payload(None).is_complete());
        assert!(!ValidationChallenge::from_payload(Some(json!("text"))).is_complete());
        assert!(!ValidationChallenge::from_payload(Some(json!({"event_ts": "1"}))).is_complete());
        assert!(!ValidationChallenge::from_payload(Some(json!({"plain_token": 5, "event_ts": "1"})))
            .is_complete());
    }

    #[test]
    fn test_parse_group_event() {
        let event = QqEvent::parse(
            Some(GROUP_AT_MESSAGE_CREATE.to_string()),
            Some(json!({
                "group_openid": "G1",
                "author": {"member_openid": "M1"},
                "content": " 交报告",
                "timestamp": "2024-05-01T12:00:00+08:00"
            })),
        )
        .unwrap();

        match event {
            QqEvent::GroupAtMessage(p) => {
                assert_eq!(p.group_openid, "G1");
                assert_eq!(p.author.member_openid, "M1");
                assert!(p.author.member_nickname.is_none());
                assert_eq!(p.content, " 交报告");
            }
            other => panic!("Expected group event, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_other_event_type() {
        let event = QqEvent::parse(Some("GROUP_ADD_ROBOT".to_string()), None).unwrap();
        assert!(matches!(event, QqEvent::Unhandled(ref t) if t == "GROUP_ADD_ROBOT"));
        assert_eq!(event.event_type(), "GROUP_ADD_ROBOT");
    }

    #[test]
    fn test_parse_mistyped_payload_fails() {
        let result = QqEvent::parse(
            Some(C2C_MESSAGE_CREATE.to_string()),
            Some(json!({"content": 42})),
        );
        assert!(result.is_err());
    }
}
