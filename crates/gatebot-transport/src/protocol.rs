//! Wire protocol for the gateway connection.

use bytes::Bytes;
use gatebot_core::{HandshakeError, SessionKey, SyncId};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Protocol error.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Frame sent to the gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutboundFrame {
    /// Correlation id echoed back in the response.
    pub sync_id: SyncId,
    /// Command name, e.g. `sendGroupMessage`.
    pub command: String,
    /// Optional sub-command, e.g. `get` or `update`.
    pub sub_command: Option<String>,
    /// Command arguments.
    pub content: Value,
}

impl OutboundFrame {
    /// Create a new outbound frame.
    #[must_use]
    pub fn new(
        sync_id: SyncId,
        command: impl Into<String>,
        sub_command: Option<String>,
        content: Value,
    ) -> Self {
        Self {
            sync_id,
            command: command.into(),
            sub_command,
            content,
        }
    }

    /// Encode to wire bytes.
    ///
    /// # Errors
    /// Returns error if serialization fails.
    pub fn encode(&self) -> Result<Bytes, ProtocolError> {
        Ok(Bytes::from(serde_json::to_vec(self)?))
    }
}

/// Frame received from the gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InboundFrame {
    /// Correlation id, or the reserved push id.
    pub sync_id: SyncId,
    /// Response or push body.
    #[serde(default)]
    pub data: Value,
}

impl InboundFrame {
    /// Decode from wire bytes.
    ///
    /// # Errors
    /// Returns error if the bytes are not a valid frame.
    pub fn decode(raw: &[u8]) -> Result<Self, ProtocolError> {
        Ok(serde_json::from_slice(raw)?)
    }

    /// Whether this frame is an unsolicited push.
    #[must_use]
    pub fn is_push(&self, reserved: SyncId) -> bool {
        self.sync_id == reserved
    }
}

/// Validate a `{code, msg}` reply, returning it unchanged on success.
///
/// # Errors
/// Returns [`HandshakeError::Rejected`] for a non-zero code and
/// [`HandshakeError::Malformed`] if there is no code at all.
pub fn check_reply(body: Value) -> Result<Value, HandshakeError> {
    let code = body
        .get("code")
        .and_then(Value::as_i64)
        .ok_or_else(|| HandshakeError::Malformed(format!("missing code in {body}")))?;
    if code != 0 {
        let message = body
            .get("msg")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        return Err(HandshakeError::Rejected { code, message });
    }
    Ok(body)
}

/// Read the session key out of the frame a gateway sends when it opens a
/// session for a new connection: `{"syncId": "", "data": {"code": 0, "session": ".."}}`.
///
/// # Errors
/// Returns [`HandshakeError::Rejected`] if the gateway refused the
/// connection and [`HandshakeError::Malformed`] for anything else that is
/// not a session announcement.
pub fn decode_session_announce(raw: &[u8]) -> Result<SessionKey, HandshakeError> {
    let mut frame: Value =
        serde_json::from_slice(raw).map_err(|e| HandshakeError::Malformed(e.to_string()))?;
    let data = frame
        .get_mut("data")
        .map(Value::take)
        .ok_or_else(|| HandshakeError::Malformed(format!("no data in {frame}")))?;
    check_reply(data)?
        .get("session")
        .and_then(Value::as_str)
        .map(SessionKey::new)
        .ok_or_else(|| HandshakeError::Malformed("announcement has no session".into()))
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_outbound_frame_shape() {
        let frame = OutboundFrame::new(
            SyncId(3),
            "sendFriendMessage",
            None,
            json!({"target": 1}),
        );
        let encoded: Value = serde_json::from_slice(&frame.encode().unwrap()).unwrap();
        assert_eq!(
            encoded,
            json!({
                "syncId": "3",
                "command": "sendFriendMessage",
                "subCommand": null,
                "content": {"target": 1}
            })
        );
    }

    #[test]
    fn test_inbound_push_and_response() {
        let push = InboundFrame::decode(br#"{"syncId": "-1", "data": {"type": "ping"}}"#).unwrap();
        assert!(push.is_push(SyncId::PUSH));

        let resp = InboundFrame::decode(br#"{"syncId": 7, "data": {"code": 0}}"#).unwrap();
        assert!(!resp.is_push(SyncId::PUSH));
        assert_eq!(resp.sync_id, SyncId(7));
        assert_eq!(resp.data["code"], 0);
    }

    #[test]
    fn test_inbound_garbage_is_rejected() {
        assert!(InboundFrame::decode(b"not json").is_err());
        assert!(InboundFrame::decode(br#"{"data": {}}"#).is_err());
    }

    #[test]
    fn test_check_reply_accepts_zero_code() {
        let body = json!({"code": 0, "session": "abc"});
        assert_eq!(check_reply(body.clone()).unwrap(), body);
    }

    #[test]
    fn test_check_reply_rejects_non_zero_code() {
        let err = check_reply(json!({"code": 1, "msg": "wrong verify key"})).unwrap_err();
        match err {
            HandshakeError::Rejected { code, message } => {
                assert_eq!(code, 1);
                assert_eq!(message, "wrong verify key");
            }
            other => panic!("expected Rejected, got: {other:?}"),
        }
    }

    #[test]
    fn test_check_reply_requires_code() {
        assert!(matches!(
            check_reply(json!({"msg": "?"})),
            Err(HandshakeError::Malformed(_))
        ));
    }

    #[test]
    fn test_session_announce() {
        let key =
            decode_session_announce(br#"{"syncId": "", "data": {"code": 0, "session": "S"}}"#)
                .unwrap();
        assert_eq!(key, SessionKey::new("S"));

        assert!(matches!(
            decode_session_announce(br#"{"syncId": "", "data": {"code": 1, "msg": "bad key"}}"#),
            Err(HandshakeError::Rejected { code: 1, .. })
        ));
        assert!(matches!(
            decode_session_announce(br#"{"syncId": "-1", "data": {"type": "ping"}}"#),
            Err(HandshakeError::Malformed(_))
        ));
    }
}
