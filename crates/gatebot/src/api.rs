//! Request helpers for common gateway commands.

use gatebot_core::Push;
use gatebot_session::PendingResult;
use serde_json::{Value, json};

use crate::{ApiError, Bot, MessageChain};

/// Check a `{code, msg}` reply, returning it on `code == 0`.
///
/// # Errors
/// Returns [`ApiError::Rejected`] for a non-zero code and
/// [`ApiError::Malformed`] if the reply has no code.
pub fn ensure_ok(reply: Value) -> Result<Value, ApiError> {
    match reply.get("code").and_then(Value::as_i64) {
        Some(0) => Ok(reply),
        Some(code) => Err(ApiError::Rejected {
            code,
            message: reply
                .get("msg")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
        }),
        None => Err(ApiError::Malformed(format!("missing code in {reply}"))),
    }
}

fn with_quote(mut content: Value, quote: Option<i64>) -> Value {
    if let (Some(quote), Some(map)) = (quote, content.as_object_mut()) {
        map.insert("quote".to_string(), json!(quote));
    }
    content
}

impl Bot {
    /// Send a private message to a friend.
    pub fn send_friend_message(
        &self,
        target: i64,
        message: impl Into<MessageChain>,
        quote: Option<i64>,
    ) -> PendingResult {
        let chain: MessageChain = message.into();
        let content = json!({"target": target, "messageChain": chain});
        self.request("sendFriendMessage", None, with_quote(content, quote))
    }

    /// Send a message to a group.
    pub fn send_group_message(
        &self,
        target: i64,
        message: impl Into<MessageChain>,
        quote: Option<i64>,
    ) -> PendingResult {
        let chain: MessageChain = message.into();
        let content = json!({"target": target, "messageChain": chain});
        self.request("sendGroupMessage", None, with_quote(content, quote))
    }

    /// Send a temporary message to a group member.
    pub fn send_temp_message(
        &self,
        target: i64,
        group: i64,
        message: impl Into<MessageChain>,
        quote: Option<i64>,
    ) -> PendingResult {
        let chain: MessageChain = message.into();
        let content = json!({"qq": target, "group": group, "messageChain": chain});
        self.request("sendTempMessage", None, with_quote(content, quote))
    }

    /// Send a private message to the configured admin.
    ///
    /// # Errors
    /// Returns [`ApiError::NoAdmin`] if no admin is configured.
    pub fn send_to_admin(&self, message: impl Into<MessageChain>) -> Result<PendingResult, ApiError> {
        let admin = self.config().admin.ok_or(ApiError::NoAdmin)?;
        Ok(self.send_friend_message(admin.0, message, None))
    }

    /// Look up a cached message by id.
    ///
    /// # Errors
    /// Returns error if the request fails, the gateway rejects it, or the
    /// returned message does not decode.
    pub async fn message_from_id(&self, message_id: i64) -> Result<Push, ApiError> {
        let reply = ensure_ok(
            self.request("messageFromId", None, json!({"id": message_id}))
                .await?,
        )
        .inspect_err(|e| tracing::error!("messageFromId failed: {e}"))?;
        let data = reply
            .get("data")
            .cloned()
            .ok_or_else(|| ApiError::Malformed("messageFromId reply has no data".into()))?;
        Ok(Push::decode(data)?)
    }
}
