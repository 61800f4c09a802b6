//! Per-invocation handler context.

use std::{fmt, sync::Arc};

use gatebot_core::{Payload, Push, Sender};
use gatebot_session::PendingResult;

use crate::{ApiError, Bot, MessageChain};

/// What a handler gets: the bot and the push that triggered it.
#[derive(Clone)]
pub struct Context {
    bot: Bot,
    push: Arc<Push>,
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("push", &self.push)
            .finish_non_exhaustive()
    }
}

impl Context {
    pub(crate) const fn new(bot: Bot, push: Arc<Push>) -> Self {
        Self { bot, push }
    }

    #[must_use]
    pub const fn bot(&self) -> &Bot {
        &self.bot
    }

    #[must_use]
    pub fn push(&self) -> &Push {
        &self.push
    }

    #[must_use]
    pub fn payload(&self) -> &Payload {
        self.push.payload()
    }

    #[must_use]
    pub fn sender(&self) -> Option<&Sender> {
        self.payload().sender()
    }

    /// Plain text of the triggering payload.
    #[must_use]
    pub fn text(&self) -> String {
        self.payload().text()
    }

    /// Answer where the triggering message came from: a friend privately,
    /// a group message in its group, a temporary chat through its group.
    ///
    /// # Errors
    /// Returns [`ApiError::NoReplyTarget`] if the push has no sender.
    pub fn reply(&self, message: impl Into<MessageChain>) -> Result<PendingResult, ApiError> {
        self.reply_quoting(message.into(), None)
    }

    /// Like [`reply`](Self::reply), quoting the triggering message.
    ///
    /// # Errors
    /// Returns [`ApiError::NoReplyTarget`] if the push has no sender.
    pub fn quote_reply(&self, message: impl Into<MessageChain>) -> Result<PendingResult, ApiError> {
        let quote = self.payload().message_id();
        tracing::debug!("Quote reply to messageId={quote:?}");
        self.reply_quoting(message.into(), quote)
    }

    fn reply_quoting(
        &self,
        message: MessageChain,
        quote: Option<i64>,
    ) -> Result<PendingResult, ApiError> {
        let sender = self
            .sender()
            .ok_or_else(|| ApiError::NoReplyTarget(self.payload().kind().to_string()))?;
        tracing::debug!("Reply to {} {}", sender.name(), sender.id());
        Ok(match sender {
            Sender::Friend(s) => self.bot.send_friend_message(s.id, message, quote),
            Sender::Group(s) => self.bot.send_group_message(s.group.id, message, quote),
            Sender::Temp(s) => self.bot.send_temp_message(s.id, s.group.id, message, quote),
        })
    }
}

#[cfg(test)]
mod tests {
    use gatebot_core::Identity;
    use gatebot_session::{RequestError, SessionConfig};
    use serde_json::json;

    use super::*;
    use crate::BotConfig;

    fn context(body: serde_json::Value) -> Context {
        let bot = Bot::new(BotConfig::new(SessionConfig::new(Identity(1), "key")));
        Context::new(bot, Arc::new(Push::decode(body).unwrap()))
    }

    #[test]
    fn test_event_has_no_reply_target() {
        let ctx = context(json!({"type": "BotOnlineEvent", "qq": 1}));
        assert!(matches!(
            ctx.reply("hi"),
            Err(ApiError::NoReplyTarget(kind)) if kind == "BotOnlineEvent"
        ));
    }

    #[tokio::test]
    async fn test_reply_before_start_is_not_connected() {
        let ctx = context(json!({
            "type": "FriendMessage",
            "sender": {"id": 2, "nickname": "n"},
            "messageChain": [{"type": "Plain", "text": "hi"}]
        }));
        assert_eq!(ctx.text(), "hi");
        let pending = ctx.reply("hello").unwrap();
        assert_eq!(pending.await, Err(RequestError::NotConnected));
    }
}
