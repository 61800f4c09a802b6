//! Composable handler predicates.
//!
//! A [`Predicate`] gates a handler: it sees the bot and the decoded payload
//! and decides whether the handler runs. Predicates combine with
//! [`and`](Predicate::and), [`or`](Predicate::or), [`not`](Predicate::not)
//! or the `&`, `|` and `!` operators.

use std::{
    fmt,
    ops::{BitAnd, BitOr, Not},
    sync::Arc,
};

use gatebot_core::{Payload, Permission, Sender};
use regex::Regex;

use crate::Bot;

type CheckFn = dyn Fn(&Bot, &Payload) -> bool + Send + Sync;

/// Boolean test over a payload.
#[derive(Clone)]
pub struct Predicate(Arc<CheckFn>);

impl fmt::Debug for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Predicate")
    }
}

impl Predicate {
    pub fn new<F>(check: F) -> Self
    where
        F: Fn(&Bot, &Payload) -> bool + Send + Sync + 'static,
    {
        Self(Arc::new(check))
    }

    /// Predicate that only looks at the payload.
    pub fn on_payload<F>(check: F) -> Self
    where
        F: Fn(&Payload) -> bool + Send + Sync + 'static,
    {
        Self::new(move |_, payload| check(payload))
    }

    #[must_use]
    pub fn test(&self, bot: &Bot, payload: &Payload) -> bool {
        (self.0)(bot, payload)
    }

    #[must_use]
    pub fn and(self, rhs: Self) -> Self {
        Self::new(move |bot, p| self.test(bot, p) && rhs.test(bot, p))
    }

    #[must_use]
    pub fn or(self, rhs: Self) -> Self {
        Self::new(move |bot, p| self.test(bot, p) || rhs.test(bot, p))
    }

    #[must_use]
    #[allow(clippy::should_implement_trait)]
    pub fn not(self) -> Self {
        Self::new(move |bot, p| !self.test(bot, p))
    }
}

impl BitAnd for Predicate {
    type Output = Self;

    fn bitand(self, rhs: Self) -> Self {
        self.and(rhs)
    }
}

impl BitOr for Predicate {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        self.or(rhs)
    }
}

impl Not for Predicate {
    type Output = Self;

    fn not(self) -> Self {
        Self::not(self)
    }
}

/// Which member-sender kinds a sender check also accepts besides friends.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Reach {
    /// Accept group message senders.
    pub in_group: bool,
    /// Accept temporary message senders (private chat through a group).
    pub from_group: bool,
}

impl Reach {
    /// Friends only.
    pub const FRIENDS: Self = Self {
        in_group: false,
        from_group: false,
    };
    /// Friends, group members and temporary chats.
    pub const ANYWHERE: Self = Self {
        in_group: true,
        from_group: true,
    };

    const fn admits(self, sender: &Sender) -> bool {
        match sender {
            Sender::Friend(_) => true,
            Sender::Group(_) => self.in_group,
            Sender::Temp(_) => self.from_group,
        }
    }
}

/// Private message from a friend.
#[must_use]
pub fn is_friend_message() -> Predicate {
    Predicate::on_payload(|p| matches!(p.sender(), Some(Sender::Friend(_))))
}

/// Message in a group.
#[must_use]
pub fn is_group_message() -> Predicate {
    Predicate::on_payload(|p| matches!(p.sender(), Some(Sender::Group(_))))
}

/// Temporary private message through a group.
#[must_use]
pub fn is_temp_message() -> Predicate {
    Predicate::on_payload(|p| matches!(p.sender(), Some(Sender::Temp(_))))
}

/// Sent by the configured admin. Always false when no admin is set.
#[must_use]
pub fn is_admin(reach: Reach) -> Predicate {
    Predicate::new(move |bot, p| {
        let (Some(admin), Some(sender)) = (bot.config().admin, p.sender()) else {
            return false;
        };
        reach.admits(sender) && sender.id() == admin.0
    })
}

/// Sent by one of `ids`.
#[must_use]
pub fn is_person(ids: impl IntoIterator<Item = i64>, reach: Reach) -> Predicate {
    let ids: Vec<i64> = ids.into_iter().collect();
    Predicate::on_payload(move |p| {
        p.sender()
            .is_some_and(|s| reach.admits(s) && ids.contains(&s.id()))
    })
}

/// Sent in one of the groups in `ids`. With `from_group`, temporary
/// messages through those groups count too.
#[must_use]
pub fn in_group(ids: impl IntoIterator<Item = i64>, from_group: bool) -> Predicate {
    let ids: Vec<i64> = ids.into_iter().collect();
    Predicate::on_payload(move |p| match p.sender() {
        Some(Sender::Group(m)) => ids.contains(&m.group.id),
        Some(Sender::Temp(m)) if from_group => ids.contains(&m.group.id),
        _ => false,
    })
}

fn member_permission(p: &Payload, from_group: bool) -> Option<Permission> {
    match p.sender()? {
        Sender::Group(m) => Some(m.permission),
        Sender::Temp(m) if from_group => Some(m.permission),
        _ => None,
    }
}

/// Sender is a group administrator (or the owner, with `include_owner`).
#[must_use]
pub fn is_group_admin(include_owner: bool, from_group: bool) -> Predicate {
    Predicate::on_payload(move |p| match member_permission(p, from_group) {
        Some(Permission::Administrator) => true,
        Some(Permission::Owner) => include_owner,
        _ => false,
    })
}

/// Sender owns the group.
#[must_use]
pub fn is_group_owner(from_group: bool) -> Predicate {
    Predicate::on_payload(move |p| member_permission(p, from_group) == Some(Permission::Owner))
}

/// Message chain contains a segment of `segment_type`.
#[must_use]
pub fn has_segment(segment_type: impl Into<String>) -> Predicate {
    let segment_type = segment_type.into();
    Predicate::on_payload(move |p| p.segment(&segment_type).is_some())
}

/// Message mentions `target`.
#[must_use]
pub fn is_at(target: i64) -> Predicate {
    Predicate::on_payload(move |p| {
        p.segments().any(|s| {
            s.get("type").and_then(serde_json::Value::as_str) == Some("At")
                && s.get("target").and_then(serde_json::Value::as_i64) == Some(target)
        })
    })
}

/// Text equals `text` exactly.
#[must_use]
pub fn text_eq(text: impl Into<String>) -> Predicate {
    let text = text.into();
    Predicate::on_payload(move |p| p.text() == text)
}

#[must_use]
pub fn text_starts_with(prefix: impl Into<String>) -> Predicate {
    let prefix = prefix.into();
    Predicate::on_payload(move |p| p.text().starts_with(&prefix))
}

#[must_use]
pub fn text_ends_with(suffix: impl Into<String>) -> Predicate {
    let suffix = suffix.into();
    Predicate::on_payload(move |p| p.text().ends_with(&suffix))
}

/// Text matches `pattern` anywhere.
#[must_use]
pub fn text_matches(pattern: Regex) -> Predicate {
    Predicate::on_payload(move |p| pattern.is_match(&p.text()))
}

#[cfg(test)]
mod tests {
    use gatebot_core::{Identity, Push};
    use gatebot_session::SessionConfig;
    use serde_json::{Value, json};

    use super::*;
    use crate::BotConfig;

    fn bot() -> Bot {
        Bot::new(BotConfig::new(SessionConfig::new(Identity(1), "key")).with_admin(Identity(42)))
    }

    fn payload(body: Value) -> Payload {
        Push::decode(body).unwrap().payload().clone()
    }

    fn group() -> Value {
        json!({"id": 7, "name": "g", "permission": "MEMBER"})
    }

    fn friend_msg(id: i64, text: &str) -> Payload {
        payload(json!({
            "type": "FriendMessage",
            "sender": {"id": id, "nickname": "n", "remark": ""},
            "messageChain": [
                {"type": "Source", "id": 1, "time": 0},
                {"type": "Plain", "text": text}
            ]
        }))
    }

    fn group_msg(id: i64, permission: &str) -> Payload {
        payload(json!({
            "type": "GroupMessage",
            "sender": {"id": id, "memberName": "m", "permission": permission, "group": group()},
            "messageChain": [{"type": "At", "target": 1}, {"type": "Plain", "text": " hi"}]
        }))
    }

    fn temp_msg(id: i64) -> Payload {
        payload(json!({
            "type": "TempMessage",
            "sender": {"id": id, "memberName": "m", "permission": "MEMBER", "group": group()},
            "messageChain": []
        }))
    }

    #[test]
    fn test_message_kind_predicates() {
        let bot = bot();
        let f = friend_msg(5, "x");
        let g = group_msg(5, "MEMBER");
        let t = temp_msg(5);

        assert!(is_friend_message().test(&bot, &f));
        assert!(!is_friend_message().test(&bot, &g));
        assert!(is_group_message().test(&bot, &g));
        assert!(is_temp_message().test(&bot, &t));
        assert!(!is_temp_message().test(&bot, &f));
    }

    #[test]
    fn test_combinators_and_operators() {
        let bot = bot();
        let ping = friend_msg(5, "ping");

        assert!((is_friend_message() & text_eq("ping")).test(&bot, &ping));
        assert!(!(is_group_message() & text_eq("ping")).test(&bot, &ping));
        assert!((is_group_message() | text_eq("ping")).test(&bot, &ping));
        assert!((!text_eq("pong")).test(&bot, &ping));
        assert!(text_eq("ping").and(is_friend_message()).not().not().test(&bot, &ping));
    }

    #[test]
    fn test_admin_respects_reach() {
        let bot = bot();
        assert!(is_admin(Reach::FRIENDS).test(&bot, &friend_msg(42, "")));
        assert!(!is_admin(Reach::FRIENDS).test(&bot, &friend_msg(41, "")));
        assert!(!is_admin(Reach::FRIENDS).test(&bot, &group_msg(42, "MEMBER")));
        assert!(is_admin(Reach::ANYWHERE).test(&bot, &group_msg(42, "MEMBER")));

        let no_admin = Bot::new(BotConfig::new(SessionConfig::new(Identity(1), "key")));
        assert!(!is_admin(Reach::ANYWHERE).test(&no_admin, &friend_msg(42, "")));
    }

    #[test]
    fn test_person_and_group() {
        let bot = bot();
        let reach = Reach {
            in_group: true,
            from_group: false,
        };
        assert!(is_person([5, 6], reach).test(&bot, &group_msg(6, "MEMBER")));
        assert!(!is_person([5, 6], reach).test(&bot, &temp_msg(6)));

        assert!(in_group([7], false).test(&bot, &group_msg(1, "MEMBER")));
        assert!(!in_group([7], false).test(&bot, &temp_msg(1)));
        assert!(in_group([7], true).test(&bot, &temp_msg(1)));
        assert!(!in_group([8], true).test(&bot, &group_msg(1, "MEMBER")));
    }

    #[test]
    fn test_group_permissions() {
        let bot = bot();
        assert!(is_group_admin(true, true).test(&bot, &group_msg(1, "OWNER")));
        assert!(!is_group_admin(false, true).test(&bot, &group_msg(1, "OWNER")));
        assert!(is_group_admin(false, true).test(&bot, &group_msg(1, "ADMINISTRATOR")));
        assert!(is_group_owner(true).test(&bot, &group_msg(1, "OWNER")));
        assert!(!is_group_owner(true).test(&bot, &friend_msg(1, "")));
    }

    #[test]
    fn test_segment_and_text_predicates() {
        let bot = bot();
        let g = group_msg(1, "MEMBER");
        assert!(is_at(1).test(&bot, &g));
        assert!(!is_at(2).test(&bot, &g));
        assert!(has_segment("Plain").test(&bot, &g));
        assert!(!has_segment("Image").test(&bot, &g));

        let f = friend_msg(1, "/roll 20");
        assert!(text_starts_with("/roll").test(&bot, &f));
        assert!(text_ends_with("20").test(&bot, &f));
        assert!(text_matches(Regex::new(r"^/roll \d+$").unwrap()).test(&bot, &f));
        assert!(!text_matches(Regex::new(r"^\d+$").unwrap()).test(&bot, &f));
    }

    #[test]
    fn test_event_text_field() {
        let bot = bot();
        let ping = payload(json!({"type": "ping", "text": "ping"}));
        let pong = payload(json!({"type": "ping", "text": "pong"}));
        assert!(text_eq("ping").test(&bot, &ping));
        assert!(!text_eq("ping").test(&bot, &pong));
        assert!(!is_friend_message().test(&bot, &ping));
    }
}
