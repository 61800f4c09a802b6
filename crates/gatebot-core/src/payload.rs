//! Decoding of unsolicited push payloads.
//!
//! Every push carries a `type` discriminant. Kinds ending in `Message` are
//! chat messages, everything else is an event. The mapping is applied once,
//! here, and the rest of the crate works with [`Push`].

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

const MESSAGE_SUFFIX: &str = "Message";

/// Payload decode error.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("Payload is not a JSON object")]
    NotAnObject,
    #[error("Payload has no string `type` field")]
    MissingType,
    #[error("Invalid sender for {kind}: {source}")]
    Sender {
        kind: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Broad class of a push.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PushClass {
    Message,
    Event,
}

impl PushClass {
    /// Classify a payload kind by its discriminant.
    #[must_use]
    pub fn of(kind: &str) -> Self {
        if kind.ends_with(MESSAGE_SUFFIX) {
            Self::Message
        } else {
            Self::Event
        }
    }
}

/// Member permission inside a group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Permission {
    Owner,
    Administrator,
    Member,
}

/// Group a member sender belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Group {
    pub id: i64,
    pub name: String,
    pub permission: Permission,
}

/// Sender of a private message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FriendSender {
    pub id: i64,
    pub nickname: String,
    #[serde(default)]
    pub remark: String,
}

/// Sender of a group or temporary message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemberSender {
    pub id: i64,
    pub member_name: String,
    pub permission: Permission,
    pub group: Group,
}

/// Who sent a message, chosen by the message kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Sender {
    Friend(FriendSender),
    Group(MemberSender),
    Temp(MemberSender),
}

impl Sender {
    /// Account id of the sender.
    #[must_use]
    pub const fn id(&self) -> i64 {
        match self {
            Self::Friend(s) => s.id,
            Self::Group(s) | Self::Temp(s) => s.id,
        }
    }

    /// Display name of the sender.
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::Friend(s) => &s.nickname,
            Self::Group(s) | Self::Temp(s) => &s.member_name,
        }
    }

    /// Group the message came through, if any.
    #[must_use]
    pub const fn group(&self) -> Option<&Group> {
        match self {
            Self::Friend(_) => None,
            Self::Group(s) | Self::Temp(s) => Some(&s.group),
        }
    }

    fn decode(kind: &str, raw: Option<&Value>) -> Result<Option<Self>, DecodeError> {
        let wrap = |source| DecodeError::Sender {
            kind: kind.to_string(),
            source,
        };
        let Some(raw) = raw else {
            return Ok(None);
        };
        let sender = match kind {
            "FriendMessage" => Self::Friend(FriendSender::deserialize(raw).map_err(wrap)?),
            "GroupMessage" => Self::Group(MemberSender::deserialize(raw).map_err(wrap)?),
            "TempMessage" => Self::Temp(MemberSender::deserialize(raw).map_err(wrap)?),
            _ => return Ok(None),
        };
        Ok(Some(sender))
    }
}

/// A decoded push body.
#[derive(Debug, Clone)]
pub struct Payload {
    kind: String,
    sender: Option<Sender>,
    body: Value,
}

impl Payload {
    /// Concrete kind, e.g. `GroupMessage` or `BotOnlineEvent`.
    #[must_use]
    pub fn kind(&self) -> &str {
        &self.kind
    }

    /// Raw JSON body.
    #[must_use]
    pub const fn body(&self) -> &Value {
        &self.body
    }

    /// Decoded sender, present for friend, group and temp messages.
    #[must_use]
    pub const fn sender(&self) -> Option<&Sender> {
        self.sender.as_ref()
    }

    /// Look up a top-level field.
    #[must_use]
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.body.get(field)
    }

    /// Look up a top-level string field.
    #[must_use]
    pub fn get_str(&self, field: &str) -> Option<&str> {
        self.get(field).and_then(Value::as_str)
    }

    /// Segments of the message chain; empty for events.
    pub fn segments(&self) -> impl Iterator<Item = &Value> {
        self.body
            .get("messageChain")
            .and_then(Value::as_array)
            .into_iter()
            .flatten()
    }

    /// First segment of the given type.
    #[must_use]
    pub fn segment(&self, segment_type: &str) -> Option<&Value> {
        self.segments()
            .find(|s| s.get("type").and_then(Value::as_str) == Some(segment_type))
    }

    /// Plain text of the payload.
    ///
    /// For messages this is the concatenation of every `Plain` segment; for
    /// anything else it falls back to a top-level `text` field.
    #[must_use]
    pub fn text(&self) -> String {
        if self.body.get("messageChain").is_some() {
            self.segments()
                .filter(|s| s.get("type").and_then(Value::as_str) == Some("Plain"))
                .filter_map(|s| s.get("text").and_then(Value::as_str))
                .collect()
        } else {
            self.get_str("text").unwrap_or_default().to_string()
        }
    }

    /// Gateway-assigned message id, taken from the `Source` segment.
    #[must_use]
    pub fn message_id(&self) -> Option<i64> {
        self.segment("Source")
            .and_then(|s| s.get("id"))
            .and_then(Value::as_i64)
    }
}

/// An unsolicited push, classified at the decode boundary.
#[derive(Debug, Clone)]
pub enum Push {
    Message(Payload),
    Event(Payload),
}

impl Push {
    /// Decode a push body.
    ///
    /// # Errors
    /// Returns error if the body has no `type` discriminant or a message
    /// sender does not match its kind.
    pub fn decode(body: Value) -> Result<Self, DecodeError> {
        if !body.is_object() {
            return Err(DecodeError::NotAnObject);
        }
        let kind = body
            .get("type")
            .and_then(Value::as_str)
            .ok_or(DecodeError::MissingType)?
            .to_string();

        let class = PushClass::of(&kind);
        let sender = match class {
            PushClass::Message => Sender::decode(&kind, body.get("sender"))?,
            PushClass::Event => None,
        };
        let payload = Payload { kind, sender, body };

        Ok(match class {
            PushClass::Message => Self::Message(payload),
            PushClass::Event => Self::Event(payload),
        })
    }

    /// Broad class of this push.
    #[must_use]
    pub const fn class(&self) -> PushClass {
        match self {
            Self::Message(_) => PushClass::Message,
            Self::Event(_) => PushClass::Event,
        }
    }

    /// Decoded payload.
    #[must_use]
    pub const fn payload(&self) -> &Payload {
        match self {
            Self::Message(p) | Self::Event(p) => p,
        }
    }
}
