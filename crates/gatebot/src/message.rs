//! Outgoing message chains.

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

/// Ordered list of message segments, as sent in `messageChain`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageChain(Vec<Value>);

impl MessageChain {
    /// Empty chain.
    #[must_use]
    pub const fn new() -> Self {
        Self(Vec::new())
    }

    /// Append a plain text segment.
    #[must_use]
    pub fn plain(self, text: impl Into<String>) -> Self {
        self.segment(json!({"type": "Plain", "text": text.into()}))
    }

    /// Append a mention of `target`.
    #[must_use]
    pub fn at(self, target: i64) -> Self {
        self.segment(json!({"type": "At", "target": target}))
    }

    /// Append a built-in face by id.
    #[must_use]
    pub fn face(self, face_id: i64) -> Self {
        self.segment(json!({"type": "Face", "faceId": face_id}))
    }

    /// Append an image fetched by the gateway from `url`.
    #[must_use]
    pub fn image_url(self, url: impl Into<String>) -> Self {
        self.segment(json!({"type": "Image", "url": url.into()}))
    }

    /// Append a raw segment.
    #[must_use]
    pub fn segment(mut self, segment: Value) -> Self {
        self.0.push(segment);
        self
    }

    #[must_use]
    pub fn segments(&self) -> &[Value] {
        &self.0
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<&str> for MessageChain {
    fn from(text: &str) -> Self {
        Self::new().plain(text)
    }
}

impl From<String> for MessageChain {
    fn from(text: String) -> Self {
        Self::new().plain(text)
    }
}

impl From<Vec<Value>> for MessageChain {
    fn from(segments: Vec<Value>) -> Self {
        Self(segments)
    }
}

impl From<MessageChain> for Value {
    fn from(chain: MessageChain) -> Self {
        Self::Array(chain.0)
    }
}
