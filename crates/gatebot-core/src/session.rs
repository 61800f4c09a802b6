//! Session and handshake configuration types.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Opaque session key issued by the gateway.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionKey(String);

impl SessionKey {
    /// Wrap a raw key.
    #[must_use]
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Borrow the raw key.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Correlation id linking an outbound request to its response.
///
/// The gateway echoes ids back as strings; numbers are accepted too.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SyncId(pub i64);

impl SyncId {
    /// Id the gateway uses for unsolicited pushes unless configured otherwise.
    pub const PUSH: Self = Self(-1);
}

impl fmt::Display for SyncId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Serialize for SyncId {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for SyncId {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Int(i64),
            Str(String),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Int(n) => Ok(Self(n)),
            Raw::Str(s) => s
                .trim()
                .parse()
                .map(Self)
                .map_err(|_| serde::de::Error::custom(format!("invalid syncId: {s:?}"))),
        }
    }
}

/// Account the bot acts as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Identity(pub i64);

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Credentials presented during authentication.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Credentials {
    /// Shared verification key configured on the gateway.
    pub verify_key: String,
}

/// Runtime options applied to a freshly bound session.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SessionOptions {
    /// Number of messages the gateway keeps for `messageFromId` lookups.
    pub cache_size: u32,
    /// Whether the gateway should push over the websocket channel.
    pub enable_websocket: bool,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            cache_size: 4096,
            enable_websocket: true,
        }
    }
}

/// A negotiated session.
///
/// Valid for one connection lifetime; the lifecycle manager that created
/// it is the only thing allowed to release it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    /// Key required on every outbound call.
    pub key: SessionKey,
    /// Identity the session is bound to.
    pub identity: Identity,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_key_is_transparent() {
        let key = SessionKey::new("abc");
        assert_eq!(serde_json::to_string(&key).unwrap(), "\"abc\"");
        assert_eq!(key.to_string(), "abc");
    }

    #[test]
    fn test_sync_id_accepts_strings_and_numbers() {
        let a: SyncId = serde_json::from_str("\"12\"").unwrap();
        let b: SyncId = serde_json::from_str("12").unwrap();
        let push: SyncId = serde_json::from_str("\"-1\"").unwrap();
        assert_eq!(a, b);
        assert_eq!(push, SyncId::PUSH);
        assert!(serde_json::from_str::<SyncId>("\"abc\"").is_err());
        assert_eq!(serde_json::to_string(&SyncId(5)).unwrap(), "\"5\"");
    }

    #[test]
    fn test_session_options_defaults_fill_missing_fields() {
        let opts: SessionOptions = serde_json::from_str(r#"{"cacheSize": 10}"#).unwrap();
        assert_eq!(opts.cache_size, 10);
        assert!(opts.enable_websocket);
    }
}
