//! Sessions opened by the push connection itself.
//!
//! A gateway reached with its verify key and account in the connection URL
//! (see `gateway_url`) opens and binds a session on its own, then
//! announces the key as the first frame. [`AnnouncedSession`] reads that
//! frame so the bot uses the session it was given instead of opening a
//! second one over the side channel.

use std::time::Duration;

use async_trait::async_trait;
use gatebot_core::{
    Credentials, HandshakeError, HandshakeProvider, Identity, SessionKey, SessionOptions,
    Transport,
};
use serde_json::Value;

use crate::protocol::decode_session_announce;

/// How long to wait for the announcement after connecting.
pub const DEFAULT_ANNOUNCE_TIMEOUT: Duration = Duration::from_secs(10);

/// Handshake that takes its session from the connection's first frame and
/// delegates everything else to `H`.
#[derive(Debug, Clone)]
pub struct AnnouncedSession<H> {
    inner: H,
    timeout: Duration,
}

impl<H> AnnouncedSession<H> {
    #[must_use]
    pub const fn new(inner: H) -> Self {
        Self {
            inner,
            timeout: DEFAULT_ANNOUNCE_TIMEOUT,
        }
    }

    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[async_trait]
impl<H: HandshakeProvider> HandshakeProvider for AnnouncedSession<H> {
    async fn probe(&self) -> Result<Value, HandshakeError> {
        self.inner.probe().await
    }

    async fn accept(&self, transport: &dyn Transport) -> Result<Option<SessionKey>, HandshakeError> {
        let frame = match tokio::time::timeout(self.timeout, transport.recv()).await {
            Ok(Some(Ok(frame))) => frame,
            Ok(Some(Err(e))) => return Err(HandshakeError::Unreachable(e.to_string())),
            Ok(None) => {
                return Err(HandshakeError::Unreachable(
                    "connection closed before session announcement".into(),
                ));
            }
            Err(_) => {
                return Err(HandshakeError::Unreachable(format!(
                    "no session announcement within {:?}",
                    self.timeout
                )));
            }
        };
        decode_session_announce(&frame).map(Some)
    }

    async fn authenticate(&self, credentials: &Credentials) -> Result<SessionKey, HandshakeError> {
        self.inner.authenticate(credentials).await
    }

    async fn bind_session(
        &self,
        session: &SessionKey,
        identity: &Identity,
    ) -> Result<(), HandshakeError> {
        self.inner.bind_session(session, identity).await
    }

    async fn configure(
        &self,
        session: &SessionKey,
        options: &SessionOptions,
    ) -> Result<(), HandshakeError> {
        self.inner.configure(session, options).await
    }

    async fn release(&self, session: &SessionKey, identity: &Identity) -> Result<(), HandshakeError> {
        self.inner.release(session, identity).await
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::ChannelTransport;

    struct Unused;

    #[async_trait]
    impl HandshakeProvider for Unused {
        async fn probe(&self) -> Result<Value, HandshakeError> {
            Ok(Value::Null)
        }

        async fn authenticate(&self, _: &Credentials) -> Result<SessionKey, HandshakeError> {
            Err(HandshakeError::Malformed("authenticate called".into()))
        }

        async fn bind_session(&self, _: &SessionKey, _: &Identity) -> Result<(), HandshakeError> {
            Err(HandshakeError::Malformed("bind called".into()))
        }

        async fn configure(&self, _: &SessionKey, _: &SessionOptions) -> Result<(), HandshakeError> {
            Ok(())
        }

        async fn release(&self, _: &SessionKey, _: &Identity) -> Result<(), HandshakeError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_reads_announced_session() {
        let (transport, peer) = ChannelTransport::pair();
        peer.send_json(&json!({"syncId": "", "data": {"code": 0, "session": "WS-KEY"}}))
            .unwrap();

        let key = AnnouncedSession::new(Unused).accept(&transport).await.unwrap();
        assert_eq!(key, Some(SessionKey::new("WS-KEY")));
    }

    #[tokio::test]
    async fn test_rejected_connection_is_an_error() {
        let (transport, peer) = ChannelTransport::pair();
        peer.send_json(&json!({"syncId": "", "data": {"code": 1, "msg": "wrong verify key"}}))
            .unwrap();

        assert!(matches!(
            AnnouncedSession::new(Unused).accept(&transport).await,
            Err(HandshakeError::Rejected { code: 1, .. })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_silent_gateway_times_out() {
        let (transport, _peer) = ChannelTransport::pair();
        let handshake = AnnouncedSession::new(Unused).with_timeout(Duration::from_secs(2));
        assert!(matches!(
            handshake.accept(&transport).await,
            Err(HandshakeError::Unreachable(_))
        ));
    }

    #[tokio::test]
    async fn test_closed_before_announcement() {
        let (transport, mut peer) = ChannelTransport::pair();
        peer.hang_up();
        assert!(matches!(
            AnnouncedSession::new(Unused).accept(&transport).await,
            Err(HandshakeError::Unreachable(_))
        ));
    }
}
