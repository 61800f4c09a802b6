//! Core traits for transports and session negotiation.

use async_trait::async_trait;
use bytes::Bytes;
use serde_json::Value;
use thiserror::Error;

use crate::session::{Credentials, Identity, SessionKey, SessionOptions};

/// Transport error.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Connect failed: {0}")]
    Connect(String),
    #[error("Transport closed")]
    Closed,
    #[error("Send failed: {0}")]
    Send(String),
    #[error("Receive failed: {0}")]
    Receive(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Duplex, message-oriented connection to the gateway.
///
/// Implementations must allow `send` to be called concurrently with a
/// pending `recv`; the dispatcher owns the receive side while request
/// issuers share the send side.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send one frame.
    async fn send(&self, frame: Bytes) -> Result<(), TransportError>;

    /// Receive the next frame.
    ///
    /// Returns `None` once the peer has closed the connection.
    async fn recv(&self) -> Option<Result<Bytes, TransportError>>;

    /// Close the connection. Closing twice is not an error.
    async fn close(&self) -> Result<(), TransportError>;
}

/// Factory for fresh transports.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Concrete transport produced by this connector.
    type Transport: Transport + 'static;

    /// Establish a new connection.
    async fn connect(&self) -> Result<Self::Transport, TransportError>;
}

/// Handshake error.
#[derive(Debug, Error)]
pub enum HandshakeError {
    #[error("Gateway unreachable: {0}")]
    Unreachable(String),
    #[error("Gateway rejected request: code={code} {message}")]
    Rejected { code: i64, message: String },
    #[error("Malformed gateway response: {0}")]
    Malformed(String),
}

/// Side channel used to negotiate a session.
///
/// Each call is a single blocking round trip from the caller's point of
/// view; the wire format behind it is up to the implementation.
#[async_trait]
pub trait HandshakeProvider: Send + Sync {
    /// Lightweight connectivity check, used by the probe phase.
    async fn probe(&self) -> Result<Value, HandshakeError>;

    /// Inspect a freshly opened transport before authenticating.
    ///
    /// Gateways that open and bind a session as part of the connection
    /// announce its key here; returning `Some` skips
    /// [`authenticate`](Self::authenticate) and
    /// [`bind_session`](Self::bind_session).
    async fn accept(&self, _transport: &dyn Transport) -> Result<Option<SessionKey>, HandshakeError> {
        Ok(None)
    }

    /// Exchange credentials for a session key.
    async fn authenticate(&self, credentials: &Credentials) -> Result<SessionKey, HandshakeError>;

    /// Bind the session to the bot identity.
    async fn bind_session(
        &self,
        session: &SessionKey,
        identity: &Identity,
    ) -> Result<(), HandshakeError>;

    /// Apply runtime options to the session.
    async fn configure(
        &self,
        session: &SessionKey,
        options: &SessionOptions,
    ) -> Result<(), HandshakeError>;

    /// Release the session.
    async fn release(&self, session: &SessionKey, identity: &Identity)
    -> Result<(), HandshakeError>;
}

#[async_trait]
impl<T> HandshakeProvider for std::sync::Arc<T>
where
    T: HandshakeProvider + ?Sized,
{
    async fn probe(&self) -> Result<Value, HandshakeError> {
        (**self).probe().await
    }

    async fn accept(&self, transport: &dyn Transport) -> Result<Option<SessionKey>, HandshakeError> {
        (**self).accept(transport).await
    }

    async fn authenticate(&self, credentials: &Credentials) -> Result<SessionKey, HandshakeError> {
        (**self).authenticate(credentials).await
    }

    async fn bind_session(
        &self,
        session: &SessionKey,
        identity: &Identity,
    ) -> Result<(), HandshakeError> {
        (**self).bind_session(session, identity).await
    }

    async fn configure(
        &self,
        session: &SessionKey,
        options: &SessionOptions,
    ) -> Result<(), HandshakeError> {
        (**self).configure(session, options).await
    }

    async fn release(&self, session: &SessionKey, identity: &Identity)
    -> Result<(), HandshakeError> {
        (**self).release(session, identity).await
    }
}
