//! Session lifecycle manager: probe, handshake, release.

use std::fmt;

use gatebot_core::{Connector, HandshakeProvider, Session, Transport};

use crate::config::{RetryPolicy, SessionConfig};

/// Handshake step that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeStep {
    Connect,
    Accept,
    Authenticate,
    Bind,
    Configure,
}

impl fmt::Display for HandshakeStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Connect => "connect",
            Self::Accept => "accept",
            Self::Authenticate => "authenticate",
            Self::Bind => "bind",
            Self::Configure => "configure",
        })
    }
}

/// Session lifecycle error.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("Initialization failed at {step}: {reason}")]
    Initialization { step: HandshakeStep, reason: String },
    #[error("Gateway unreachable after {attempts} attempts")]
    Unreachable { attempts: u32 },
}

impl SessionError {
    fn init(step: HandshakeStep, reason: impl fmt::Display) -> Self {
        Self::Initialization {
            step,
            reason: reason.to_string(),
        }
    }
}

/// A negotiated session together with its transport.
pub struct Established<T> {
    pub session: Session,
    pub transport: T,
}

/// Session lifecycle manager.
///
/// Owns the connector and handshake side channel; the sessions it hands
/// out are released through [`disconnect`](Self::disconnect).
pub struct SessionManager<C, H>
where
    C: Connector,
    H: HandshakeProvider,
{
    connector: C,
    handshake: H,
    config: SessionConfig,
}

impl<C, H> SessionManager<C, H>
where
    C: Connector,
    H: HandshakeProvider,
{
    /// Create a new session manager.
    #[must_use]
    pub const fn new(connector: C, handshake: H, config: SessionConfig) -> Self {
        Self {
            connector,
            handshake,
            config,
        }
    }

    /// Configuration this manager negotiates with.
    #[must_use]
    pub const fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Probe the gateway, then run the full handshake.
    ///
    /// # Errors
    /// Returns [`SessionError::Unreachable`] if the probe budget runs out and
    /// [`SessionError::Initialization`] if any handshake step fails. On error
    /// nothing stays open: the transport is closed and an issued session key
    /// is released.
    pub async fn connect(&self) -> Result<Established<C::Transport>, SessionError> {
        if let Some(policy) = &self.config.probe {
            self.probe(policy).await?;
        }

        tracing::debug!("Connect to gateway transport");
        let transport = self
            .connector
            .connect()
            .await
            .map_err(|e| SessionError::init(HandshakeStep::Connect, e))?;

        match self.negotiate(&transport).await {
            Ok(session) => {
                tracing::info!("Successfully connect: sessionKey={}", session.key);
                Ok(Established { session, transport })
            }
            Err(e) => {
                if let Err(close_err) = transport.close().await {
                    tracing::debug!("Failed to close transport after handshake error: {close_err}");
                }
                Err(e)
            }
        }
    }

    async fn negotiate(&self, transport: &C::Transport) -> Result<Session, SessionError> {
        let announced = self
            .handshake
            .accept(transport)
            .await
            .map_err(|e| SessionError::init(HandshakeStep::Accept, e))?;

        let (key, bound) = match announced {
            Some(key) => {
                tracing::debug!("Session announced by gateway: {key}");
                (key, true)
            }
            None => {
                let key = self
                    .handshake
                    .authenticate(&self.config.credentials)
                    .await
                    .map_err(|e| SessionError::init(HandshakeStep::Authenticate, e))?;
                (key, false)
            }
        };

        let session = Session {
            key,
            identity: self.config.identity,
        };

        if !bound {
            if let Err(e) = self
                .handshake
                .bind_session(&session.key, &session.identity)
                .await
            {
                self.disconnect(&session).await;
                return Err(SessionError::init(HandshakeStep::Bind, e));
            }
        }

        if let Err(e) = self
            .handshake
            .configure(&session.key, &self.config.options)
            .await
        {
            self.disconnect(&session).await;
            return Err(SessionError::init(HandshakeStep::Configure, e));
        }

        Ok(session)
    }

    async fn probe(&self, policy: &RetryPolicy) -> Result<(), SessionError> {
        let mut attempt: u32 = 0;
        loop {
            attempt = attempt.saturating_add(1);
            match self.handshake.probe().await {
                Ok(info) => {
                    tracing::debug!("Gateway reachable after {attempt} attempts: {info}");
                    return Ok(());
                }
                Err(e) => {
                    tracing::debug!("Get api information failed: {attempt} times: {e}");
                    if policy.exhausted(attempt) {
                        tracing::error!("Unable to reach the gateway");
                        return Err(SessionError::Unreachable { attempts: attempt });
                    }
                    tokio::time::sleep(policy.interval()).await;
                }
            }
        }
    }

    /// Release a session.
    ///
    /// Never fails: release errors are logged so teardown can always
    /// complete.
    pub async fn disconnect(&self, session: &Session) {
        tracing::debug!("Release session {}", session.key);
        if let Err(e) = self
            .handshake
            .release(&session.key, &session.identity)
            .await
        {
            tracing::warn!("Failed to release session {}: {e}", session.key);
        }
    }
}
