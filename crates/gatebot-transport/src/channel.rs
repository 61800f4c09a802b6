//! In-process channel transport.
//!
//! Connects a bot to a local peer over tokio channels. The peer plays the
//! gateway: it sees every frame the bot sends and can push frames back.

use async_trait::async_trait;
use bytes::Bytes;
use gatebot_core::{Connector, Transport, TransportError};
use parking_lot::Mutex as SyncMutex;
use serde_json::Value;
use tokio::sync::{Mutex, mpsc};
use tokio_util::sync::CancellationToken;

/// Bot side of a channel pair.
pub struct ChannelTransport {
    outbound: mpsc::UnboundedSender<Bytes>,
    inbound: Mutex<mpsc::UnboundedReceiver<Bytes>>,
    closed: CancellationToken,
}

/// Gateway side of a channel pair.
pub struct ChannelPeer {
    /// Frames sent by the bot.
    pub outbound_rx: mpsc::UnboundedReceiver<Bytes>,
    inbound_tx: Option<mpsc::UnboundedSender<Bytes>>,
    closed: CancellationToken,
}

impl ChannelTransport {
    /// Create a connected transport/peer pair.
    #[must_use]
    pub fn pair() -> (Self, ChannelPeer) {
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        let closed = CancellationToken::new();

        let transport = Self {
            outbound: outbound_tx,
            inbound: Mutex::new(inbound_rx),
            closed: closed.clone(),
        };

        let peer = ChannelPeer {
            outbound_rx,
            inbound_tx: Some(inbound_tx),
            closed,
        };

        (transport, peer)
    }
}

#[async_trait]
impl Transport for ChannelTransport {
    async fn send(&self, frame: Bytes) -> Result<(), TransportError> {
        if self.closed.is_cancelled() {
            return Err(TransportError::Closed);
        }
        self.outbound
            .send(frame)
            .map_err(|_| TransportError::Closed)
    }

    async fn recv(&self) -> Option<Result<Bytes, TransportError>> {
        let mut inbound = self.inbound.lock().await;
        tokio::select! {
            () = self.closed.cancelled() => None,
            frame = inbound.recv() => frame.map(Ok),
        }
    }

    async fn close(&self) -> Result<(), TransportError> {
        self.closed.cancel();
        Ok(())
    }
}

impl ChannelPeer {
    /// Push raw bytes to the bot.
    ///
    /// # Errors
    /// Returns error if the bot side is gone or the peer already hung up.
    pub fn send(&self, frame: Bytes) -> Result<(), TransportError> {
        self.inbound_tx
            .as_ref()
            .ok_or(TransportError::Closed)?
            .send(frame)
            .map_err(|_| TransportError::Closed)
    }

    /// Push a JSON frame to the bot.
    ///
    /// # Errors
    /// Returns error if the bot side is gone.
    pub fn send_json(&self, frame: &Value) -> Result<(), TransportError> {
        self.send(Bytes::from(frame.to_string()))
    }

    /// Receive the next frame sent by the bot as JSON.
    ///
    /// Returns `None` once the bot side is dropped. Frames that are not
    /// JSON are skipped.
    pub async fn recv_json(&mut self) -> Option<Value> {
        while let Some(raw) = self.outbound_rx.recv().await {
            match serde_json::from_slice(&raw) {
                Ok(v) => return Some(v),
                Err(e) => tracing::warn!("Peer received non-JSON frame: {e}"),
            }
        }
        None
    }

    /// Hang up: the bot's next `recv` returns `None`.
    pub fn hang_up(&mut self) {
        self.inbound_tx = None;
    }

    /// Whether the bot side called `close`.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }
}

/// Connector handing out one pre-built channel transport.
pub struct ChannelConnector {
    transport: SyncMutex<Option<ChannelTransport>>,
}

impl ChannelConnector {
    /// Wrap a transport to be returned by the first `connect`.
    #[must_use]
    pub fn new(transport: ChannelTransport) -> Self {
        Self {
            transport: SyncMutex::new(Some(transport)),
        }
    }
}

#[async_trait]
impl Connector for ChannelConnector {
    type Transport = ChannelTransport;

    async fn connect(&self) -> Result<ChannelTransport, TransportError> {
        self.transport
            .lock()
            .take()
            .ok_or_else(|| TransportError::Connect("channel transport already taken".into()))
    }
}
