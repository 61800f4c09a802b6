//! Wire protocol and transports for gateway bots.
//!
//! Provides:
//! - Wire protocol (JSON frames with correlation ids)
//! - WebSocket transport (feature: websocket)
//! - HTTP handshake provider (feature: http)
//! - In-process channel transport for tests and embedding
//! - Session announcement handling for gateways that open the session on connect

pub mod announce;
pub mod channel;
pub mod protocol;

#[cfg(feature = "websocket")]
pub mod websocket;

#[cfg(feature = "http")]
pub mod http;

pub use announce::AnnouncedSession;
pub use channel::{ChannelConnector, ChannelPeer, ChannelTransport};
pub use protocol::{
    InboundFrame, OutboundFrame, ProtocolError, check_reply, decode_session_announce,
};

#[cfg(feature = "websocket")]
pub use websocket::{PushChannel, WsConnector, WsTransport, gateway_url};

#[cfg(feature = "http")]
pub use http::HttpHandshake;
