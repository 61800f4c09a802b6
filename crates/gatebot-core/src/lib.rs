//! Core abstractions for gateway bot sessions.
//!
//! This crate provides the fundamental building blocks:
//! - `Transport`, `Connector`, `HandshakeProvider` - Seams to the gateway
//! - `Session` - Negotiated session handle and handshake configuration
//! - `Push` - Tagged union decoded from unsolicited gateway payloads
//! - `spawn_isolated` - Fault-isolated execution of user callbacks

pub mod invoke;
pub mod payload;
pub mod session;
pub mod traits;

pub use invoke::{BoxFuture, HandlerResult, Outcome, run_isolated, spawn_isolated};
pub use payload::{
    DecodeError, FriendSender, Group, MemberSender, Payload, Permission, Push, PushClass, Sender,
};
pub use session::{Credentials, Identity, Session, SessionKey, SessionOptions, SyncId};
pub use traits::{Connector, HandshakeError, HandshakeProvider, Transport, TransportError};
