//! Session lifecycle and request correlation for gateway bots.
//!
//! Provides:
//! - `SessionManager` - Probe, handshake and release a gateway session
//! - `CorrelationTable` - Match outbound requests with inbound responses

pub mod config;
pub mod correlation;
pub mod manager;

pub use config::{RetryPolicy, SessionConfig};
pub use correlation::{CorrelationTable, PendingResult, RequestError};
pub use manager::{Established, HandshakeStep, SessionError, SessionManager};
