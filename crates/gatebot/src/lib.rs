//! Event-driven bot client for message gateways.
//!
//! Provides:
//! - `Bot` - Session lifecycle, request API and start/stop
//! - `HandlerRegistry` - Category-keyed handlers gated by `Predicate`s
//! - `Context` - Explicit per-invocation context with reply helpers
//! - Timed tasks through `gatebot-schedule`

pub mod api;
pub mod bot;
pub mod config;
pub mod context;
mod dispatch;
pub mod error;
pub mod message;
pub mod predicate;
pub mod registry;

pub use api::ensure_ok;
pub use bot::Bot;
pub use config::BotConfig;
pub use context::Context;
pub use error::{ApiError, BotError, DispatchError};
pub use message::MessageChain;
pub use predicate::{Predicate, Reach};
pub use registry::{Category, Handler, HandlerEntry, HandlerRegistry, handler_fn, sync_handler_fn};

pub use gatebot_core::{HandlerResult, Identity, Payload, Push, PushClass, Sender, SyncId};
pub use gatebot_schedule::{Recurrence, ScheduleError, TimedTask, Weekday};
pub use gatebot_session::{PendingResult, RequestError, RetryPolicy, SessionConfig, SessionError};
