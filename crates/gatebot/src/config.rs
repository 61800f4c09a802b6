//! Bot configuration.

use std::time::Duration;

use gatebot_core::{Identity, SyncId};
use gatebot_session::SessionConfig;
use serde::{Deserialize, Serialize};

const fn default_request_ttl_secs() -> u64 {
    3600
}

const fn default_request_capacity() -> usize {
    10_000
}

const fn default_reserved_sync_id() -> SyncId {
    SyncId::PUSH
}

const fn default_tick_millis() -> u64 {
    1000
}

/// Bot configuration.
///
/// Session fields (`identity`, `credentials`, `options`, `probe`) sit at the
/// top level next to the bot's own settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BotConfig {
    #[serde(flatten)]
    pub session: SessionConfig,
    /// Account receiving `send_to_admin` messages.
    #[serde(default)]
    pub admin: Option<Identity>,
    /// Seconds an unanswered request is kept before failing with timeout.
    #[serde(default = "default_request_ttl_secs")]
    pub request_ttl_secs: u64,
    /// Maximum number of outstanding requests.
    #[serde(default = "default_request_capacity")]
    pub request_capacity: usize,
    /// Correlation id the gateway uses for pushes.
    #[serde(default = "default_reserved_sync_id")]
    pub reserved_sync_id: SyncId,
    /// Scheduler polling quantum in milliseconds.
    #[serde(default = "default_tick_millis")]
    pub tick_millis: u64,
}

impl BotConfig {
    /// Configuration with defaults for everything but the session.
    #[must_use]
    pub const fn new(session: SessionConfig) -> Self {
        Self {
            session,
            admin: None,
            request_ttl_secs: default_request_ttl_secs(),
            request_capacity: default_request_capacity(),
            reserved_sync_id: default_reserved_sync_id(),
            tick_millis: default_tick_millis(),
        }
    }

    /// Set the admin account.
    #[must_use]
    pub const fn with_admin(mut self, admin: Identity) -> Self {
        self.admin = Some(admin);
        self
    }

    /// Request time-to-live.
    #[must_use]
    pub const fn request_ttl(&self) -> Duration {
        Duration::from_secs(self.request_ttl_secs)
    }

    /// Scheduler polling quantum.
    #[must_use]
    pub const fn tick(&self) -> Duration {
        Duration::from_millis(self.tick_millis)
    }
}
