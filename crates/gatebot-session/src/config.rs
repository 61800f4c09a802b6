//! Handshake and retry configuration.

use std::time::Duration;

use gatebot_core::{Credentials, Identity, SessionOptions};
use serde::{Deserialize, Serialize};

/// Fixed-interval retry policy for the connectivity probe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RetryPolicy {
    /// Maximum number of probe attempts; `None` retries forever.
    pub max_attempts: Option<u32>,
    /// Delay between attempts, in seconds.
    pub interval_secs: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: Some(1),
            interval_secs: 3,
        }
    }
}

impl RetryPolicy {
    /// Retry forever with the given delay.
    #[must_use]
    pub const fn forever(interval: Duration) -> Self {
        Self {
            max_attempts: None,
            interval_secs: interval.as_secs(),
        }
    }

    /// Retry up to `attempts` times with the given delay.
    #[must_use]
    pub const fn attempts(attempts: u32, interval: Duration) -> Self {
        Self {
            max_attempts: Some(attempts),
            interval_secs: interval.as_secs(),
        }
    }

    /// Delay between attempts.
    #[must_use]
    pub const fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    /// Whether `attempt` (1-based) used up the budget.
    #[must_use]
    pub fn exhausted(&self, attempt: u32) -> bool {
        self.max_attempts.is_some_and(|max| attempt >= max)
    }
}

/// Everything needed to negotiate a session.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionConfig {
    /// Account the session is bound to.
    pub identity: Identity,
    /// Credentials presented to the gateway.
    #[serde(default)]
    pub credentials: Credentials,
    /// Options applied after binding.
    #[serde(default)]
    pub options: SessionOptions,
    /// Optional probe phase before the handshake.
    #[serde(default)]
    pub probe: Option<RetryPolicy>,
}

impl SessionConfig {
    /// Configuration with default options and no probe phase.
    #[must_use]
    pub fn new(identity: Identity, verify_key: impl Into<String>) -> Self {
        Self {
            identity,
            credentials: Credentials {
                verify_key: verify_key.into(),
            },
            options: SessionOptions::default(),
            probe: None,
        }
    }

    /// Enable the probe phase.
    #[must_use]
    pub const fn with_probe(mut self, policy: RetryPolicy) -> Self {
        self.probe = Some(policy);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_budget() {
        let once = RetryPolicy::default();
        assert!(once.exhausted(1));

        let three = RetryPolicy::attempts(3, Duration::from_secs(1));
        assert!(!three.exhausted(2));
        assert!(three.exhausted(3));

        let forever = RetryPolicy::forever(Duration::from_secs(1));
        assert!(!forever.exhausted(u32::MAX));
    }

    #[test]
    fn test_session_config_from_json() {
        let cfg: SessionConfig = serde_json::from_str(
            r#"{"identity": 123, "credentials": {"verifyKey": "k"}, "probe": {"maxAttempts": null}}"#,
        )
        .unwrap();
        assert_eq!(cfg.identity, Identity(123));
        assert_eq!(cfg.credentials.verify_key, "k");
        assert_eq!(cfg.probe.unwrap().max_attempts, None);
    }
}
