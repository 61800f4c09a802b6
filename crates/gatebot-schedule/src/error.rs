//! Scheduler errors.

use std::time::Duration;

use crate::SchedulerState;

/// Scheduler error.
#[derive(Debug, thiserror::Error)]
pub enum ScheduleError {
    #[error("Scheduler is not idle: {0:?}")]
    NotIdle(SchedulerState),

    #[error("Invalid time of day: {hour:02}:{minute:02}:{second:02}")]
    InvalidTime { hour: u32, minute: u32, second: u32 },

    #[error("Invalid interval: {0:?}")]
    InvalidInterval(Duration),

    #[error("Invalid cron expression {expr:?}: {reason}")]
    Cron { expr: String, reason: String },
}
