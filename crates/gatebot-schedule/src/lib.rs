//! Wall-clock task scheduling for gateway bots.
//!
//! Provides:
//! - `Recurrence` - once, fixed interval, daily, weekly and cron rules
//! - `TimedTask` - named callback plus recurrence
//! - `Scheduler` - priority-queue loop firing tasks through `spawn_isolated`

pub mod error;
pub mod recurrence;
pub mod scheduler;
pub mod task;

pub use error::ScheduleError;
pub use recurrence::Recurrence;
pub use scheduler::{Clock, DEFAULT_QUANTUM, Scheduler, SchedulerState, SystemClock};
pub use task::{Start, TaskFn, TimedTask};

pub use chrono::Weekday;
