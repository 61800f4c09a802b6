//! Timed tasks.

use std::{fmt, future::Future, sync::Arc, time::Duration};

use chrono::{NaiveDateTime, TimeDelta, Weekday};
use gatebot_core::{BoxFuture, HandlerResult};

use crate::{Recurrence, ScheduleError};

/// Type-erased task callback. `C` is the context handed to every run.
pub type TaskFn<C> = Arc<dyn Fn(C) -> BoxFuture<HandlerResult> + Send + Sync>;

/// When a task first becomes due.
#[derive(Debug, Clone, Copy)]
pub enum Start {
    /// Relative to the moment the task is scheduled.
    After(TimeDelta),
    /// At an absolute wall-clock time.
    At(NaiveDateTime),
}

/// A named callback with a recurrence rule.
pub struct TimedTask<C> {
    name: String,
    callback: TaskFn<C>,
    recurrence: Recurrence,
    start: Start,
}

impl<C> fmt::Debug for TimedTask<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TimedTask")
            .field("name", &self.name)
            .field("recurrence", &self.recurrence)
            .field("start", &self.start)
            .finish_non_exhaustive()
    }
}

impl<C: Send + 'static> TimedTask<C> {
    /// Build a task from its parts.
    pub fn new<F, Fut>(name: impl Into<String>, recurrence: Recurrence, start: Start, f: F) -> Self
    where
        F: Fn(C) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        Self {
            name: name.into(),
            callback: Arc::new(move |ctx| -> BoxFuture<HandlerResult> { Box::pin(f(ctx)) }),
            recurrence,
            start,
        }
    }

    /// Run once, `delay` after being scheduled.
    ///
    /// # Errors
    /// Returns error if `delay` is out of range.
    pub fn once<F, Fut>(name: impl Into<String>, delay: Duration, f: F) -> Result<Self, ScheduleError>
    where
        F: Fn(C) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        Ok(Self::new(name, Recurrence::Once, Start::After(delta(delay)?), f))
    }

    /// Run once at an absolute wall-clock time.
    pub fn at<F, Fut>(name: impl Into<String>, when: NaiveDateTime, f: F) -> Self
    where
        F: Fn(C) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        Self::new(name, Recurrence::Once, Start::At(when), f)
    }

    /// Run every `interval`, the first time `delay` after being scheduled.
    ///
    /// # Errors
    /// Returns error if `interval` is zero or either duration is out of range.
    pub fn every<F, Fut>(
        name: impl Into<String>,
        interval: Duration,
        delay: Duration,
        f: F,
    ) -> Result<Self, ScheduleError>
    where
        F: Fn(C) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        Ok(Self::new(
            name,
            Recurrence::every(interval)?,
            Start::After(delta(delay)?),
            f,
        ))
    }

    /// Run every day at `hour:minute:second`.
    ///
    /// # Errors
    /// Returns error if the time does not exist.
    pub fn daily<F, Fut>(
        name: impl Into<String>,
        (hour, minute, second): (u32, u32, u32),
        f: F,
    ) -> Result<Self, ScheduleError>
    where
        F: Fn(C) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        Ok(Self::new(
            name,
            Recurrence::daily(hour, minute, second)?,
            Start::After(TimeDelta::zero()),
            f,
        ))
    }

    /// Run every week on `weekday` at `hour:minute:second`.
    ///
    /// # Errors
    /// Returns error if the time does not exist.
    pub fn weekly<F, Fut>(
        name: impl Into<String>,
        weekday: Weekday,
        (hour, minute, second): (u32, u32, u32),
        f: F,
    ) -> Result<Self, ScheduleError>
    where
        F: Fn(C) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        Ok(Self::new(
            name,
            Recurrence::weekly(weekday, hour, minute, second)?,
            Start::After(TimeDelta::zero()),
            f,
        ))
    }

    /// Run on every occurrence of a cron expression.
    ///
    /// # Errors
    /// Returns error if the expression does not parse.
    pub fn cron<F, Fut>(name: impl Into<String>, expr: &str, f: F) -> Result<Self, ScheduleError>
    where
        F: Fn(C) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        Ok(Self::new(
            name,
            Recurrence::cron(expr)?,
            Start::After(TimeDelta::zero()),
            f,
        ))
    }
}

impl<C> TimedTask<C> {
    /// Task name, used in logs.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Recurrence rule.
    #[must_use]
    pub const fn recurrence(&self) -> &Recurrence {
        &self.recurrence
    }

    /// First fire time for a task scheduled at `now`.
    #[must_use]
    pub fn first_fire(&self, now: NaiveDateTime) -> Option<NaiveDateTime> {
        match self.start {
            Start::At(when) => Some(when),
            Start::After(delay) => self.recurrence.first_fire(now, delay),
        }
    }

    pub(crate) fn invoke(&self, ctx: C) -> BoxFuture<HandlerResult> {
        (self.callback)(ctx)
    }
}

fn delta(d: Duration) -> Result<TimeDelta, ScheduleError> {
    TimeDelta::from_std(d).map_err(|_| ScheduleError::InvalidInterval(d))
}
