//! Scheduler loop.
//!
//! Tasks sit in a min-heap keyed by `(next_fire, seq)`. The loop fires
//! every task that is due, then sleeps one quantum and looks again.

use std::{
    cmp::{Ordering, Reverse},
    collections::BinaryHeap,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering as AtomicOrdering},
    },
    time::Duration,
};

use chrono::{Local, NaiveDateTime};
use gatebot_core::spawn_isolated;
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use crate::{ScheduleError, TimedTask};

/// Default polling quantum.
pub const DEFAULT_QUANTUM: Duration = Duration::from_secs(1);

/// Source of wall-clock time.
pub trait Clock: Send + Sync {
    fn now(&self) -> NaiveDateTime;
}

/// Local system time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> NaiveDateTime {
        Local::now().naive_local()
    }
}

/// Scheduler lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Idle,
    Running,
    Stopped,
}

struct Queued<C> {
    fire: NaiveDateTime,
    seq: u64,
    task: TimedTask<C>,
}

impl<C> PartialEq for Queued<C> {
    fn eq(&self, other: &Self) -> bool {
        self.fire == other.fire && self.seq == other.seq
    }
}

impl<C> Eq for Queued<C> {}

impl<C> PartialOrd for Queued<C> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<C> Ord for Queued<C> {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.fire, self.seq).cmp(&(other.fire, other.seq))
    }
}

/// Runs timed tasks against a shared context `C`.
pub struct Scheduler<C> {
    clock: Arc<dyn Clock>,
    quantum: Duration,
    queue: Mutex<BinaryHeap<Reverse<Queued<C>>>>,
    next_seq: AtomicU64,
    state: Mutex<SchedulerState>,
    cancel: CancellationToken,
}

impl<C: Clone + Send + 'static> Default for Scheduler<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: Clone + Send + 'static> Scheduler<C> {
    /// Create a scheduler on the system clock with the default quantum.
    #[must_use]
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock), DEFAULT_QUANTUM)
    }

    /// Create a scheduler with a custom clock and quantum.
    #[must_use]
    pub fn with_clock(clock: Arc<dyn Clock>, quantum: Duration) -> Self {
        Self {
            clock,
            quantum,
            queue: Mutex::new(BinaryHeap::new()),
            next_seq: AtomicU64::new(0),
            state: Mutex::new(SchedulerState::Idle),
            cancel: CancellationToken::new(),
        }
    }

    /// Add a task. Allowed before and during `run`.
    ///
    /// Returns the first fire time, or `None` if it could not be computed
    /// and the task was dropped.
    pub fn schedule(&self, task: TimedTask<C>) -> Option<NaiveDateTime> {
        let Some(fire) = task.first_fire(self.clock.now()) else {
            tracing::warn!("Timed task {} has no fire time, dropped", task.name());
            return None;
        };
        tracing::debug!("Scheduled {} at {fire}", task.name());
        self.push(fire, task);
        Some(fire)
    }

    fn push(&self, fire: NaiveDateTime, task: TimedTask<C>) {
        let seq = self.next_seq.fetch_add(1, AtomicOrdering::Relaxed);
        self.queue.lock().push(Reverse(Queued { fire, seq, task }));
    }

    fn pop_due(&self, now: NaiveDateTime) -> Option<Queued<C>> {
        let mut queue = self.queue.lock();
        if queue.peek().is_some_and(|Reverse(q)| q.fire <= now) {
            queue.pop().map(|Reverse(q)| q)
        } else {
            None
        }
    }

    fn fire(&self, due: Queued<C>, ctx: &C) {
        let Queued { fire, task, .. } = due;
        tracing::debug!("Running {} (due {fire})", task.name());
        spawn_isolated(task.name(), fire, task.invoke(ctx.clone()));

        match task.recurrence().next_after(fire) {
            Some(next) => self.push(next, task),
            None => tracing::debug!("Timed task {} finished", task.name()),
        }
    }

    /// Run until [`stop`](Self::stop) is called.
    ///
    /// # Errors
    /// Returns [`ScheduleError::NotIdle`] if the scheduler is already
    /// running or has been stopped.
    pub async fn run(&self, ctx: C) -> Result<(), ScheduleError> {
        {
            let mut state = self.state.lock();
            if *state != SchedulerState::Idle {
                return Err(ScheduleError::NotIdle(*state));
            }
            *state = SchedulerState::Running;
        }
        tracing::info!("Scheduler running with {} task(s)", self.len());

        while !self.cancel.is_cancelled() {
            if let Some(due) = self.pop_due(self.clock.now()) {
                self.fire(due, &ctx);
                continue;
            }
            tokio::select! {
                () = self.cancel.cancelled() => break,
                () = tokio::time::sleep(self.quantum) => {}
            }
        }

        *self.state.lock() = SchedulerState::Stopped;
        tracing::info!("Scheduler stopped");
        Ok(())
    }
}

impl<C> Scheduler<C> {
    /// Stop the loop. Stopping an idle scheduler prevents it from running.
    pub fn stop(&self) {
        self.cancel.cancel();
        let mut state = self.state.lock();
        if *state == SchedulerState::Idle {
            *state = SchedulerState::Stopped;
        }
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> SchedulerState {
        *self.state.lock()
    }

    /// Number of queued tasks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.queue.lock().len()
    }

    /// Whether no task is queued.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.queue.lock().is_empty()
    }

    /// Queued tasks as `(name, next_fire)`, earliest first.
    #[must_use]
    pub fn pending(&self) -> Vec<(String, NaiveDateTime)> {
        let queue = self.queue.lock();
        let mut items: Vec<_> = queue
            .iter()
            .map(|Reverse(q)| (q.fire, q.seq, q.task.name().to_string()))
            .collect();
        drop(queue);
        items.sort_unstable_by_key(|(fire, seq, _)| (*fire, *seq));
        items.into_iter().map(|(fire, _, name)| (name, fire)).collect()
    }
}
