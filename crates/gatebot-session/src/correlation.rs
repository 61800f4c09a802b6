//! Correlation of outbound requests with inbound responses.

use std::{
    collections::BTreeMap,
    future::Future,
    pin::Pin,
    task::{Context, Poll},
    time::Duration,
};

use gatebot_core::SyncId;
use parking_lot::Mutex;
use serde_json::Value;
use thiserror::Error;
use tokio::{
    sync::oneshot,
    time::{Instant, Sleep},
};

/// Default lifetime of an unanswered request (1 hour).
pub const DEFAULT_TTL: Duration = Duration::from_secs(3600);

/// Default number of outstanding requests kept at once.
pub const DEFAULT_CAPACITY: usize = 10_000;

/// Why a request produced no response.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RequestError {
    #[error("Receive response timeout")]
    Timeout,
    #[error("Connection closed")]
    ConnectionClosed,
    #[error("Bot is not connected")]
    NotConnected,
    #[error("Send failed: {0}")]
    Send(String),
}

type Slot = oneshot::Sender<Result<Value, RequestError>>;

/// Handle to the eventual response of one request.
///
/// Resolves exactly once: with the response payload, or with the reason
/// no response will ever arrive.
pub struct PendingResult {
    sync_id: SyncId,
    rx: oneshot::Receiver<Result<Value, RequestError>>,
    deadline: Pin<Box<Sleep>>,
}

impl PendingResult {
    /// Correlation id of the request.
    #[must_use]
    pub const fn sync_id(&self) -> SyncId {
        self.sync_id
    }
}

impl std::fmt::Debug for PendingResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingResult")
            .field("sync_id", &self.sync_id)
            .finish_non_exhaustive()
    }
}

impl Future for PendingResult {
    type Output = Result<Value, RequestError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        if let Poll::Ready(res) = Pin::new(&mut self.rx).poll(cx) {
            return Poll::Ready(res.unwrap_or(Err(RequestError::ConnectionClosed)));
        }
        if self.deadline.as_mut().poll(cx).is_ready() {
            return Poll::Ready(Err(RequestError::Timeout));
        }
        Poll::Pending
    }
}

struct Entry {
    slot: Slot,
    created: Instant,
}

struct Inner {
    next_id: i64,
    // Ids only grow, so key order is also age order.
    entries: BTreeMap<SyncId, Entry>,
    closed: bool,
}

/// Table of outstanding requests for one connection.
///
/// Bounded both in time (`ttl`) and size (`capacity`); anything pushed out
/// of the table fails with [`RequestError::Timeout`] rather than vanishing.
pub struct CorrelationTable {
    inner: Mutex<Inner>,
    ttl: Duration,
    capacity: usize,
    reserved: SyncId,
}

impl Default for CorrelationTable {
    fn default() -> Self {
        Self::new()
    }
}

impl CorrelationTable {
    /// Create a table with the default limits.
    #[must_use]
    pub fn new() -> Self {
        Self::with_limits(DEFAULT_TTL, DEFAULT_CAPACITY, SyncId::PUSH)
    }

    /// Create a table with custom limits and reserved push id.
    #[must_use]
    pub fn with_limits(ttl: Duration, capacity: usize, reserved: SyncId) -> Self {
        Self {
            inner: Mutex::new(Inner {
                next_id: 0,
                entries: BTreeMap::new(),
                closed: false,
            }),
            ttl,
            capacity: capacity.max(1),
            reserved,
        }
    }

    /// Allocate a fresh correlation id and its pending result.
    ///
    /// After [`close_all`](Self::close_all) the returned result is already
    /// failed with [`RequestError::ConnectionClosed`].
    pub fn allocate(&self) -> (SyncId, PendingResult) {
        let now = Instant::now();
        let (tx, rx) = oneshot::channel();

        let mut inner = self.inner.lock();
        let mut id = SyncId(inner.next_id);
        if id == self.reserved {
            id = SyncId(id.0 + 1);
        }
        inner.next_id = id.0 + 1;

        if inner.closed {
            let _ = tx.send(Err(RequestError::ConnectionClosed));
        } else {
            self.expire_locked(&mut inner, now);
            while inner.entries.len() >= self.capacity {
                if let Some((old, entry)) = inner.entries.pop_first() {
                    tracing::warn!("Receive response timeout syncId={old} (table full)");
                    let _ = entry.slot.send(Err(RequestError::Timeout));
                }
            }
            inner.entries.insert(
                id,
                Entry {
                    slot: tx,
                    created: now,
                },
            );
        }
        drop(inner);

        let pending = PendingResult {
            sync_id: id,
            rx,
            deadline: Box::pin(tokio::time::sleep_until(now + self.ttl)),
        };
        (id, pending)
    }

    /// Resolve a pending request with its response payload.
    ///
    /// Returns `false` when the id is unknown: never allocated, already
    /// resolved, or expired.
    pub fn resolve(&self, id: SyncId, payload: Value) -> bool {
        self.complete(id, Ok(payload))
    }

    /// Fail a pending request.
    ///
    /// Returns `false` when the id is unknown.
    pub fn fail(&self, id: SyncId, error: RequestError) -> bool {
        self.complete(id, Err(error))
    }

    fn complete(&self, id: SyncId, result: Result<Value, RequestError>) -> bool {
        let now = Instant::now();
        let mut inner = self.inner.lock();
        self.expire_locked(&mut inner, now);
        let Some(entry) = inner.entries.remove(&id) else {
            return false;
        };
        drop(inner);
        // The caller may have given up on the result; that is not our concern.
        let _ = entry.slot.send(result);
        true
    }

    /// Fail every entry older than the TTL.
    ///
    /// Returns the number of entries expired.
    pub fn expire_stale(&self) -> usize {
        let now = Instant::now();
        let mut inner = self.inner.lock();
        self.expire_locked(&mut inner, now)
    }

    fn expire_locked(&self, inner: &mut Inner, now: Instant) -> usize {
        let mut expired = 0;
        while let Some(entry) = inner.entries.first_entry() {
            if now.duration_since(entry.get().created) < self.ttl {
                break;
            }
            let (id, entry) = entry.remove_entry();
            tracing::warn!("Receive response timeout syncId={id}");
            let _ = entry.slot.send(Err(RequestError::Timeout));
            expired += 1;
        }
        expired
    }

    /// Fail every outstanding entry with [`RequestError::ConnectionClosed`]
    /// and refuse new ones.
    ///
    /// Returns the number of entries failed; a second call returns 0.
    pub fn close_all(&self) -> usize {
        let drained = {
            let mut inner = self.inner.lock();
            inner.closed = true;
            std::mem::take(&mut inner.entries)
        };
        let count = drained.len();
        for (_, entry) in drained {
            let _ = entry.slot.send(Err(RequestError::ConnectionClosed));
        }
        count
    }

    /// Whether [`close_all`](Self::close_all) has been called.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.inner.lock().closed
    }

    /// Number of outstanding entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    /// Whether no request is outstanding.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
