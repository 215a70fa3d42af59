//! [`CorrelationTable`] – in-flight request bookkeeping.
//!
//! The robot answers a correlated command on its response topic with the
//! `requestId` it was sent.  The table maps each outstanding ID to a
//! single-shot notifier; the router calls [`CorrelationTable::resolve`] when
//! a response arrives and the issuing call, parked in
//! [`PendingHandle::wait`], wakes immediately.
//!
//! Entries are keyed by request ID, never by command, so two concurrent
//! `stop` calls cannot resolve each other.  A [`PendingHandle`] removes its
//! own entry when dropped, which is how timed-out requests leave the table;
//! a response arriving after that finds nothing and is ignored.

use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use tokio::sync::oneshot;
use tracing::{debug, trace};
use uuid::Uuid;

/// Legacy wait slice between response checks.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Legacy number of wait slices before giving up.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

/// How long a correlated command waits for its response.
///
/// The total budget is `poll_interval × max_attempts`.  A response wakes the
/// waiter immediately; the slices only pace the progress log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitPolicy {
    pub poll_interval: Duration,
    pub max_attempts: u32,
}

impl WaitPolicy {
    pub fn new(poll_interval: Duration, max_attempts: u32) -> Self {
        Self {
            poll_interval,
            max_attempts,
        }
    }

    /// Upper bound on a single wait.  Saturates at `Duration::MAX`.
    pub fn budget(&self) -> Duration {
        self.poll_interval
            .checked_mul(self.max_attempts)
            .unwrap_or(Duration::MAX)
    }
}

impl Default for WaitPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_POLL_INTERVAL, DEFAULT_MAX_ATTEMPTS)
    }
}

/// Result of waiting on a [`PendingHandle`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    Resolved,
    TimedOut,
}

struct PendingRequest {
    command: &'static str,
    issued_at: Instant,
    notify: oneshot::Sender<()>,
}

/// Shared map of outstanding request IDs.  Clones share the same table.
#[derive(Clone, Default)]
pub struct CorrelationTable {
    pending: Arc<DashMap<Uuid, PendingRequest>>,
}

impl CorrelationTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open an entry for `request_id`.  Registering an ID twice replaces the
    /// earlier entry, whose waiter then times out.
    pub fn register(&self, request_id: Uuid, command: &'static str) -> PendingHandle {
        let (notify, rx) = oneshot::channel();
        self.pending.insert(
            request_id,
            PendingRequest {
                command,
                issued_at: Instant::now(),
                notify,
            },
        );
        PendingHandle {
            request_id,
            rx,
            pending: Arc::clone(&self.pending),
        }
    }

    /// Wake the waiter for `request_id`.
    ///
    /// Returns `false`, and does nothing else, when the ID is unknown,
    /// already resolved, or its waiter has given up.
    pub fn resolve(&self, request_id: &Uuid) -> bool {
        let Some((_, request)) = self.pending.remove(request_id) else {
            return false;
        };
        debug!(
            command = request.command,
            %request_id,
            latency_ms = request.issued_at.elapsed().as_millis() as u64,
            "response correlated"
        );
        request.notify.send(()).is_ok()
    }

    pub fn contains(&self, request_id: &Uuid) -> bool {
        self.pending.contains_key(request_id)
    }

    /// Number of requests still waiting for a response.
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

/// The issuing side of one outstanding request.
pub struct PendingHandle {
    request_id: Uuid,
    rx: oneshot::Receiver<()>,
    pending: Arc<DashMap<Uuid, PendingRequest>>,
}

impl PendingHandle {
    /// Wait for the response, at most `policy.budget()`.
    pub async fn wait(mut self, policy: WaitPolicy) -> WaitOutcome {
        for attempt in 1..=policy.max_attempts {
            match tokio::time::timeout(policy.poll_interval, &mut self.rx).await {
                Ok(Ok(())) => return WaitOutcome::Resolved,
                // Notifier dropped without firing: the entry was replaced.
                Ok(Err(_)) => return WaitOutcome::TimedOut,
                Err(_) => trace!(request_id = %self.request_id, attempt, "no response yet"),
            }
        }
        WaitOutcome::TimedOut
    }
}

impl Drop for PendingHandle {
    fn drop(&mut self) {
        self.pending.remove(&self.request_id);
    }
}
