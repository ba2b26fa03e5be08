use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use tokio::sync::oneshot;
use tracing::debug;

use crate::error::ClusterError;

/// FIFO of submissions parked while the cluster is not ready.
///
/// Unbounded by construction; backpressure is expected to come from the
/// application, since every parked entry corresponds to a caller awaiting
/// its command future.
pub(crate) struct OfflineQueue {
    entries: Mutex<VecDeque<OfflineEntry>>,
}

struct OfflineEntry {
    name: String,
    waker: oneshot::Sender<Result<(), ClusterError>>,
}

impl OfflineQueue {
    pub(crate) fn new() -> Self {
        Self {
            entries: Mutex::new(VecDeque::new()),
        }
    }

    /// Park a submission; the receiver resolves when the cluster becomes
    /// ready (`Ok`) or reaches a terminal state (`Err`).
    pub(crate) fn push(&self, name: &str) -> oneshot::Receiver<Result<(), ClusterError>> {
        let (waker, rx) = oneshot::channel();
        self.entries.lock().push_back(OfflineEntry {
            name: name.to_string(),
            waker,
        });
        rx
    }

    /// Wake every parked submission in insertion order.
    pub(crate) fn drain_ready(&self) {
        let entries: Vec<OfflineEntry> = self.entries.lock().drain(..).collect();
        if !entries.is_empty() {
            debug!(count = entries.len(), "draining offline queue");
        }
        for entry in entries {
            let _ = entry.waker.send(Ok(()));
        }
    }

    /// Reject every parked submission with `error`.
    pub(crate) fn flush(&self, error: ClusterError) {
        let entries: Vec<OfflineEntry> = self.entries.lock().drain(..).collect();
        for entry in entries {
            debug!(command = %entry.name, "rejecting queued command");
            let _ = entry.waker.send(Err(error.clone()));
        }
    }
}

/// FIFO of retry wakers sharing one timer, used for the failover and
/// cluster-down disciplines: many commands failing inside the delay window
/// coalesce into a single refresh before they all retry.
pub(crate) struct RetryQueue {
    waiters: Mutex<VecDeque<oneshot::Sender<()>>>,
    timer_armed: AtomicBool,
}

impl RetryQueue {
    pub(crate) fn new() -> Self {
        Self {
            waiters: Mutex::new(VecDeque::new()),
            timer_armed: AtomicBool::new(false),
        }
    }

    /// Park a retry. The boolean is true when the caller must arm the
    /// shared timer for this batch.
    pub(crate) fn park(&self) -> (oneshot::Receiver<()>, bool) {
        let (waker, rx) = oneshot::channel();
        self.waiters.lock().push_back(waker);
        let arm = !self.timer_armed.swap(true, Ordering::AcqRel);
        (rx, arm)
    }

    /// Take the current batch and clear the timer flag. Retries parked
    /// after this point belong to the next batch and arm a fresh timer.
    pub(crate) fn take_batch(&self) -> Vec<oneshot::Sender<()>> {
        let mut waiters = self.waiters.lock();
        let batch = waiters.drain(..).collect();
        self.timer_armed.store(false, Ordering::Release);
        batch
    }
}
