use std::sync::atomic::Ordering;
use std::sync::Arc;

use rand::seq::SliceRandom;
use rand::thread_rng;
use tokio::time::{timeout, Duration};
use tracing::{debug, info, warn};

use crate::cluster::{Inner, Status};
use crate::error::ClusterError;
use crate::events::Event;
use crate::slots::parse_cluster_slots;

/// Per-node timeout for the `CLUSTER SLOTS` probe.
const PROBE_TIMEOUT: Duration = Duration::from_millis(1000);

impl Inner {
    /// Refresh the slot cache from the first pool member that answers
    /// `CLUSTER SLOTS`, walking a shuffled snapshot of the pool.
    ///
    /// At most one refresh runs at a time: a request issued while one is in
    /// flight resolves immediately without probing any node, so callers
    /// coalesce onto the ongoing walk.
    pub(crate) async fn refresh_slots_cache(self: &Arc<Self>) -> Result<(), ClusterError> {
        if self.refreshing.swap(true, Ordering::AcqRel) {
            debug!("slot refresh already in flight, coalescing");
            return Ok(());
        }
        let result = self.refresh_walk().await;
        self.refreshing.store(false, Ordering::Release);
        result
    }

    /// Kick a refresh in the background, e.g. to reconcile after a MOVED
    /// hint. Failures here are logged, not fatal: the next redirection will
    /// correct any remaining staleness.
    pub(crate) fn schedule_refresh(self: &Arc<Self>) {
        let inner = self.clone();
        tokio::spawn(async move {
            if let Err(error) = inner.refresh_slots_cache().await {
                warn!(error = %error, "background slot refresh failed");
            }
        });
    }

    async fn refresh_walk(self: &Arc<Self>) -> Result<(), ClusterError> {
        let mut keys = self.pool.keys();
        keys.shuffle(&mut thread_rng());

        let mut last_error = ClusterError::NoStartupNode;
        for key in keys {
            if self.current_status() == Status::End {
                return Err(ClusterError::Disconnected);
            }
            let Some(handle) = self.pool.get(&key) else {
                continue;
            };

            let reply = match timeout(PROBE_TIMEOUT, handle.client().cluster_slots()).await {
                Ok(Ok(reply)) => reply,
                Ok(Err(error)) => {
                    self.note_probe_failure(&key, error, &mut last_error);
                    continue;
                }
                Err(_) => {
                    let error =
                        ClusterError::Transport(format!("CLUSTER SLOTS timed out on {key}"));
                    self.note_probe_failure(&key, error, &mut last_error);
                    continue;
                }
            };

            match parse_cluster_slots(&reply) {
                Ok((ranges, endpoints)) => {
                    self.pool.reset(&endpoints);
                    self.slots.apply_ranges(&ranges);
                    info!(node = %key, ranges = ranges.len(), "cluster slots refreshed");
                    self.emitter.emit(Event::Refresh);
                    return Ok(());
                }
                Err(error) => {
                    self.note_probe_failure(&key, error, &mut last_error);
                }
            }
        }

        Err(ClusterError::RefreshFailed {
            last_node_error: Box::new(last_error),
        })
    }

    fn note_probe_failure(&self, key: &str, error: ClusterError, last_error: &mut ClusterError) {
        warn!(node = %key, error = %error, "failed to fetch CLUSTER SLOTS");
        self.emitter.emit(Event::NodeError {
            endpoint: key.to_string(),
            message: error.to_string(),
        });
        *last_error = error;
    }
}
