use std::fmt;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{sleep, Duration};
use tracing::{debug, info, warn};

use crate::config::{parse_startup_nodes, ClusterOptions, Endpoint};
use crate::error::ClusterError;
use crate::events::{Emitter, Event};
use crate::node::Connector;
use crate::pool::{ConnectionPool, NodeGroup, NodeHandle};
use crate::queue::{OfflineQueue, RetryQueue};
use crate::slots::SlotMap;
use crate::subscriber::SubscriberState;

/// Controller lifecycle status. Transitions are emitted as [`Event::Status`]
/// in the order they are set and delivered asynchronously on the event bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Wait,
    Connecting,
    Connect,
    Ready,
    Reconnecting,
    Close,
    End,
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Status::Wait => "wait",
            Status::Connecting => "connecting",
            Status::Connect => "connect",
            Status::Ready => "ready",
            Status::Reconnecting => "reconnecting",
            Status::Close => "close",
            Status::End => "end",
        };
        f.write_str(name)
    }
}

pub(crate) struct ReconnectState {
    pub(crate) attempts: u32,
    pub(crate) manually_closing: bool,
    pub(crate) timer: Option<JoinHandle<()>>,
}

pub(crate) struct Inner {
    pub(crate) options: ClusterOptions,
    pub(crate) startup_nodes: Vec<Endpoint>,
    pub(crate) pool: ConnectionPool,
    pub(crate) slots: SlotMap,
    pub(crate) emitter: Emitter,
    pub(crate) status: watch::Sender<Status>,
    pub(crate) refreshing: AtomicBool,
    pub(crate) offline: OfflineQueue,
    pub(crate) failover: RetryQueue,
    pub(crate) cluster_down: RetryQueue,
    pub(crate) reconnect: Mutex<ReconnectState>,
    pub(crate) subscriber: Mutex<SubscriberState>,
}

/// Client-side Redis Cluster driver core.
///
/// Routes command submissions to the right member based on the cached slot
/// map, recovers MOVED/ASK/CLUSTERDOWN/connection-loss internally, owns one
/// node client per reachable endpoint and exposes the pool lifecycle as an
/// event stream.
#[derive(Clone)]
pub struct Cluster {
    pub(crate) inner: Arc<Inner>,
}

impl Cluster {
    /// Build a cluster against `startup_nodes` (addresses or URLs). The
    /// connector supplies the single-node clients; nothing connects until
    /// [`Cluster::connect`] is called.
    pub fn new<I, S>(
        startup_nodes: I,
        options: ClusterOptions,
        connector: Arc<dyn Connector>,
    ) -> Result<Self, ClusterError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let startup_nodes = parse_startup_nodes(startup_nodes)?;
        let (emitter, internal_rx) = Emitter::new();
        let pool = ConnectionPool::new(connector, options.redis_options.clone(), emitter.clone());
        let (status, _) = watch::channel(Status::Wait);

        let inner = Arc::new(Inner {
            options,
            startup_nodes,
            pool,
            slots: SlotMap::new(),
            emitter,
            status,
            refreshing: AtomicBool::new(false),
            offline: OfflineQueue::new(),
            failover: RetryQueue::new(),
            cluster_down: RetryQueue::new(),
            reconnect: Mutex::new(ReconnectState {
                attempts: 0,
                manually_closing: false,
                timer: None,
            }),
            subscriber: Mutex::new(SubscriberState::new()),
        });

        tokio::spawn(monitor(Arc::downgrade(&inner), internal_rx));
        Ok(Self { inner })
    }

    pub fn status(&self) -> Status {
        self.inner.current_status()
    }

    /// Subscribe to lifecycle and pub/sub events.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.inner.emitter.subscribe()
    }

    /// Snapshot of pool members in a role view.
    pub fn nodes(&self, group: NodeGroup) -> Vec<Arc<NodeHandle>> {
        self.inner.pool.nodes(group)
    }

    /// The cached slot map.
    pub fn slots(&self) -> &SlotMap {
        &self.inner.slots
    }

    /// Connect to the cluster: reset the pool with the startup nodes and
    /// resolve once the first slot refresh succeeds. Rejects when already
    /// connecting or connected, and with "None of startup nodes is
    /// available" when every startup node fails.
    pub async fn connect(&self) -> Result<(), ClusterError> {
        match self.status() {
            Status::Connecting | Status::Connect | Status::Ready => {
                return Err(ClusterError::AlreadyConnecting)
            }
            _ => {}
        }
        self.inner.clone().do_connect().await
    }

    /// Tear the cluster down. With `reconnect` set the retry policy applies
    /// as for any other close; otherwise the cluster transitions to `end`.
    pub fn disconnect(&self, reconnect: bool) {
        let inner = &self.inner;
        if inner.current_status() == Status::End {
            return;
        }
        {
            let mut state = inner.reconnect.lock();
            if !reconnect {
                state.manually_closing = true;
            }
            if let Some(timer) = state.timer.take() {
                timer.abort();
            }
        }

        // an already-empty pool cannot emit drain, so enter the close
        // policy directly
        if inner.pool.is_empty() {
            inner.clone().handle_close();
        } else {
            inner.pool.reset(&[]);
        }
    }

    /// Force a slot-map refresh. Coalesced with any refresh in flight.
    pub async fn refresh_slots_cache(&self) -> Result<(), ClusterError> {
        self.inner.refresh_slots_cache().await
    }
}

impl Inner {
    pub(crate) fn current_status(&self) -> Status {
        *self.status.borrow()
    }

    pub(crate) fn set_status(&self, status: Status) {
        debug!(status = %status, "status transition");
        self.status.send_replace(status);
        self.emitter.emit(Event::Status(status));
    }

    pub(crate) async fn do_connect(self: Arc<Self>) -> Result<(), ClusterError> {
        self.set_status(Status::Connecting);
        self.pool.reset(&self.startup_nodes);

        match self.refresh_slots_cache().await {
            Ok(()) => {
                {
                    let mut state = self.reconnect.lock();
                    state.attempts = 0;
                    state.manually_closing = false;
                }
                self.set_status(Status::Connect);
                self.set_status(Status::Ready);
                self.offline.drain_ready();
                self.clone().select_subscriber();
                Ok(())
            }
            Err(error) => {
                warn!(error = %error, "failed to connect to cluster");
                self.emitter.emit(Event::Error(error.to_string()));
                // cascades drain -> close and from there the retry policy
                self.pool.reset(&[]);
                Err(ClusterError::NoStartupNode)
            }
        }
    }

    /// Close policy, entered when the pool drains: reconnect per
    /// `cluster_retry_strategy`, or end and flush the offline queue.
    fn handle_close(self: Arc<Self>) {
        self.set_status(Status::Close);

        let mut state = self.reconnect.lock();
        if state.manually_closing {
            drop(state);
            self.set_status(Status::End);
            self.offline.flush(ClusterError::NoStartupNode);
            return;
        }

        state.attempts += 1;
        match (self.options.cluster_retry_strategy)(state.attempts) {
            Some(delay_ms) => {
                info!(attempt = state.attempts, delay_ms, "scheduling cluster reconnect");
                self.set_status(Status::Reconnecting);
                let inner = self.clone();
                state.timer = Some(tokio::spawn(async move {
                    sleep(Duration::from_millis(delay_ms)).await;
                    inner.reconnect.lock().timer = None;
                    let _ = inner.clone().do_connect().await;
                }));
            }
            None => {
                drop(state);
                info!("retry strategy gave up, ending cluster");
                self.set_status(Status::End);
                self.offline.flush(ClusterError::NoStartupNode);
            }
        }
    }
}

/// Internal reactions to pool events: the close policy on `drain` and
/// subscriber re-selection when the subscriber node leaves the pool.
async fn monitor(
    inner: std::sync::Weak<Inner>,
    mut events: mpsc::UnboundedReceiver<Event>,
) {
    while let Some(event) = events.recv().await {
        let Some(inner) = inner.upgrade() else { break };
        match event {
            Event::Drain => inner.handle_close(),
            Event::NodeRemoved(handle) => {
                let is_subscriber = inner
                    .subscriber
                    .lock()
                    .current_key()
                    .is_some_and(|key| key == handle.key());
                if is_subscriber {
                    debug!(node = %handle.key(), "subscriber left the pool, reselecting");
                    inner.select_subscriber();
                }
            }
            _ => {}
        }
    }
}
