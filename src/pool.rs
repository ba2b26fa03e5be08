use std::fmt;
use std::sync::Arc;

use hashbrown::HashMap;
use parking_lot::RwLock;
use tracing::debug;

use crate::config::{Endpoint, RedisOptions};
use crate::events::{Emitter, Event};
use crate::node::{Connector, NodeClient};

/// Replication role of a pool member.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Master,
    Slave,
}

/// Role filter for pool snapshots.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeGroup {
    All,
    Master,
    Slave,
}

/// A pool-owned node: one single-node client per known endpoint.
pub struct NodeHandle {
    endpoint: Endpoint,
    key: String,
    role: RwLock<Role>,
    client: Arc<dyn NodeClient>,
}

impl NodeHandle {
    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn role(&self) -> Role {
        *self.role.read()
    }

    pub fn client(&self) -> &Arc<dyn NodeClient> {
        &self.client
    }
}

impl fmt::Debug for NodeHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeHandle")
            .field("key", &self.key)
            .field("role", &self.role())
            .finish()
    }
}

#[derive(Default)]
struct NodeViews {
    all: HashMap<String, Arc<NodeHandle>>,
    master: HashMap<String, Arc<NodeHandle>>,
    slave: HashMap<String, Arc<NodeHandle>>,
}

/// Owns one [`NodeHandle`] per reachable endpoint and keeps the
/// `all`/`master`/`slave` views consistent. Emits `+node` exactly once per
/// handle creation, `-node` once per removal and `drain` when the pool
/// becomes empty after having been populated.
pub struct ConnectionPool {
    connector: Arc<dyn Connector>,
    redis_options: RedisOptions,
    nodes: RwLock<NodeViews>,
    emitter: Emitter,
}

impl ConnectionPool {
    pub(crate) fn new(
        connector: Arc<dyn Connector>,
        redis_options: RedisOptions,
        emitter: Emitter,
    ) -> Self {
        Self {
            connector,
            redis_options,
            nodes: RwLock::new(NodeViews::default()),
            emitter,
        }
    }

    /// Replace the member set. Endpoints absent from `endpoints` are
    /// disconnected and removed; new ones are created; an endpoint whose
    /// role changed is reclassified in place without churning its handle.
    pub fn reset(&self, endpoints: &[Endpoint]) {
        let mut desired: HashMap<String, Role> = HashMap::new();
        for endpoint in endpoints {
            let role = if endpoint.read_only {
                Role::Slave
            } else {
                Role::Master
            };
            // a primary occurrence of a duplicated endpoint wins
            desired
                .entry(endpoint.key())
                .and_modify(|existing| {
                    if role == Role::Master {
                        *existing = Role::Master;
                    }
                })
                .or_insert(role);
        }

        let mut added = Vec::new();
        let mut removed = Vec::new();
        let drained;
        {
            let mut views = self.nodes.write();
            let was_populated = !views.all.is_empty();

            let stale: Vec<String> = views
                .all
                .keys()
                .filter(|key| !desired.contains_key(*key))
                .cloned()
                .collect();
            for key in stale {
                if let Some(handle) = views.all.remove(&key) {
                    views.master.remove(&key);
                    views.slave.remove(&key);
                    removed.push(handle);
                }
            }

            for endpoint in endpoints {
                let key = endpoint.key();
                let role = desired[&key];
                if let Some(handle) = views.all.get(&key).cloned() {
                    if handle.role() != role {
                        *handle.role.write() = role;
                        match role {
                            Role::Master => {
                                views.slave.remove(&key);
                                views.master.insert(key, handle);
                            }
                            Role::Slave => {
                                views.master.remove(&key);
                                views.slave.insert(key, handle);
                            }
                        }
                    }
                } else {
                    let handle = self.create_handle(endpoint.clone(), role);
                    views.all.insert(key.clone(), handle.clone());
                    match role {
                        Role::Master => views.master.insert(key, handle.clone()),
                        Role::Slave => views.slave.insert(key, handle.clone()),
                    };
                    added.push(handle);
                }
            }

            drained = was_populated && views.all.is_empty();
        }

        for handle in added {
            debug!(node = %handle.key(), "node added to pool");
            self.emitter.emit(Event::NodeAdded(handle));
        }
        for handle in removed {
            debug!(node = %handle.key(), "node removed from pool");
            handle.client().disconnect();
            self.emitter.emit(Event::NodeRemoved(handle));
        }
        if drained {
            self.emitter.emit(Event::Drain);
        }
    }

    /// Return the handle for an endpoint, creating it with the default
    /// master role when absent.
    pub fn find_or_create(&self, endpoint: &Endpoint) -> Arc<NodeHandle> {
        let key = endpoint.key();
        let created = {
            let mut views = self.nodes.write();
            if let Some(handle) = views.all.get(&key) {
                return handle.clone();
            }
            let handle = self.create_handle(endpoint.clone(), Role::Master);
            views.all.insert(key.clone(), handle.clone());
            views.master.insert(key, handle.clone());
            handle
        };
        debug!(node = %created.key(), "node added to pool");
        self.emitter.emit(Event::NodeAdded(created.clone()));
        created
    }

    pub fn get(&self, key: &str) -> Option<Arc<NodeHandle>> {
        self.nodes.read().all.get(key).cloned()
    }

    /// Snapshot of the handles in a role view.
    pub fn nodes(&self, group: NodeGroup) -> Vec<Arc<NodeHandle>> {
        let views = self.nodes.read();
        let source = match group {
            NodeGroup::All => &views.all,
            NodeGroup::Master => &views.master,
            NodeGroup::Slave => &views.slave,
        };
        source.values().cloned().collect()
    }

    /// Endpoint keys of every pool member.
    pub fn keys(&self) -> Vec<String> {
        self.nodes.read().all.keys().cloned().collect()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.read().all.is_empty()
    }

    fn create_handle(&self, mut endpoint: Endpoint, role: Role) -> Arc<NodeHandle> {
        endpoint.read_only = role == Role::Slave;
        let client = self.connector.connect(&endpoint, &self.redis_options);
        Arc::new(NodeHandle {
            key: endpoint.key(),
            endpoint,
            role: RwLock::new(role),
            client,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use tokio::sync::broadcast;

    use crate::command::Command;
    use crate::error::ClusterError;
    use crate::node::{NodeStatus, PushMessage, SubscriptionSnapshot};
    use crate::resp::Value;

    struct StubClient;

    #[async_trait]
    impl NodeClient for StubClient {
        fn status(&self) -> NodeStatus {
            NodeStatus::Ready
        }
        fn connect(&self) {}
        fn disconnect(&self) {}
        fn asking(&self) {}
        async fn send(&self, _command: &Command) -> Result<Value, ClusterError> {
            Ok(Value::ok())
        }
        async fn cluster_slots(&self) -> Result<Value, ClusterError> {
            Ok(Value::Array(Vec::new()))
        }
        fn snapshot_subscriptions(&self) -> SubscriptionSnapshot {
            SubscriptionSnapshot::default()
        }
        fn push_messages(&self) -> broadcast::Receiver<PushMessage> {
            broadcast::channel(1).1
        }
    }

    struct StubConnector;

    impl Connector for StubConnector {
        fn connect(&self, _endpoint: &Endpoint, _options: &RedisOptions) -> Arc<dyn NodeClient> {
            Arc::new(StubClient)
        }
    }

    fn pool() -> (ConnectionPool, broadcast::Receiver<Event>) {
        let (emitter, _internal) = Emitter::new();
        let rx = emitter.subscribe();
        (
            ConnectionPool::new(Arc::new(StubConnector), RedisOptions::default(), emitter),
            rx,
        )
    }

    fn drain_events(rx: &mut broadcast::Receiver<Event>) -> Vec<Event> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    fn replica(host: &str, port: u16) -> Endpoint {
        let mut endpoint = Endpoint::new(host, port);
        endpoint.read_only = true;
        endpoint
    }

    #[tokio::test]
    async fn reset_is_idempotent() {
        let (pool, mut rx) = pool();
        let endpoints = vec![Endpoint::new("a", 1), replica("b", 2)];
        pool.reset(&endpoints);
        let first = drain_events(&mut rx);
        assert_eq!(
            first
                .iter()
                .filter(|e| matches!(e, Event::NodeAdded(_)))
                .count(),
            2
        );

        pool.reset(&endpoints);
        assert!(drain_events(&mut rx).is_empty());
    }

    #[tokio::test]
    async fn reset_reclassifies_role_in_place() {
        let (pool, mut rx) = pool();
        pool.reset(&[Endpoint::new("a", 1)]);
        let before = pool.get("a:1").unwrap();
        assert_eq!(before.role(), Role::Master);
        drain_events(&mut rx);

        pool.reset(&[replica("a", 1)]);
        let after = pool.get("a:1").unwrap();
        assert!(Arc::ptr_eq(&before, &after));
        assert_eq!(after.role(), Role::Slave);
        assert_eq!(pool.nodes(NodeGroup::Master).len(), 0);
        assert_eq!(pool.nodes(NodeGroup::Slave).len(), 1);
        assert!(drain_events(&mut rx).is_empty());
    }

    #[tokio::test]
    async fn reset_to_empty_emits_drain_once() {
        let (pool, mut rx) = pool();
        pool.reset(&[Endpoint::new("a", 1)]);
        drain_events(&mut rx);

        pool.reset(&[]);
        let events = drain_events(&mut rx);
        assert!(matches!(events.last(), Some(Event::Drain)));

        pool.reset(&[]);
        assert!(drain_events(&mut rx).is_empty());
    }

    #[tokio::test]
    async fn find_or_create_is_idempotent() {
        let (pool, mut rx) = pool();
        let first = pool.find_or_create(&Endpoint::new("a", 1));
        let second = pool.find_or_create(&Endpoint::new("a", 1));
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(
            drain_events(&mut rx)
                .iter()
                .filter(|e| matches!(e, Event::NodeAdded(_)))
                .count(),
            1
        );
    }
}
