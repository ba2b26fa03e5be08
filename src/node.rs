use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::broadcast;

use crate::command::Command;
use crate::config::{Endpoint, RedisOptions};
use crate::error::ClusterError;
use crate::resp::Value;

/// Lifecycle of a single-node client connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeStatus {
    Wait,
    Connecting,
    Connect,
    Ready,
    End,
}

/// Channel lists recorded by a node that entered subscriber mode.
#[derive(Debug, Clone, Default)]
pub struct SubscriptionSnapshot {
    pub channels: Vec<Bytes>,
    pub patterns: Vec<Bytes>,
}

impl SubscriptionSnapshot {
    pub fn is_empty(&self) -> bool {
        self.channels.is_empty() && self.patterns.is_empty()
    }
}

/// A pub/sub delivery surfaced by a node in subscriber mode.
#[derive(Debug, Clone)]
pub enum PushMessage {
    Message { channel: Bytes, payload: Bytes },
    MessageBuffer { channel: Bytes, payload: Bytes },
    PMessage { pattern: Bytes, channel: Bytes, payload: Bytes },
    PMessageBuffer { pattern: Bytes, channel: Bytes, payload: Bytes },
}

/// The single-connection Redis client consumed by the cluster core.
///
/// Framing, RESP parsing and the per-connection pipeline live behind this
/// trait; the cluster only relies on the submission API, the lifecycle
/// status, the one-shot `ASKING` flag and the subscriber-mode introspection.
#[async_trait]
pub trait NodeClient: Send + Sync + 'static {
    fn status(&self) -> NodeStatus;

    /// Begin connecting. Progress is reflected through [`NodeClient::status`].
    fn connect(&self);

    fn disconnect(&self);

    /// Arm a one-shot `ASKING` prefix for the next submitted command.
    fn asking(&self);

    /// Submit a command and await its reply. Error replies from the server
    /// are returned as [`ClusterError::Reply`] with the message verbatim.
    async fn send(&self, command: &Command) -> Result<Value, ClusterError>;

    /// Run `CLUSTER SLOTS` on this connection.
    async fn cluster_slots(&self) -> Result<Value, ClusterError>;

    /// Channel lists this client accumulated in subscriber mode.
    fn snapshot_subscriptions(&self) -> SubscriptionSnapshot;

    /// Stream of pub/sub deliveries while this client is the subscriber.
    fn push_messages(&self) -> broadcast::Receiver<PushMessage>;
}

/// Builds node clients for the pool; one client per known endpoint.
pub trait Connector: Send + Sync + 'static {
    fn connect(&self, endpoint: &Endpoint, options: &RedisOptions) -> Arc<dyn NodeClient>;
}
