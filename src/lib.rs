//! Core of a client-side Redis Cluster driver.
//!
//! The [`Cluster`] controller routes command submissions to the right
//! cluster member through a cached hash-slot map, recovers cluster
//! redirection and failure signals (`MOVED`, `ASK`, `CLUSTERDOWN`,
//! connection loss) with a bounded redirection budget, owns one single-node
//! client per reachable endpoint, and exposes an [`Event`] stream describing
//! the pool and controller lifecycle.
//!
//! The single-connection client itself (framing, RESP parsing, pipeline) is
//! an external collaborator: implement [`NodeClient`] and [`Connector`] to
//! plug one in.

pub mod cluster;
pub mod command;
pub mod config;
pub mod error;
pub mod events;
pub mod node;
pub mod pool;
pub mod resp;
pub mod router;
pub mod slots;
pub mod utils;

mod fetcher;
mod queue;
mod subscriber;

pub use cluster::{Cluster, Status};
pub use command::Command;
pub use config::{
    default_retry_strategy, ClusterOptions, Endpoint, RedisOptions, ScaleReads, Selection,
};
pub use error::ClusterError;
pub use events::Event;
pub use node::{Connector, NodeClient, NodeStatus, PushMessage, SubscriptionSnapshot};
pub use pool::{ConnectionPool, NodeGroup, NodeHandle, Role};
pub use resp::Value;
pub use router::NodeTarget;
pub use slots::{SlotMap, SLOT_COUNT};
