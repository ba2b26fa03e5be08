use std::sync::Arc;

use futures::future::join_all;
use rand::seq::SliceRandom;
use rand::thread_rng;
use tokio::task::JoinHandle;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, warn};

use crate::cluster::Inner;
use crate::command::Command;
use crate::node::NodeStatus;
use crate::pool::{NodeGroup, NodeHandle};

/// Which pool member currently carries the pub/sub traffic, plus the
/// last node whose subscription set is authoritative for re-subscription.
pub(crate) struct SubscriberState {
    current: Option<Arc<NodeHandle>>,
    last_active: Option<Arc<NodeHandle>>,
    forwarder: Option<JoinHandle<()>>,
}

impl SubscriberState {
    pub(crate) fn new() -> Self {
        Self {
            current: None,
            last_active: None,
            forwarder: None,
        }
    }

    pub(crate) fn current_key(&self) -> Option<String> {
        self.current.as_ref().map(|handle| handle.key().to_string())
    }
}

impl Inner {
    pub(crate) fn subscriber_node(&self) -> Option<Arc<NodeHandle>> {
        self.subscriber.lock().current.clone()
    }

    /// Dedicate a random pool member to pub/sub. Runs on the first `ready`
    /// and again whenever the current subscriber leaves the pool.
    ///
    /// When a previous subscriber recorded channels, they are re-issued on
    /// the new node before it becomes the authoritative subscriber;
    /// re-subscription failures are deliberately ignored and the node stays
    /// selected.
    pub(crate) fn select_subscriber(self: Arc<Self>) {
        let mut state = self.subscriber.lock();

        let candidates = self.pool.nodes(NodeGroup::All);
        let Some(node) = candidates.choose(&mut thread_rng()).cloned() else {
            state.current = None;
            if let Some(forwarder) = state.forwarder.take() {
                forwarder.abort();
            }
            return;
        };
        debug!(node = %node.key(), "selected subscriber node");
        state.current = Some(node.clone());

        if let Some(forwarder) = state.forwarder.take() {
            forwarder.abort();
        }
        state.forwarder = Some(self.spawn_forwarder(&node));

        let previous = state.last_active.clone();
        if let Some(previous) = previous {
            let snapshot = previous.client().snapshot_subscriptions();
            if !snapshot.is_empty() {
                drop(state);
                let inner = self.clone();
                tokio::spawn(async move {
                    let mut calls: Vec<Command> = Vec::new();
                    if !snapshot.channels.is_empty() {
                        calls.push(Command::new("subscribe", snapshot.channels));
                    }
                    if !snapshot.patterns.is_empty() {
                        calls.push(Command::new("psubscribe", snapshot.patterns));
                    }
                    let results =
                        join_all(calls.iter().map(|call| node.client().send(call))).await;
                    if results.iter().all(Result::is_ok) {
                        inner.subscriber.lock().last_active = Some(node);
                    } else {
                        warn!(node = %node.key(), "failed to re-subscribe previous channels");
                    }
                });
                return;
            }
        }

        if node.client().status() == NodeStatus::Wait {
            node.client().connect();
        }
        state.last_active = Some(node);
    }

    /// Re-emit the subscriber node's pub/sub deliveries from the controller
    /// with identical payloads.
    fn spawn_forwarder(self: &Arc<Self>, node: &Arc<NodeHandle>) -> JoinHandle<()> {
        let mut messages = node.client().push_messages();
        let inner = Arc::downgrade(self);
        tokio::spawn(async move {
            loop {
                match messages.recv().await {
                    Ok(message) => {
                        let Some(inner) = inner.upgrade() else { break };
                        inner.emitter.emit(message.into());
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "subscriber forwarder lagged");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        })
    }
}
