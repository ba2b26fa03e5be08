use std::sync::Arc;

use rand::seq::SliceRandom;
use rand::thread_rng;
use tokio::time::{sleep, Duration};
use tracing::{debug, warn};

use crate::cluster::{Cluster, Inner, Status};
use crate::command::{self, Command, SubscriberMode};
use crate::config::{Endpoint, ScaleReads, Selection};
use crate::error::ClusterError;
use crate::pool::{NodeGroup, NodeHandle};
use crate::resp::Value;

/// Caller-pinned routing target: a fixed slot, a fixed node, or both.
/// When a slot is supplied it overrides the slot derived from the command;
/// the resolved handle is cached for the lifetime of the submission.
#[derive(Clone, Default)]
pub struct NodeTarget {
    pub slot: Option<u16>,
    pub node: Option<Arc<NodeHandle>>,
}

#[derive(Debug)]
enum Redirect {
    Moved { slot: u16, endpoint: Endpoint },
    Ask { slot: u16, endpoint: Endpoint },
}

/// MOVED/ASK reply text, split on ASCII space into kind, slot, host:port.
fn parse_redirect(error: &ClusterError) -> Option<Redirect> {
    let ClusterError::Reply(message) = error else {
        return None;
    };
    let mut parts = message.split(' ');
    let kind = parts.next()?;
    if kind != "MOVED" && kind != "ASK" {
        return None;
    }
    let slot = parts.next()?.parse::<u16>().ok()?;
    let endpoint = Endpoint::from_key(parts.next()?).ok()?;
    match kind {
        "MOVED" => Some(Redirect::Moved { slot, endpoint }),
        _ => Some(Redirect::Ask { slot, endpoint }),
    }
}

fn is_cluster_down(error: &ClusterError) -> bool {
    matches!(error, ClusterError::Reply(message) if message.starts_with("CLUSTERDOWN"))
}

#[derive(Clone, Copy, PartialEq)]
enum RetryKind {
    Failover,
    ClusterDown,
}

impl Cluster {
    /// Submit a command and await its result.
    pub async fn send_command(&self, command: Command) -> Result<Value, ClusterError> {
        self.inner.dispatch(command, None).await
    }

    /// Submit a command against a caller-pinned target.
    pub async fn send_command_to(
        &self,
        target: NodeTarget,
        command: Command,
    ) -> Result<Value, ClusterError> {
        self.inner.dispatch(command, Some(target)).await
    }
}

impl Inner {
    pub(crate) async fn dispatch(
        self: &Arc<Self>,
        command: Command,
        pinned: Option<NodeTarget>,
    ) -> Result<Value, ClusterError> {
        if self.current_status() == Status::End {
            return Err(ClusterError::ConnectionClosed);
        }

        // Non-readonly commands always go to a primary regardless of the
        // configured read scaling.
        let readonly = command::exists(command.name()) && command::is_readonly(command.name());
        let scale = if readonly || self.options.scale_reads.is_master() {
            self.options.scale_reads.clone()
        } else {
            ScaleReads::Master
        };

        let target_slot = match &pinned {
            Some(target) => target.slot,
            None => command.slot(),
        };
        let mut pinned_handle = pinned.as_ref().and_then(|target| target.node.clone());

        let mut ttl: Option<u32> = None;
        let mut random = false;
        let mut asking: Option<Endpoint> = None;

        loop {
            if self.current_status() == Status::End {
                return Err(ClusterError::Ended);
            }

            let node = if self.current_status() == Status::Ready {
                let selected = self.select_node(
                    &command,
                    &scale,
                    target_slot,
                    random,
                    asking.take(),
                    pinned_handle.as_ref(),
                );
                if pinned.is_some() && pinned_handle.is_none() {
                    pinned_handle = selected.clone();
                }
                selected
            } else {
                None
            };

            let Some(node) = node else {
                if !self.options.enable_offline_queue {
                    return Err(ClusterError::OfflineQueueDisabled);
                }
                debug!(command = %command.name(), "cluster not ready, queueing command offline");
                let parked = self.offline.push(command.name());
                match parked.await {
                    Ok(Ok(())) => continue,
                    Ok(Err(error)) => return Err(error),
                    Err(_) => return Err(ClusterError::Ended),
                }
            };

            match node.client().send(&command).await {
                Ok(value) => return Ok(value),
                Err(error) => {
                    let remaining = match ttl {
                        None => {
                            let initial = self.options.max_redirections;
                            ttl = Some(initial);
                            initial
                        }
                        Some(current) => {
                            let next = current.saturating_sub(1);
                            ttl = Some(next);
                            next
                        }
                    };
                    if remaining == 0 {
                        return Err(ClusterError::TooManyRedirections {
                            last: Box::new(error),
                        });
                    }

                    match parse_redirect(&error) {
                        Some(Redirect::Moved { slot, endpoint }) => {
                            debug!(slot, endpoint = %endpoint, "command moved");
                            self.slots.set_master(slot, &endpoint.key());
                            self.pool.find_or_create(&endpoint);
                            random = false;
                            // reconcile in the background; the eager local
                            // update above already routes followers
                            self.schedule_refresh();
                            continue;
                        }
                        Some(Redirect::Ask { slot, endpoint }) => {
                            debug!(slot, endpoint = %endpoint, "command asked to migrate target");
                            asking = Some(endpoint);
                            random = false;
                            continue;
                        }
                        None => {}
                    }

                    if is_cluster_down(&error) && self.options.retry_delay_on_cluster_down > 0 {
                        warn!(command = %command.name(), "cluster is down, deferring retry");
                        self.park_retry(RetryKind::ClusterDown).await;
                        random = true;
                        continue;
                    }
                    if error == ClusterError::ConnectionClosed
                        && self.options.retry_delay_on_failover > 0
                    {
                        debug!(command = %command.name(), "connection closed, deferring retry");
                        self.park_retry(RetryKind::Failover).await;
                        random = true;
                        continue;
                    }

                    return Err(error);
                }
            }
        }
    }

    fn select_node(
        self: &Arc<Self>,
        command: &Command,
        scale: &ScaleReads,
        target_slot: Option<u16>,
        random: bool,
        asking: Option<Endpoint>,
        pinned: Option<&Arc<NodeHandle>>,
    ) -> Option<Arc<NodeHandle>> {
        if let Some(handle) = pinned {
            return Some(handle.clone());
        }
        if command::subscriber_mode(command.name()) != SubscriberMode::None {
            if let Some(handle) = self.subscriber_node() {
                return Some(handle);
            }
        }

        let mut node = None;
        if !random {
            if let Some(keys) = target_slot.and_then(|slot| self.slots.get(slot)) {
                node = self.select_from_slot_entry(&keys, scale, command);
            }
            if let Some(endpoint) = asking {
                let handle = self.pool.find_or_create(&endpoint);
                handle.client().asking();
                node = Some(handle);
            }
        }

        node.or_else(|| {
            let group = match scale {
                ScaleReads::Master => NodeGroup::Master,
                ScaleReads::Slave => NodeGroup::Slave,
                ScaleReads::All | ScaleReads::Custom(_) => NodeGroup::All,
            };
            sample(self.pool.nodes(group)).or_else(|| sample(self.pool.nodes(NodeGroup::All)))
        })
    }

    /// Pick a node from the ordered endpoint-key list of a slot: primary at
    /// index 0, replicas after.
    fn select_from_slot_entry(
        &self,
        keys: &[String],
        scale: &ScaleReads,
        command: &Command,
    ) -> Option<Arc<NodeHandle>> {
        let primary = || keys.first().and_then(|key| self.pool.get(key));
        match scale {
            ScaleReads::Master => primary(),
            ScaleReads::All => keys
                .choose(&mut thread_rng())
                .and_then(|key| self.pool.get(key)),
            ScaleReads::Slave => {
                if keys.len() > 1 {
                    keys[1..]
                        .choose(&mut thread_rng())
                        .and_then(|key| self.pool.get(key))
                } else {
                    primary()
                }
            }
            ScaleReads::Custom(selector) => {
                let handles: Vec<Arc<NodeHandle>> = keys
                    .iter()
                    .filter_map(|key| self.pool.get(key))
                    .collect();
                match selector(&handles, command) {
                    Selection::Node(handle) => Some(handle),
                    Selection::Sample(candidates) => {
                        candidates.choose(&mut thread_rng()).cloned()
                    }
                    Selection::Primary => primary(),
                }
            }
        }
    }

    /// Park the current submission on a shared-timer retry queue. The first
    /// parked retry arms the timer; when it fires, one coalesced refresh
    /// runs and the whole batch wakes in insertion order.
    async fn park_retry(self: &Arc<Self>, kind: RetryKind) {
        let (queue, delay_ms) = match kind {
            RetryKind::Failover => (&self.failover, self.options.retry_delay_on_failover),
            RetryKind::ClusterDown => (&self.cluster_down, self.options.retry_delay_on_cluster_down),
        };
        let (parked, arm) = queue.park();
        if arm {
            let inner = self.clone();
            tokio::spawn(async move {
                sleep(Duration::from_millis(delay_ms)).await;
                let queue = match kind {
                    RetryKind::Failover => &inner.failover,
                    RetryKind::ClusterDown => &inner.cluster_down,
                };
                let batch = queue.take_batch();
                if let Err(error) = inner.refresh_slots_cache().await {
                    warn!(error = %error, "refresh before batched retry failed");
                }
                for waker in batch {
                    let _ = waker.send(());
                }
            });
        }
        let _ = parked.await;
    }
}

fn sample(nodes: Vec<Arc<NodeHandle>>) -> Option<Arc<NodeHandle>> {
    nodes.choose(&mut thread_rng()).cloned()
}
