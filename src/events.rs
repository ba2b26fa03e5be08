use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::{broadcast, mpsc};

use crate::cluster::Status;
use crate::node::PushMessage;
use crate::pool::NodeHandle;

const EVENT_BUS_CAPACITY: usize = 1024;

/// Lifecycle and pub/sub events observed on the cluster.
///
/// Events are delivered asynchronously over a broadcast channel in the
/// order they were emitted, so listeners registered right after the
/// triggering call still observe them.
#[derive(Debug, Clone)]
pub enum Event {
    Status(Status),
    NodeAdded(Arc<NodeHandle>),
    NodeRemoved(Arc<NodeHandle>),
    NodeError { endpoint: String, message: String },
    Refresh,
    Drain,
    Error(String),
    Message { channel: Bytes, payload: Bytes },
    MessageBuffer { channel: Bytes, payload: Bytes },
    PMessage { pattern: Bytes, channel: Bytes, payload: Bytes },
    PMessageBuffer { pattern: Bytes, channel: Bytes, payload: Bytes },
}

impl From<PushMessage> for Event {
    fn from(message: PushMessage) -> Self {
        match message {
            PushMessage::Message { channel, payload } => Event::Message { channel, payload },
            PushMessage::MessageBuffer { channel, payload } => {
                Event::MessageBuffer { channel, payload }
            }
            PushMessage::PMessage {
                pattern,
                channel,
                payload,
            } => Event::PMessage {
                pattern,
                channel,
                payload,
            },
            PushMessage::PMessageBuffer {
                pattern,
                channel,
                payload,
            } => Event::PMessageBuffer {
                pattern,
                channel,
                payload,
            },
        }
    }
}

/// Fans every event out to the public broadcast bus and to the controller's
/// internal monitor channel.
#[derive(Clone)]
pub(crate) struct Emitter {
    bus: broadcast::Sender<Event>,
    internal: mpsc::UnboundedSender<Event>,
}

impl Emitter {
    pub(crate) fn new() -> (Self, mpsc::UnboundedReceiver<Event>) {
        let (bus, _) = broadcast::channel(EVENT_BUS_CAPACITY);
        let (internal, internal_rx) = mpsc::unbounded_channel();
        (Self { bus, internal }, internal_rx)
    }

    pub(crate) fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.bus.subscribe()
    }

    pub(crate) fn emit(&self, event: Event) {
        let _ = self.internal.send(event.clone());
        let _ = self.bus.send(event);
    }
}
