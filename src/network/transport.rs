use crate::error::{IvyError, Result};
use crate::protocol::messages::{Message, Queue, Snapshot};
use crate::protocol::types::{ActorId, ManagerId};

use dashmap::DashMap;
use rand::Rng;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::mpsc;

/// Sending half of an actor's queues, held by the network registry.
#[derive(Clone)]
struct Mailbox {
    requests: mpsc::UnboundedSender<Message>,
    responses: mpsc::UnboundedSender<Message>,
    snapshots: mpsc::UnboundedSender<Snapshot>,
}

/// Receiving half of an actor's queues. Owned by exactly one actor.
pub struct Inbox {
    pub requests: mpsc::UnboundedReceiver<Message>,
    pub responses: mpsc::UnboundedReceiver<Message>,
    pub snapshots: mpsc::UnboundedReceiver<Snapshot>,
}

impl Inbox {
    /// Drops everything currently queued on the request and response queues.
    /// Returns how many messages were discarded.
    pub fn drain_protocol(&mut self) -> usize {
        let mut dropped = 0;
        while self.requests.try_recv().is_ok() {
            dropped += 1;
        }
        while self.responses.try_recv().is_ok() {
            dropped += 1;
        }
        dropped
    }
}

/// Simulated network connecting every node and manager.
///
/// Each `send` is encoded, then delivered by its own task after a random delay, so
/// messages on different queues may overtake each other.
pub struct Network {
    endpoints: DashMap<ActorId, Mailbox>,
    max_delay: Duration,
    sent: AtomicU64,
}

impl Network {
    pub fn new(max_delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            endpoints: DashMap::new(),
            max_delay,
            sent: AtomicU64::new(0),
        })
    }

    /// Creates the queues for `actor` and returns the receiving side.
    ///
    /// Registering the same actor twice replaces its mailbox.
    pub fn register(&self, actor: ActorId) -> Inbox {
        let (req_tx, req_rx) = mpsc::unbounded_channel();
        let (res_tx, res_rx) = mpsc::unbounded_channel();
        let (snap_tx, snap_rx) = mpsc::unbounded_channel();

        let previous = self.endpoints.insert(
            actor,
            Mailbox {
                requests: req_tx,
                responses: res_tx,
                snapshots: snap_tx,
            },
        );
        if previous.is_some() {
            tracing::warn!("Re-registered endpoint for {}", actor);
        }

        Inbox {
            requests: req_rx,
            responses: res_rx,
            snapshots: snap_rx,
        }
    }

    pub fn is_registered(&self, actor: ActorId) -> bool {
        self.endpoints.contains_key(&actor)
    }

    /// Total protocol messages handed to the network so far.
    pub fn messages_sent(&self) -> u64 {
        self.sent.load(Ordering::SeqCst)
    }

    /// Queues `msg` for delivery to `to` after a random delay. Fire-and-forget.
    pub fn send(self: &Arc<Self>, to: ActorId, msg: Message) -> Result<()> {
        if !self.endpoints.contains_key(&to) {
            return Err(IvyError::ActorNotFound(to));
        }

        let encoded = msg.encode()?;
        self.sent.fetch_add(1, Ordering::SeqCst);
        tracing::debug!("> [{}] Sending Message of type {} to {}", msg.sender, msg.kind, to);

        let delay = self.jitter();
        let network = self.clone();
        tokio::spawn(async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            network.deliver(to, &encoded);
        });

        Ok(())
    }

    /// Hands a snapshot straight to a manager's snapshot queue.
    pub fn send_snapshot(&self, to: ManagerId, snapshot: Snapshot) -> Result<()> {
        let actor = ActorId::Manager(to);
        let mailbox = self
            .endpoints
            .get(&actor)
            .ok_or(IvyError::ManagerNotFound(to))?;

        mailbox
            .snapshots
            .send(snapshot)
            .map_err(|_| IvyError::ActorStopped(actor))
    }

    fn deliver(&self, to: ActorId, bytes: &[u8]) {
        let msg = match Message::decode(bytes) {
            Ok(msg) => msg,
            Err(e) => {
                tracing::warn!("Failed to decode message for {}: {}", to, e);
                return;
            }
        };

        let Some(mailbox) = self.endpoints.get(&to) else {
            tracing::warn!("Dropping {} for unregistered {}", msg.kind, to);
            return;
        };

        let kind = msg.kind;
        let result = match kind.queue() {
            Queue::Request => mailbox.requests.send(msg),
            Queue::Response => mailbox.responses.send(msg),
        };

        if result.is_err() {
            tracing::warn!("{} is gone, dropped {}", to, kind);
        }
    }

    fn jitter(&self) -> Duration {
        let max_ms = self.max_delay.as_millis() as u64;
        if max_ms == 0 {
            return Duration::ZERO;
        }
        Duration::from_millis(rand::thread_rng().gen_range(0..max_ms))
    }
}
