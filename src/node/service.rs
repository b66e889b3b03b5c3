//! Node Actor
//!
//! A node's single receive loop owns its page cache. It multiplexes four inputs:
//! - **ops**: `read`/`write` calls from the driver, accepted one at a time;
//! - **control**: manager death notices and inspection, always accepted;
//! - **requests**: forwards and invalidations from the manager;
//! - **responses**: the grant that completes the operation in flight.
//!
//! Manager-directed requests are served even while the node waits for its own grant,
//! since the manager may need this node's cooperation (an invalidation of its own
//! read copy, or a forward to itself) to complete that very exchange.

use super::cache::PageCache;
use super::handle::{
    NodeControl, NodeHandle, NodeOp, NodeSnapshot, NodeStats, PageRead, PageWrite,
};
use super::routing::ManagerRoute;
use crate::error::{IvyError, Result};
use crate::network::{Inbox, Network};
use crate::protocol::messages::{Message, MessageType};
use crate::protocol::types::{ActorId, ManagerId, NodeId, PageId, Permission};

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;

enum PendingReply {
    Read(oneshot::Sender<Result<PageRead>>),
    Write {
        content: String,
        reply: oneshot::Sender<Result<PageWrite>>,
    },
}

/// The operation waiting for its grant.
struct PendingOp {
    page: PageId,
    /// Manager the request went to; the closing acknowledgement goes there too.
    manager: ManagerId,
    deadline: Instant,
    reply: PendingReply,
}

pub struct Node {
    id: NodeId,
    cache: PageCache,
    route: ManagerRoute,
    pages: BTreeSet<PageId>,
    network: Arc<Network>,
    inbox: Inbox,
    ops: mpsc::UnboundedReceiver<NodeOp>,
    control: mpsc::UnboundedReceiver<NodeControl>,
    reply_timeout: Duration,
    pending: Option<PendingOp>,
    stats: NodeStats,
}

impl Node {
    pub fn new(
        id: NodeId,
        route: ManagerRoute,
        pages: BTreeSet<PageId>,
        network: Arc<Network>,
        reply_timeout: Duration,
    ) -> (Self, NodeHandle) {
        let inbox = network.register(ActorId::Node(id));
        let (ops_tx, ops_rx) = mpsc::unbounded_channel();
        let (control_tx, control_rx) = mpsc::unbounded_channel();

        let node = Self {
            id,
            cache: PageCache::new(),
            route,
            pages,
            network,
            inbox,
            ops: ops_rx,
            control: control_rx,
            reply_timeout,
            pending: None,
            stats: NodeStats::default(),
        };

        (node, NodeHandle::new(id, ops_tx, control_tx))
    }

    fn actor(&self) -> ActorId {
        ActorId::Node(self.id)
    }

    /// Runs until every handle is dropped.
    pub async fn run(mut self) {
        tracing::debug!("[Node {}] listening, addressing CM {}", self.id, self.route.current());

        loop {
            let idle = self.pending.is_none();
            let deadline = self
                .pending
                .as_ref()
                .map(|pending| pending.deadline)
                .unwrap_or_else(|| Instant::now() + self.reply_timeout);

            tokio::select! {
                Some(control) = self.control.recv() => self.handle_control(control),

                Some(msg) = self.inbox.requests.recv() => self.handle_manager_message(msg),

                Some(msg) = self.inbox.responses.recv() => self.handle_response(msg),

                op = self.ops.recv(), if idle => match op {
                    Some(op) => self.start_op(op),
                    None => break,
                },

                _ = tokio::time::sleep_until(deadline), if !idle => self.expire_pending(),
            }
        }

        tracing::debug!("[Node {}] stopped", self.id);
    }

    fn handle_control(&mut self, control: NodeControl) {
        match control {
            NodeControl::ManagerDied { manager, reply } => {
                let result = self.route.on_peer_death(manager);
                match &result {
                    Ok(next) => tracing::info!(
                        "> [Node {}] notified of CM {}'s death, now addressing CM {}",
                        self.id,
                        manager,
                        next
                    ),
                    Err(e) => tracing::warn!("> [Node {}] {}", self.id, e),
                }
                let _ = reply.send(result);
            }
            NodeControl::Inspect { reply } => {
                let _ = reply.send(self.snapshot());
            }
        }
    }

    fn snapshot(&self) -> NodeSnapshot {
        NodeSnapshot {
            id: self.id,
            addressing: self.route.addressing(),
            current_manager: self.route.current(),
            cache: self.cache.to_map(),
            stats: self.stats.clone(),
        }
    }

    // ------------------------------------------------------------
    // executeRead / executeWrite
    // ------------------------------------------------------------

    fn start_op(&mut self, op: NodeOp) {
        match op {
            NodeOp::Read { page, reply } => {
                if let Err(e) = self.check_page(page) {
                    let _ = reply.send(Err(e));
                    return;
                }

                if let Some(entry) = self.cache.get(page) {
                    tracing::debug!(
                        "> [Node {}] Reading cached page {} ({})",
                        self.id,
                        page,
                        entry.permission
                    );
                    self.stats.cache_hits += 1;
                    let _ = reply.send(Ok(PageRead::Cached(entry.content.clone())));
                    return;
                }

                match self.request(MessageType::ReadReq, page) {
                    Ok(manager) => self.park(page, manager, PendingReply::Read(reply)),
                    Err(e) => {
                        let _ = reply.send(Err(e));
                    }
                }
            }

            NodeOp::Write {
                page,
                content,
                reply,
            } => {
                if let Err(e) = self.check_page(page) {
                    let _ = reply.send(Err(e));
                    return;
                }

                if let Some(entry) = self.cache.get(page)
                    && entry.permission == Permission::ReadWrite
                {
                    if entry.content == content {
                        tracing::debug!(
                            "> [Node {}] page {} already holds this content",
                            self.id,
                            page
                        );
                        let _ = reply.send(Ok(PageWrite::Unchanged));
                        return;
                    }

                    self.cache.write_owned(page, content);
                    self.stats.local_writes += 1;
                    tracing::debug!("> [Node {}] WRITEACK (local) for owned page {}", self.id, page);
                    let _ = reply.send(Ok(PageWrite::Local));
                    return;
                }

                match self.request(MessageType::WriteReq, page) {
                    Ok(manager) => {
                        self.park(page, manager, PendingReply::Write { content, reply })
                    }
                    Err(e) => {
                        let _ = reply.send(Err(e));
                    }
                }
            }
        }
    }

    fn check_page(&self, page: PageId) -> Result<()> {
        if self.pages.contains(&page) {
            Ok(())
        } else {
            Err(IvyError::PageNotFound(page))
        }
    }

    /// Sends a READREQ/WRITEREQ to the current manager and returns which one.
    fn request(&mut self, kind: MessageType, page: PageId) -> Result<ManagerId> {
        let manager = self.route.current();
        let msg = Message::new(kind, self.actor(), self.id, page);
        self.network.send(ActorId::Manager(manager), msg)?;
        self.stats.remote_ops += 1;
        Ok(manager)
    }

    fn park(&mut self, page: PageId, manager: ManagerId, reply: PendingReply) {
        self.pending = Some(PendingOp {
            page,
            manager,
            deadline: Instant::now() + self.reply_timeout,
            reply,
        });
    }

    fn expire_pending(&mut self) {
        let Some(pending) = self.pending.take() else {
            return;
        };

        self.stats.timeouts += 1;
        tracing::error!(
            "[Node {}] no grant from CM {} for page {}",
            self.id,
            pending.manager,
            pending.page
        );

        let actor = self.actor();
        match pending.reply {
            PendingReply::Read(reply) => {
                let _ = reply.send(Err(IvyError::ReplyTimeout {
                    actor,
                    expected: MessageType::ReadPg,
                    page: pending.page,
                }));
            }
            PendingReply::Write { reply, .. } => {
                let _ = reply.send(Err(IvyError::ReplyTimeout {
                    actor,
                    expected: MessageType::WritePg,
                    page: pending.page,
                }));
            }
        }
    }

    // ------------------------------------------------------------
    // Grants
    // ------------------------------------------------------------

    fn handle_response(&mut self, msg: Message) {
        tracing::debug!(
            "> [Node {}] Received Message of type {} for page {} from {}",
            self.id,
            msg.kind,
            msg.page,
            msg.sender
        );

        let matches = self.pending.as_ref().is_some_and(|pending| {
            pending.page == msg.page
                && matches!(
                    (&pending.reply, msg.kind),
                    (PendingReply::Read(_), MessageType::ReadOwnerNil | MessageType::ReadPg)
                        | (
                            PendingReply::Write { .. },
                            MessageType::WriteOwnerNil | MessageType::WritePg
                        )
                )
        });

        if !matches {
            self.stats.stale_replies += 1;
            tracing::warn!(
                "[Node {}] discarding {} for page {} with no matching request",
                self.id,
                msg.kind,
                msg.page
            );
            return;
        }
        let Some(pending) = self.pending.take() else {
            return;
        };

        let page = pending.page;
        match pending.reply {
            PendingReply::Read(reply) => {
                if msg.kind == MessageType::ReadPg && !msg.held {
                    tracing::warn!(
                        "[Node {}] {} no longer holds page {}, nothing cached",
                        self.id,
                        msg.sender,
                        page
                    );
                    let ack = self.acknowledge(MessageType::ReadAck, page, pending.manager, false);
                    let _ = reply.send(ack.and(Err(IvyError::PageNotHeld {
                        page,
                        holder: msg.sender,
                    })));
                    return;
                }

                let outcome = if msg.kind == MessageType::ReadPg {
                    self.cache
                        .install(page, Permission::ReadOnly, msg.content.clone());
                    PageRead::Fetched(msg.content)
                } else {
                    PageRead::Unowned
                };
                let ack = self.acknowledge(MessageType::ReadAck, page, pending.manager, true);
                let _ = reply.send(ack.map(|_| outcome));
            }
            PendingReply::Write { content, reply } => {
                if !msg.held {
                    tracing::warn!(
                        "[Node {}] {} no longer holds page {}, writing without previous content",
                        self.id,
                        msg.sender,
                        page
                    );
                }
                // Previous content is discarded: the new writer's content wins.
                self.cache.install(page, Permission::ReadWrite, content);
                tracing::debug!("> [Node {}] Writing to page {}", self.id, page);
                let ack = self.acknowledge(MessageType::WriteAck, page, pending.manager, true);
                let _ = reply.send(ack.map(|_| PageWrite::Granted));
            }
        }
    }

    fn acknowledge(
        &self,
        kind: MessageType,
        page: PageId,
        manager: ManagerId,
        held: bool,
    ) -> Result<()> {
        let mut msg = Message::new(kind, self.actor(), self.id, page);
        if !held {
            msg = msg.not_held();
        }
        self.network.send(ActorId::Manager(manager), msg)
    }

    // ------------------------------------------------------------
    // Manager-directed messages
    // ------------------------------------------------------------

    fn handle_manager_message(&mut self, msg: Message) {
        tracing::debug!(
            "> [Node {}] Received Message of type {} for page {} from {}",
            self.id,
            msg.kind,
            msg.page,
            msg.sender
        );

        let result = match msg.kind {
            MessageType::ReadFwd => self.handle_read_fwd(&msg),
            MessageType::WriteFwd => self.handle_write_fwd(&msg),
            MessageType::Invalidate => self.handle_invalidate(&msg),
            other => {
                tracing::warn!("[Node {}] unexpected {} on request queue", self.id, other);
                Ok(())
            }
        };

        if let Err(e) = result {
            tracing::error!(
                "[Node {}] failed to handle {} for page {}: {}",
                self.id,
                msg.kind,
                msg.page,
                e
            );
        }
    }

    fn handle_read_fwd(&mut self, msg: &Message) -> Result<()> {
        let page = Message::new(MessageType::ReadPg, self.actor(), msg.requester, msg.page);
        let page = match self.cache.downgrade(msg.page) {
            Some(entry) => page.with_content(entry.content.clone()),
            None => {
                tracing::warn!(
                    "[Node {}] asked to share page {} it does not hold",
                    self.id,
                    msg.page
                );
                page.not_held()
            }
        };
        self.network.send(ActorId::Node(msg.requester), page)
    }

    fn handle_write_fwd(&mut self, msg: &Message) -> Result<()> {
        let page = Message::new(MessageType::WritePg, self.actor(), msg.requester, msg.page);
        let page = match self.cache.remove(msg.page) {
            Some(entry) => page.with_content(entry.content),
            None => {
                tracing::warn!(
                    "[Node {}] asked to relinquish page {} it does not hold",
                    self.id,
                    msg.page
                );
                page.not_held()
            }
        };
        self.network.send(ActorId::Node(msg.requester), page)
    }

    fn handle_invalidate(&mut self, msg: &Message) -> Result<()> {
        self.cache.remove(msg.page);

        let manager = match msg.sender {
            ActorId::Manager(id) => id,
            ActorId::Node(_) => self.route.current(),
        };
        let ack = Message::new(MessageType::InvalidateAck, self.actor(), msg.requester, msg.page);
        self.network.send(ActorId::Manager(manager), ack)
    }
}
