//! Central Manager Actor
//!
//! Serializes every read/write request for the page universe. A request is serviced
//! to completion (all forwards, invalidations and acknowledgements) before the next
//! one is taken off the queue, which totally orders the grants of this manager.
//!
//! ## Loop Inputs (in priority order)
//! - **Snapshots** from the peer replica: replace the directory wholesale.
//! - **Control**: kill, dump, status, sync-now.
//! - **Requests** (`READREQ` / `WRITEREQ`) from nodes.
//! - **Sync timer**: push a snapshot to the peer while incumbent.

use super::handle::{ManagerControl, ManagerHandle, ManagerStatus};
use super::state::{Directory, StateDump};
use crate::error::{IvyError, Result};
use crate::network::{Inbox, Network};
use crate::protocol::messages::{Message, MessageType, Snapshot};
use crate::protocol::types::{ActorId, ManagerId, NodeId, OfficeState, PageId};

use std::collections::{BTreeSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{Instant, MissedTickBehavior};

#[derive(Debug, Clone, Copy)]
pub struct ManagerTimings {
    pub sync_interval: Duration,
    pub ack_timeout: Duration,
}

pub struct CentralManager {
    id: ManagerId,
    peer: ManagerId,
    office: OfficeState,
    directory: Directory,
    network: Arc<Network>,
    inbox: Inbox,
    control: mpsc::UnboundedReceiver<ManagerControl>,
    timings: ManagerTimings,
    /// Controls received mid-exchange, answered once the exchange completes.
    deferred: VecDeque<ManagerControl>,
    pending_kill: Option<oneshot::Sender<StateDump>>,
    version: u64,
    requests_served: u64,
    requests_failed: u64,
    snapshot_seq: u64,
    last_applied_snapshot: Option<u64>,
}

impl CentralManager {
    pub fn new(
        id: ManagerId,
        peer: ManagerId,
        office: OfficeState,
        directory: Directory,
        network: Arc<Network>,
        timings: ManagerTimings,
    ) -> (Self, ManagerHandle) {
        let inbox = network.register(ActorId::Manager(id));
        let (control_tx, control_rx) = mpsc::unbounded_channel();

        let manager = Self {
            id,
            peer,
            office,
            directory,
            network,
            inbox,
            control: control_rx,
            timings,
            deferred: VecDeque::new(),
            pending_kill: None,
            version: 0,
            requests_served: 0,
            requests_failed: 0,
            snapshot_seq: 0,
            last_applied_snapshot: None,
        };

        (manager, ManagerHandle::new(id, control_tx))
    }

    pub fn id(&self) -> ManagerId {
        self.id
    }

    pub fn office(&self) -> OfficeState {
        self.office
    }

    fn actor(&self) -> ActorId {
        ActorId::Manager(self.id)
    }

    /// Runs the receive loop until killed, then hands the replica back so it can be
    /// restarted later with its queues intact.
    pub async fn run(mut self) -> Self {
        tracing::info!("[CM {}] listening as {}", self.id, self.office);

        let start = Instant::now() + self.timings.sync_interval;
        let mut sync = tokio::time::interval_at(start, self.timings.sync_interval);
        sync.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;

                Some(snapshot) = self.inbox.snapshots.recv() => {
                    self.apply_snapshot(snapshot);
                }

                Some(control) = self.control.recv() => {
                    if !self.handle_control(control) {
                        break;
                    }
                }

                Some(stray) = self.inbox.responses.recv() => {
                    tracing::warn!(
                        "[CM {}] discarding {} from {} outside any exchange",
                        self.id,
                        stray.kind,
                        stray.sender
                    );
                }

                Some(request) = self.inbox.requests.recv() => {
                    self.serve(request).await;

                    if let Some(reply) = self.pending_kill.take() {
                        self.go_down(reply);
                        break;
                    }
                    if !self.drain_deferred() {
                        break;
                    }
                }

                _ = sync.tick() => {
                    self.periodic_sync();
                }
            }
        }

        self
    }

    /// Prepares a killed replica to listen again. Protocol traffic that queued up while
    /// it was down is lost with the crash; snapshots are kept and applied on restart.
    pub fn prepare_restart(&mut self) {
        let dropped = self.inbox.drain_protocol();
        if dropped > 0 {
            tracing::warn!(
                "[CM {}] discarded {} messages received while down",
                self.id,
                dropped
            );
        }
        self.deferred.clear();
        self.pending_kill = None;
        self.office = OfficeState::Overthrown;
        tracing::info!("[CM {}] restarting as backup", self.id);
    }

    pub fn state_dump(&self) -> StateDump {
        StateDump {
            manager: self.id,
            office: self.office,
            version: self.version,
            last_applied_snapshot: self.last_applied_snapshot,
            entries: self.directory.entries(),
        }
    }

    pub fn status(&self) -> ManagerStatus {
        ManagerStatus {
            id: self.id,
            office: self.office,
            version: self.version,
            requests_served: self.requests_served,
            requests_failed: self.requests_failed,
            snapshots_sent: self.snapshot_seq,
            last_applied_snapshot: self.last_applied_snapshot,
        }
    }

    /// Returns `false` when the loop must stop.
    fn handle_control(&mut self, control: ManagerControl) -> bool {
        match control {
            ManagerControl::Kill { reply } => {
                self.go_down(reply);
                return false;
            }
            ManagerControl::Dump { reply } => {
                let _ = reply.send(self.state_dump());
            }
            ManagerControl::Status { reply } => {
                let _ = reply.send(self.status());
            }
            ManagerControl::SyncNow { reply } => {
                let _ = reply.send(self.sync_if_incumbent());
            }
        }
        true
    }

    fn drain_deferred(&mut self) -> bool {
        while let Some(control) = self.deferred.pop_front() {
            if !self.handle_control(control) {
                return false;
            }
        }
        true
    }

    fn go_down(&mut self, reply: oneshot::Sender<StateDump>) {
        self.office = OfficeState::Overthrown;
        let dump = self.state_dump();
        tracing::info!("[CM {}] killed\n{}", self.id, dump);
        let _ = reply.send(dump);
    }

    async fn serve(&mut self, request: Message) {
        tracing::debug!(
            "> [CM {}] Received Message of type {} from {}",
            self.id,
            request.kind,
            request.sender
        );

        if self.office == OfficeState::Overthrown {
            tracing::info!("[CM {}] serving requests, assuming incumbency", self.id);
            self.office = OfficeState::Incumbent;
        }

        let result = match request.kind {
            MessageType::ReadReq => self.handle_read_req(request.page, request.requester).await,
            MessageType::WriteReq => self.handle_write_req(request.page, request.requester).await,
            other => {
                tracing::warn!("[CM {}] unexpected {} on request queue", self.id, other);
                return;
            }
        };

        match result {
            Ok(()) => {
                self.requests_served += 1;
                self.version += 1;
                debug_assert!(self.directory.check_invariants().is_ok());
            }
            Err(e) => {
                self.requests_failed += 1;
                tracing::error!(
                    "[CM {}] failed to serve {} for page {} from node {}: {}",
                    self.id,
                    request.kind,
                    request.page,
                    request.requester,
                    e
                );
            }
        }
    }

    async fn handle_read_req(&mut self, page: PageId, requester: NodeId) -> Result<()> {
        self.directory.validate(page, requester)?;

        let Some(owner) = self.directory.owner(page) else {
            // Untouched page: nothing to fetch, and reading does not create ownership.
            self.send(requester, MessageType::ReadOwnerNil, requester, page)?;
            self.await_reply(MessageType::ReadAck, page).await?;
            return Ok(());
        };

        // Recorded before the owner ships the page.
        self.directory.add_copy(page, requester);
        self.send(owner, MessageType::ReadFwd, requester, page)?;
        let ack = self.await_reply(MessageType::ReadAck, page).await?;

        if !ack.held {
            self.directory.remove_copy(page, requester);
            return Err(IvyError::PageNotHeld {
                page,
                holder: ActorId::Node(owner),
            });
        }

        Ok(())
    }

    async fn handle_write_req(&mut self, page: PageId, requester: NodeId) -> Result<()> {
        self.directory.validate(page, requester)?;

        let Some(owner) = self.directory.owner(page) else {
            self.directory.claim(page, requester);
            self.send(requester, MessageType::WriteOwnerNil, requester, page)?;
            self.await_reply(MessageType::WriteAck, page).await?;
            return Ok(());
        };

        let mut outstanding: BTreeSet<NodeId> = self.directory.copy_set(page);
        for holder in &outstanding {
            self.send(*holder, MessageType::Invalidate, requester, page)?;
        }

        // Barrier: every copy is gone before the owner gives the page up.
        while !outstanding.is_empty() {
            let ack = self.await_reply(MessageType::InvalidateAck, page).await?;
            match ack.sender {
                ActorId::Node(holder) if outstanding.remove(&holder) => {}
                other => {
                    tracing::warn!(
                        "[CM {}] unexpected INVALIDATEACK for page {} from {}",
                        self.id,
                        page,
                        other
                    );
                }
            }
        }

        self.send(owner, MessageType::WriteFwd, requester, page)?;
        self.await_reply(MessageType::WriteAck, page).await?;
        self.directory.transfer(page, requester);

        Ok(())
    }

    fn send(&self, to: NodeId, kind: MessageType, requester: NodeId, page: PageId) -> Result<()> {
        let msg = Message::new(kind, self.actor(), requester, page);
        self.network.send(ActorId::Node(to), msg)
    }

    /// Blocks the exchange until the expected reply arrives.
    ///
    /// Replies for other pages or types are leftovers of abandoned exchanges and are
    /// dropped. A kill aborts the wait; other controls are deferred.
    async fn await_reply(&mut self, expected: MessageType, page: PageId) -> Result<Message> {
        let deadline = Instant::now() + self.timings.ack_timeout;

        loop {
            tokio::select! {
                biased;

                Some(control) = self.control.recv() => match control {
                    ManagerControl::Kill { reply } => {
                        self.pending_kill = Some(reply);
                        return Err(IvyError::ExchangeAbandoned { manager: self.id, page });
                    }
                    other => self.deferred.push_back(other),
                },

                reply = self.inbox.responses.recv() => match reply {
                    Some(msg) if msg.kind == expected && msg.page == page => {
                        tracing::debug!(
                            "> [CM {}] Received Message of type {} from {}",
                            self.id,
                            msg.kind,
                            msg.sender
                        );
                        return Ok(msg);
                    }
                    Some(msg) => {
                        tracing::warn!(
                            "[CM {}] discarding stale {} for page {} from {}",
                            self.id,
                            msg.kind,
                            msg.page,
                            msg.sender
                        );
                    }
                    None => return Err(IvyError::ActorStopped(self.actor())),
                },

                _ = tokio::time::sleep_until(deadline) => {
                    return Err(IvyError::ReplyTimeout {
                        actor: self.actor(),
                        expected,
                        page,
                    });
                }
            }
        }
    }

    fn apply_snapshot(&mut self, snapshot: Snapshot) {
        self.office = OfficeState::Overthrown;
        self.directory.restore(&snapshot);
        self.version = snapshot.version;
        self.last_applied_snapshot = Some(snapshot.seq);
        tracing::debug!(
            "> [Backup CM {}] Synced snapshot #{} (version {}) from CM {}",
            self.id,
            snapshot.seq,
            snapshot.version,
            snapshot.sender
        );
    }

    fn periodic_sync(&mut self) {
        match self.sync_if_incumbent() {
            Ok(Some(_)) => {}
            Ok(None) => {
                tracing::trace!(
                    "> [CM {}] Waiting for snapshot from incumbent CM {}",
                    self.id,
                    self.peer
                );
            }
            Err(e) => {
                tracing::warn!("[CM {}] snapshot push to CM {} failed: {}", self.id, self.peer, e);
            }
        }
    }

    fn sync_if_incumbent(&mut self) -> Result<Option<u64>> {
        if self.office != OfficeState::Incumbent {
            return Ok(None);
        }

        let seq = self.snapshot_seq + 1;
        let snapshot = self.directory.snapshot(self.id, seq, self.version);
        self.network.send_snapshot(self.peer, snapshot)?;
        self.snapshot_seq = seq;

        tracing::debug!(
            "> [CM {}] Sending snapshot #{} (version {}) to backup CM {}",
            self.id,
            seq,
            self.version,
            self.peer
        );
        Ok(Some(seq))
    }
}
