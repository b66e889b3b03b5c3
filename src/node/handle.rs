use super::cache::CacheEntry;
use super::routing::Addressing;
use crate::error::{IvyError, Result};
use crate::protocol::types::{ActorId, ManagerId, NodeId, PageId};

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tokio::sync::{mpsc, oneshot};

/// Outcome of `executeRead`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageRead {
    /// Served from the local cache, no network traffic.
    Cached(String),
    /// Fetched from the owner through the manager.
    Fetched(String),
    /// The page has never been written; nothing is cached.
    Unowned,
}

impl PageRead {
    pub fn content(&self) -> Option<&str> {
        match self {
            PageRead::Cached(content) | PageRead::Fetched(content) => Some(content),
            PageRead::Unowned => None,
        }
    }
}

/// Outcome of `executeWrite`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageWrite {
    /// Already owned with identical content.
    Unchanged,
    /// Already owned, content replaced locally.
    Local,
    /// Ownership granted by the manager.
    Granted,
}

/// Operations that need a manager round trip; one at a time per node.
#[derive(Debug)]
pub enum NodeOp {
    Read {
        page: PageId,
        reply: oneshot::Sender<Result<PageRead>>,
    },
    Write {
        page: PageId,
        content: String,
        reply: oneshot::Sender<Result<PageWrite>>,
    },
}

/// Instructions honoured even while an operation is in flight.
#[derive(Debug)]
pub enum NodeControl {
    ManagerDied {
        manager: ManagerId,
        reply: oneshot::Sender<Result<ManagerId>>,
    },
    Inspect {
        reply: oneshot::Sender<NodeSnapshot>,
    },
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NodeStats {
    pub cache_hits: u64,
    pub local_writes: u64,
    pub remote_ops: u64,
    pub timeouts: u64,
    pub stale_replies: u64,
}

/// Read-only view of a node, for dumps and verification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeSnapshot {
    pub id: NodeId,
    pub addressing: Addressing,
    pub current_manager: ManagerId,
    pub cache: BTreeMap<PageId, CacheEntry>,
    pub stats: NodeStats,
}

#[derive(Debug, Clone)]
pub struct NodeHandle {
    id: NodeId,
    ops: mpsc::UnboundedSender<NodeOp>,
    control: mpsc::UnboundedSender<NodeControl>,
}

impl NodeHandle {
    pub(crate) fn new(
        id: NodeId,
        ops: mpsc::UnboundedSender<NodeOp>,
        control: mpsc::UnboundedSender<NodeControl>,
    ) -> Self {
        Self { id, ops, control }
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub async fn read(&self, page: PageId) -> Result<PageRead> {
        let (reply, rx) = oneshot::channel();
        self.ops
            .send(NodeOp::Read { page, reply })
            .map_err(|_| self.stopped())?;
        rx.await.map_err(|_| self.stopped())?
    }

    pub async fn write(&self, page: PageId, content: impl Into<String>) -> Result<PageWrite> {
        let (reply, rx) = oneshot::channel();
        let op = NodeOp::Write {
            page,
            content: content.into(),
            reply,
        };
        self.ops.send(op).map_err(|_| self.stopped())?;
        rx.await.map_err(|_| self.stopped())?
    }

    pub async fn notify_manager_death(&self, manager: ManagerId) -> Result<ManagerId> {
        let (reply, rx) = oneshot::channel();
        self.control
            .send(NodeControl::ManagerDied { manager, reply })
            .map_err(|_| self.stopped())?;
        rx.await.map_err(|_| self.stopped())?
    }

    pub async fn inspect(&self) -> Result<NodeSnapshot> {
        let (reply, rx) = oneshot::channel();
        self.control
            .send(NodeControl::Inspect { reply })
            .map_err(|_| self.stopped())?;
        rx.await.map_err(|_| self.stopped())
    }

    fn stopped(&self) -> IvyError {
        IvyError::ActorStopped(ActorId::Node(self.id))
    }
}
