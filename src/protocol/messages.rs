//! Wire Messages
//!
//! `Message` is the single envelope every protocol step travels in. It is encoded with
//! `bincode` before it enters the simulated network and decoded on delivery.

use super::types::{ActorId, ManagerId, NodeId, PageId};
use crate::error::Result;

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum MessageType {
    // Node -> Manager
    ReadReq,
    WriteReq,
    ReadAck,
    WriteAck,
    InvalidateAck,
    // Manager -> Node
    ReadFwd,
    WriteFwd,
    Invalidate,
    ReadOwnerNil,
    WriteOwnerNil,
    // Node -> Node
    ReadPg,
    WritePg,
}

/// Which of an actor's two inbound queues a message lands in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Queue {
    /// Work the receiving actor must act on (new requests, forwards, invalidations).
    Request,
    /// Replies that complete an exchange the receiving actor is waiting on.
    Response,
}

impl MessageType {
    pub fn queue(self) -> Queue {
        match self {
            MessageType::ReadReq
            | MessageType::WriteReq
            | MessageType::ReadFwd
            | MessageType::WriteFwd
            | MessageType::Invalidate => Queue::Request,
            MessageType::ReadAck
            | MessageType::WriteAck
            | MessageType::InvalidateAck
            | MessageType::ReadOwnerNil
            | MessageType::WriteOwnerNil
            | MessageType::ReadPg
            | MessageType::WritePg => Queue::Response,
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MessageType::ReadReq => "READREQ",
            MessageType::WriteReq => "WRITEREQ",
            MessageType::ReadAck => "READACK",
            MessageType::WriteAck => "WRITEACK",
            MessageType::InvalidateAck => "INVALIDATEACK",
            MessageType::ReadFwd => "READFWD",
            MessageType::WriteFwd => "WRITEFWD",
            MessageType::Invalidate => "INVALIDATE",
            MessageType::ReadOwnerNil => "READ_OWNER_NIL",
            MessageType::WriteOwnerNil => "WRITE_OWNER_NIL",
            MessageType::ReadPg => "READPG",
            MessageType::WritePg => "WRITEPG",
        };
        f.write_str(name)
    }
}

/// One protocol step.
///
/// `requester` is always the node whose read/write started the exchange, so that an
/// owner receiving a forward knows where to ship the page.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Message {
    pub sender: ActorId,
    pub requester: NodeId,
    pub kind: MessageType,
    pub page: PageId,
    pub content: String,
    /// `false` on a READPG/WRITEPG from a node that no longer holds the page, and on
    /// the READACK that closes such an exchange.
    pub held: bool,
}

impl Message {
    pub fn new(kind: MessageType, sender: ActorId, requester: NodeId, page: PageId) -> Self {
        Self {
            sender,
            requester,
            kind,
            page,
            content: String::new(),
            held: true,
        }
    }

    /// Marks the page as missing at the sender.
    pub fn not_held(mut self) -> Self {
        self.held = false;
        self
    }

    pub fn with_content(mut self, content: impl Into<String>) -> Self {
        self.content = content.into();
        self
    }

    pub fn encode(&self) -> Result<Vec<u8>> {
        Ok(bincode::serialize(self)?)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        Ok(bincode::deserialize(bytes)?)
    }
}

/// Full copy of a manager's directory, pushed from the incumbent to its peer.
///
/// Replication is last-snapshot-wins: the receiver replaces its state wholesale.
/// `seq` grows by one per snapshot a replica sends; `version` is the sender's count
/// of serviced requests when the snapshot was taken.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Snapshot {
    pub sender: ManagerId,
    pub seq: u64,
    pub version: u64,
    pub nodes: BTreeSet<NodeId>,
    pub page_owner: BTreeMap<PageId, NodeId>,
    pub page_copies: BTreeMap<PageId, BTreeSet<NodeId>>,
}
