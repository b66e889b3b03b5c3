use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of a client/cache node. Nodes are numbered from 1.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub u32);

/// Identifier of a central manager replica (0 = primary, 1 = backup at startup).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ManagerId(pub u32);

/// Identifier of a shared page. Pages are numbered from 1.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PageId(pub u32);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for ManagerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for PageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Anything that owns a mailbox on the simulated network.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ActorId {
    Manager(ManagerId),
    Node(NodeId),
}

impl fmt::Display for ActorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActorId::Manager(id) => write!(f, "CM {}", id),
            ActorId::Node(id) => write!(f, "Node {}", id),
        }
    }
}

/// Access a node holds on a cached page.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum Permission {
    ReadOnly,
    ReadWrite,
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Permission::ReadOnly => write!(f, "READONLY"),
            Permission::ReadWrite => write!(f, "READWRITE"),
        }
    }
}

/// Advisory role of a manager replica.
///
/// Only decides whether a replica *pushes* snapshots. Whether it *serves* requests
/// depends entirely on which replica the nodes currently address.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum OfficeState {
    Incumbent,
    Overthrown,
}

impl fmt::Display for OfficeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OfficeState::Incumbent => write!(f, "INCUMBENT"),
            OfficeState::Overthrown => write!(f, "OVERTHROWN"),
        }
    }
}
