//! Page Directory
//!
//! The coherence metadata a central manager is the authority for: who owns each page
//! and which nodes hold read-only copies. Pure state with no I/O, so the invariants
//! can be checked directly.

use crate::error::{IvyError, Result};
use crate::protocol::messages::Snapshot;
use crate::protocol::types::{ManagerId, NodeId, OfficeState, PageId};

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

#[derive(Debug, Clone)]
pub struct Directory {
    nodes: BTreeSet<NodeId>,
    pages: BTreeSet<PageId>,
    page_owner: BTreeMap<PageId, NodeId>,
    page_copies: BTreeMap<PageId, BTreeSet<NodeId>>,
}

impl Directory {
    pub fn new(nodes: impl IntoIterator<Item = NodeId>, pages: impl IntoIterator<Item = PageId>) -> Self {
        Self {
            nodes: nodes.into_iter().collect(),
            pages: pages.into_iter().collect(),
            page_owner: BTreeMap::new(),
            page_copies: BTreeMap::new(),
        }
    }

    /// Fails with an explicit not-found error for ids outside the fixed universe.
    pub fn validate(&self, page: PageId, node: NodeId) -> Result<()> {
        if !self.pages.contains(&page) {
            return Err(IvyError::PageNotFound(page));
        }
        if !self.nodes.contains(&node) {
            return Err(IvyError::NodeNotFound(node));
        }
        Ok(())
    }

    pub fn owner(&self, page: PageId) -> Option<NodeId> {
        self.page_owner.get(&page).copied()
    }

    pub fn copy_set(&self, page: PageId) -> BTreeSet<NodeId> {
        self.page_copies.get(&page).cloned().unwrap_or_default()
    }

    /// Adds `node` to the copy set of `page`. Idempotent; the owner is never added.
    /// Returns `true` if the set changed.
    pub fn add_copy(&mut self, page: PageId, node: NodeId) -> bool {
        if self.owner(page) == Some(node) {
            return false;
        }
        self.page_copies.entry(page).or_default().insert(node)
    }

    /// Drops `node` from the copy set of `page`. Returns `true` if it was a member.
    pub fn remove_copy(&mut self, page: PageId, node: NodeId) -> bool {
        self.page_copies
            .get_mut(&page)
            .is_some_and(|copies| copies.remove(&node))
    }

    /// Records the first owner of an untouched page.
    pub fn claim(&mut self, page: PageId, node: NodeId) {
        self.page_owner.insert(page, node);
        if let Some(copies) = self.page_copies.get_mut(&page) {
            copies.remove(&node);
        }
    }

    /// Hands `page` to `new_owner` and empties its copy set.
    pub fn transfer(&mut self, page: PageId, new_owner: NodeId) {
        self.page_owner.insert(page, new_owner);
        self.page_copies.insert(page, BTreeSet::new());
    }

    pub fn nodes(&self) -> &BTreeSet<NodeId> {
        &self.nodes
    }

    pub fn snapshot(&self, sender: ManagerId, seq: u64, version: u64) -> Snapshot {
        Snapshot {
            sender,
            seq,
            version,
            nodes: self.nodes.clone(),
            page_owner: self.page_owner.clone(),
            page_copies: self.page_copies.clone(),
        }
    }

    /// Replaces all metadata with the snapshot's. The page universe is fixed and kept.
    pub fn restore(&mut self, snapshot: &Snapshot) {
        self.nodes = snapshot.nodes.clone();
        self.page_owner = snapshot.page_owner.clone();
        self.page_copies = snapshot.page_copies.clone();
    }

    /// One row per owned page, in page order.
    pub fn entries(&self) -> Vec<DirectoryEntry> {
        self.page_owner
            .iter()
            .map(|(page, owner)| DirectoryEntry {
                page: *page,
                owner: *owner,
                copies: self.copy_set(*page).into_iter().collect(),
            })
            .collect()
    }

    /// Owner and copy set must be disjoint, and copies imply an owner.
    pub fn check_invariants(&self) -> Result<()> {
        for (page, copies) in &self.page_copies {
            match self.page_owner.get(page) {
                Some(owner) if copies.contains(owner) => {
                    return Err(IvyError::CoherenceViolation(format!(
                        "owner {} of page {} is also in its copy set",
                        owner, page
                    )));
                }
                None if !copies.is_empty() => {
                    return Err(IvyError::CoherenceViolation(format!(
                        "page {} has copies {:?} but no owner",
                        page, copies
                    )));
                }
                _ => {}
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectoryEntry {
    pub page: PageId,
    pub owner: NodeId,
    pub copies: Vec<NodeId>,
}

/// A manager's page table as printed on shutdown or on demand.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateDump {
    pub manager: ManagerId,
    pub office: OfficeState,
    pub version: u64,
    pub last_applied_snapshot: Option<u64>,
    pub entries: Vec<DirectoryEntry>,
}

impl StateDump {
    pub fn entry(&self, page: PageId) -> Option<&DirectoryEntry> {
        self.entries.iter().find(|entry| entry.page == page)
    }

    pub fn owner(&self, page: PageId) -> Result<NodeId> {
        self.entry(page)
            .map(|entry| entry.owner)
            .ok_or(IvyError::PageNotFound(page))
    }
}

impl fmt::Display for StateDump {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "**************************************************")?;
        writeln!(f, "  CENTRAL MANAGER {} STATE ({})", self.manager, self.office)?;
        writeln!(f, "**************************************************")?;
        for entry in &self.entries {
            writeln!(
                f,
                "> Page: {}, Owner: {} :: Copies: {:?}",
                entry.page,
                entry.owner,
                entry.copies.iter().map(|n| n.0).collect::<Vec<_>>()
            )?;
        }
        Ok(())
    }
}
