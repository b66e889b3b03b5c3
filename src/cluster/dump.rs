//! Cluster State Dump
//!
//! A manager's page table joined with what the owners actually hold. The join is
//! read-only and only taken at quiescent points, never on the protocol path.

use crate::error::{IvyError, Result};
use crate::manager::StateDump;
use crate::node::NodeSnapshot;
use crate::protocol::types::{ManagerId, NodeId, OfficeState, PageId, Permission};

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageState {
    pub page: PageId,
    pub owner: NodeId,
    /// What the owner holds for this page; `None` when its cache has no entry.
    pub access: Option<Permission>,
    pub copies: Vec<NodeId>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterDump {
    pub manager: ManagerId,
    pub office: OfficeState,
    pub version: u64,
    pub last_applied_snapshot: Option<u64>,
    pub pages: Vec<PageState>,
}

impl ClusterDump {
    pub fn merge(dump: &StateDump, snapshots: &BTreeMap<NodeId, NodeSnapshot>) -> Self {
        let pages = dump
            .entries
            .iter()
            .map(|entry| PageState {
                page: entry.page,
                owner: entry.owner,
                access: snapshots
                    .get(&entry.owner)
                    .and_then(|node| node.cache.get(&entry.page))
                    .map(|cached| cached.permission),
                copies: entry.copies.clone(),
            })
            .collect();

        Self {
            manager: dump.manager,
            office: dump.office,
            version: dump.version,
            last_applied_snapshot: dump.last_applied_snapshot,
            pages,
        }
    }

    pub fn page(&self, page: PageId) -> Option<&PageState> {
        self.pages.iter().find(|state| state.page == page)
    }
}

impl fmt::Display for ClusterDump {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "**************************************************")?;
        writeln!(f, "  CENTRAL MANAGER {} STATE ", self.manager)?;
        writeln!(f, "**************************************************")?;
        for state in &self.pages {
            let access = state
                .access
                .map(|p| p.to_string())
                .unwrap_or_else(|| "NONE".to_string());
            writeln!(
                f,
                "> Page: {}, Owner: {} :: Access Type: {} , Copies: {:?}",
                state.page,
                state.owner,
                access,
                state.copies.iter().map(|n| n.0).collect::<Vec<_>>()
            )?;
        }
        Ok(())
    }
}

/// Checks the coherence invariants of a quiescent cluster against `dump`.
///
/// - at most one READWRITE holder per page, and it is the recorded owner;
/// - the owner is never in the copy set;
/// - every cache entry belongs to the owner or a copy-set member;
/// - every copy-set member holds an entry.
pub fn verify(dump: &StateDump, snapshots: &BTreeMap<NodeId, NodeSnapshot>) -> Result<()> {
    let mut writers: BTreeMap<PageId, Vec<NodeId>> = BTreeMap::new();
    for (node, snapshot) in snapshots {
        for (page, entry) in &snapshot.cache {
            if entry.permission == Permission::ReadWrite {
                writers.entry(*page).or_default().push(*node);
            }
        }
    }

    for (page, holders) in &writers {
        if holders.len() > 1 {
            return Err(violation(format!(
                "page {} has several READWRITE holders {:?}",
                page, holders
            )));
        }
        let owner = dump.entry(*page).map(|entry| entry.owner);
        if owner != Some(holders[0]) {
            return Err(violation(format!(
                "node {} holds page {} READWRITE but the recorded owner is {:?}",
                holders[0], page, owner
            )));
        }
    }

    for entry in &dump.entries {
        let copies: BTreeSet<NodeId> = entry.copies.iter().copied().collect();
        if copies.contains(&entry.owner) {
            return Err(violation(format!(
                "owner {} of page {} is in its copy set",
                entry.owner, entry.page
            )));
        }
        for member in &copies {
            let held = snapshots
                .get(member)
                .is_some_and(|node| node.cache.contains_key(&entry.page));
            if !held {
                return Err(violation(format!(
                    "node {} is in the copy set of page {} without holding it",
                    member, entry.page
                )));
            }
        }
    }

    for (node, snapshot) in snapshots {
        for page in snapshot.cache.keys() {
            let recorded = dump
                .entry(*page)
                .is_some_and(|entry| entry.owner == *node || entry.copies.contains(node));
            if !recorded {
                return Err(violation(format!(
                    "node {} caches page {} unknown to CM {}",
                    node, page, dump.manager
                )));
            }
        }
    }

    Ok(())
}

fn violation(detail: String) -> IvyError {
    IvyError::CoherenceViolation(detail)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manager::DirectoryEntry;
    use crate::node::{Addressing, CacheEntry, NodeStats};

    fn dump(entries: Vec<DirectoryEntry>) -> StateDump {
        StateDump {
            manager: ManagerId(0),
            office: OfficeState::Incumbent,
            version: 3,
            last_applied_snapshot: None,
            entries,
        }
    }

    fn node(id: u32, cache: &[(u32, Permission)]) -> (NodeId, NodeSnapshot) {
        let cache = cache
            .iter()
            .map(|(page, permission)| {
                (
                    PageId(*page),
                    CacheEntry {
                        permission: *permission,
                        content: "c".into(),
                    },
                )
            })
            .collect();
        let snapshot = NodeSnapshot {
            id: NodeId(id),
            addressing: Addressing::Primary,
            current_manager: ManagerId(0),
            cache,
            stats: NodeStats::default(),
        };
        (NodeId(id), snapshot)
    }

    fn entry(page: u32, owner: u32, copies: &[u32]) -> DirectoryEntry {
        DirectoryEntry {
            page: PageId(page),
            owner: NodeId(owner),
            copies: copies.iter().copied().map(NodeId).collect(),
        }
    }

    #[test]
    fn test_merge_reads_owner_access() {
        let snapshots = BTreeMap::from([
            node(1, &[(1, Permission::ReadOnly)]),
            node(2, &[(1, Permission::ReadOnly)]),
        ]);

        let merged = ClusterDump::merge(&dump(vec![entry(1, 1, &[2])]), &snapshots);

        let page = merged.page(PageId(1)).unwrap();
        assert_eq!(page.access, Some(Permission::ReadOnly));
        assert_eq!(page.copies, vec![NodeId(2)]);
        assert!(merged.to_string().contains("Access Type: READONLY"));
    }

    #[test]
    fn test_coherent_state_passes() {
        let snapshots = BTreeMap::from([
            node(1, &[(1, Permission::ReadOnly)]),
            node(2, &[(1, Permission::ReadOnly), (2, Permission::ReadWrite)]),
            node(3, &[]),
        ]);
        let table = dump(vec![entry(1, 1, &[2]), entry(2, 2, &[])]);

        assert!(verify(&table, &snapshots).is_ok());
    }

    #[test]
    fn test_two_writers_is_a_violation() {
        let snapshots = BTreeMap::from([
            node(1, &[(1, Permission::ReadWrite)]),
            node(2, &[(1, Permission::ReadWrite)]),
        ]);

        let result = verify(&dump(vec![entry(1, 1, &[])]), &snapshots);

        assert!(matches!(result, Err(IvyError::CoherenceViolation(_))));
    }

    #[test]
    fn test_unrecorded_copy_is_a_violation() {
        let snapshots = BTreeMap::from([
            node(1, &[(1, Permission::ReadWrite)]),
            node(3, &[(1, Permission::ReadOnly)]),
        ]);

        let result = verify(&dump(vec![entry(1, 1, &[])]), &snapshots);

        assert!(matches!(result, Err(IvyError::CoherenceViolation(_))));
    }

    #[test]
    fn test_recorded_copy_without_entry_is_a_violation() {
        let snapshots = BTreeMap::from([node(1, &[(1, Permission::ReadWrite)]), node(2, &[])]);

        let result = verify(&dump(vec![entry(1, 1, &[2])]), &snapshots);

        assert!(matches!(result, Err(IvyError::CoherenceViolation(_))));
    }
}
