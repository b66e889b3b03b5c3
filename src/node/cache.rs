use crate::protocol::types::{PageId, Permission};

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub permission: Permission,
    pub content: String,
}

/// A node's local copies of pages.
#[derive(Debug, Default)]
pub struct PageCache {
    entries: HashMap<PageId, CacheEntry>,
}

impl PageCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, page: PageId) -> Option<&CacheEntry> {
        self.entries.get(&page)
    }

    pub fn install(&mut self, page: PageId, permission: Permission, content: String) {
        self.entries.insert(page, CacheEntry { permission, content });
    }

    /// READWRITE -> READONLY. Returns the (possibly unchanged) entry.
    pub fn downgrade(&mut self, page: PageId) -> Option<&CacheEntry> {
        let entry = self.entries.get_mut(&page)?;
        entry.permission = Permission::ReadOnly;
        Some(entry)
    }

    /// Overwrites the content of a page this node already owns for writing.
    /// Returns `false` if the node does not hold READWRITE.
    pub fn write_owned(&mut self, page: PageId, content: String) -> bool {
        match self.entries.get_mut(&page) {
            Some(entry) if entry.permission == Permission::ReadWrite => {
                entry.content = content;
                true
            }
            _ => false,
        }
    }

    pub fn remove(&mut self, page: PageId) -> Option<CacheEntry> {
        self.entries.remove(&page)
    }

    pub fn to_map(&self) -> BTreeMap<PageId, CacheEntry> {
        self.entries
            .iter()
            .map(|(page, entry)| (*page, entry.clone()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_downgrade_keeps_content() {
        let mut cache = PageCache::new();
        cache.install(PageId(1), Permission::ReadWrite, "x".into());

        let entry = cache.downgrade(PageId(1)).unwrap();

        assert_eq!(entry.permission, Permission::ReadOnly);
        assert_eq!(entry.content, "x");
    }

    #[test]
    fn test_write_owned_requires_readwrite() {
        let mut cache = PageCache::new();
        cache.install(PageId(1), Permission::ReadOnly, "x".into());

        assert!(!cache.write_owned(PageId(1), "y".into()));
        assert!(!cache.write_owned(PageId(2), "y".into()));
        assert_eq!(cache.get(PageId(1)).unwrap().content, "x");
    }

    #[test]
    fn test_remove_drops_entry() {
        let mut cache = PageCache::new();
        cache.install(PageId(3), Permission::ReadWrite, "z".into());

        assert!(cache.remove(PageId(3)).is_some());
        assert!(cache.get(PageId(3)).is_none());
        assert!(cache.remove(PageId(3)).is_none());
    }
}
