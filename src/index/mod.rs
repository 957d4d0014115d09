use std::collections::BTreeMap;
use parking_lot::RwLock;

use crate::common::types::Rid;
use crate::storage::table::Value;

/// Key type for secondary indexes: the projected column values of a tuple.
pub type IndexKey = Vec<Value>;

/// Ordered secondary index mapping derived keys to record ids.
///
/// The on-page node layout lives behind this façade; callers only see
/// entry insertion, entry removal, and point lookups.
pub struct BTreeIndex {
    entries: RwLock<BTreeMap<IndexKey, Vec<Rid>>>,
}

impl Default for BTreeIndex {
    fn default() -> Self {
        Self::new()
    }
}

impl BTreeIndex {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(BTreeMap::new()),
        }
    }

    pub fn insert_entry(&self, key: IndexKey, rid: Rid) {
        self.entries.write().entry(key).or_default().push(rid);
    }

    pub fn delete_entry(&self, key: &[Value], rid: Rid) {
        let mut entries = self.entries.write();
        if let Some(rids) = entries.get_mut(key) {
            rids.retain(|&r| r != rid);
            if rids.is_empty() {
                entries.remove(key);
            }
        }
    }

    /// All record ids stored under `key`.
    pub fn scan_key(&self, key: &[Value]) -> Vec<Rid> {
        self.entries.read().get(key).cloned().unwrap_or_default()
    }

    /// Number of distinct keys.
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}
