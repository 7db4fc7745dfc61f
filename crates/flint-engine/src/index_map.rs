use std::collections::HashMap;
use std::sync::Arc;

use arc_swap::ArcSwap;

use crate::metadata::ArrayIndexEntry;

/// The path→indexTable map a `Collection` consults on every query
/// compilation. Swapped atomically on `ensure_array_index` so that a reader
/// mid-compile never observes a partially-built map — it sees either the
/// snapshot from before the new index or the one from after, never a torn
/// state in between.
pub struct ArrayIndexMap {
    inner: ArcSwap<HashMap<String, String>>,
}

impl ArrayIndexMap {
    pub fn new() -> Self {
        ArrayIndexMap { inner: ArcSwap::from_pointee(HashMap::new()) }
    }

    pub fn from_entries(entries: &[ArrayIndexEntry]) -> Self {
        let map = entries.iter().map(|e| (e.keypath.clone(), e.index_table.clone())).collect();
        ArrayIndexMap { inner: ArcSwap::from_pointee(map) }
    }

    /// A point-in-time, independently readable snapshot.
    pub fn snapshot(&self) -> Arc<HashMap<String, String>> {
        self.inner.load_full()
    }

    pub fn table_for(&self, path: &str) -> Option<String> {
        self.inner.load().get(path).cloned()
    }

    /// Insert `(path, table)` and publish a fresh snapshot. Readers already
    /// holding an older snapshot are unaffected.
    pub fn insert(&self, path: String, table: String) {
        let mut next = (**self.inner.load()).clone();
        next.insert(path, table);
        self.inner.store(Arc::new(next));
    }
}

impl Default for ArrayIndexMap {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_empty() {
        let map = ArrayIndexMap::new();
        assert_eq!(map.table_for("tags"), None);
    }

    #[test]
    fn insert_is_visible_to_new_lookups() {
        let map = ArrayIndexMap::new();
        map.insert("tags".into(), "people_tags".into());
        assert_eq!(map.table_for("tags"), Some("people_tags".to_string()));
    }

    #[test]
    fn snapshot_is_stable_across_later_inserts() {
        let map = ArrayIndexMap::new();
        map.insert("tags".into(), "people_tags".into());
        let snap = map.snapshot();
        map.insert("roles".into(), "people_roles".into());
        assert_eq!(snap.len(), 1);
        assert_eq!(map.snapshot().len(), 2);
    }

    #[test]
    fn from_entries_seeds_the_map() {
        let entries = vec![ArrayIndexEntry { keypath: "tags".into(), index_table: "people_tags".into() }];
        let map = ArrayIndexMap::from_entries(&entries);
        assert_eq!(map.table_for("tags"), Some("people_tags".to_string()));
    }
}
