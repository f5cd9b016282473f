//! In-memory, insertion-ordered entry table with secondary indices.
//!
//! This replaces the "in-process SQL engine used purely as an ordered scan
//! table" pattern the original system relied on (see the design notes in the
//! crate root docs): a plain append-only `Vec` plus two `HashMap` indices is
//! both simpler and faster than round-tripping through a query planner for a
//! `LIKE`-style scan.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::entry::Entry;

/// Slot-based storage: `None` marks a tombstoned (deleted) entry. Slots are
/// never reused for new inserts, which keeps the vector in strict insertion
/// order for the life of the table — the ordering guarantee §4.1 queries
/// rely on. A long-running process that churns entries heavily will
/// accumulate tombstones; nothing in the spec requires compaction, so none
/// is implemented.
#[derive(Default)]
pub(crate) struct Table {
    pub(crate) slots: Vec<Option<Entry>>,
    by_parent: HashMap<PathBuf, Vec<usize>>,
    by_dir: HashMap<PathBuf, Vec<usize>>,
    live_count: usize,
}

impl Table {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn len(&self) -> usize {
        self.live_count
    }

    pub(crate) fn try_reserve(&mut self, additional: usize) -> Result<(), std::collections::TryReserveError> {
        self.slots.try_reserve(additional)
    }

    pub(crate) fn insert_one(&mut self, entry: Entry) -> usize {
        let idx = self.slots.len();
        self.by_parent.entry(entry.parent.clone()).or_default().push(idx);
        self.by_dir.entry(entry.path.clone()).or_default().push(idx);
        self.slots.push(Some(entry));
        self.live_count += 1;
        idx
    }

    fn remove_slot(&mut self, idx: usize) {
        let Some(entry) = self.slots[idx].take() else {
            return;
        };
        self.live_count -= 1;
        if let Some(set) = self.by_parent.get_mut(&entry.parent) {
            set.retain(|&i| i != idx);
            if set.is_empty() {
                self.by_parent.remove(&entry.parent);
            }
        }
        if let Some(set) = self.by_dir.get_mut(&entry.path) {
            set.retain(|&i| i != idx);
            if set.is_empty() {
                self.by_dir.remove(&entry.path);
            }
        }
    }

    /// Remove every entry with the exact `(name, path)`. Idempotent.
    pub(crate) fn remove_one(&mut self, name: &str, path: &Path) {
        let Some(idxs) = self.by_dir.get(path) else {
            return;
        };
        let matches: Vec<usize> = idxs
            .iter()
            .copied()
            .filter(|&i| self.slots[i].as_ref().is_some_and(|e| e.name == name))
            .collect();
        for idx in matches {
            self.remove_slot(idx);
        }
    }

    /// Remove every entry whose `parent` equals `root`.
    pub(crate) fn remove_by_root(&mut self, root: &Path) {
        let Some(idxs) = self.by_parent.get(root).cloned() else {
            return;
        };
        for idx in idxs {
            self.remove_slot(idx);
        }
    }

    /// Remove every entry whose containing directory equals or is nested
    /// under `prefix`.
    pub(crate) fn remove_by_path(&mut self, prefix: &Path) {
        let dirs: Vec<PathBuf> = self
            .by_dir
            .keys()
            .filter(|dir| dir.as_path() == prefix || dir.starts_with(prefix))
            .cloned()
            .collect();
        for dir in dirs {
            if let Some(idxs) = self.by_dir.get(&dir).cloned() {
                for idx in idxs {
                    self.remove_slot(idx);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::Perms;

    fn entry(name: &str, dir: &str, root: &str) -> Entry {
        Entry {
            name: name.into(),
            path: PathBuf::from(dir),
            parent: PathBuf::from(root),
            size: 0,
            perms: Perms::default(),
        }
    }

    #[test]
    fn insert_and_len() {
        let mut t = Table::new();
        t.insert_one(entry("a.txt", "/r/a", "/r"));
        t.insert_one(entry("b.txt", "/r/a", "/r"));
        assert_eq!(t.len(), 2);
    }

    #[test]
    fn remove_one_is_idempotent() {
        let mut t = Table::new();
        t.insert_one(entry("a.txt", "/r/a", "/r"));
        t.remove_one("a.txt", Path::new("/r/a"));
        assert_eq!(t.len(), 0);
        // Removing again must not panic or misbehave.
        t.remove_one("a.txt", Path::new("/r/a"));
        assert_eq!(t.len(), 0);
    }

    #[test]
    fn remove_by_root_purges_everything_under_it() {
        let mut t = Table::new();
        t.insert_one(entry("a.txt", "/r/a", "/r"));
        t.insert_one(entry("b.txt", "/r/b", "/r"));
        t.insert_one(entry("c.txt", "/other/c", "/other"));
        t.remove_by_root(Path::new("/r"));
        assert_eq!(t.len(), 1);
        assert!(t.slots.iter().flatten().any(|e| e.name == "c.txt"));
    }

    #[test]
    fn remove_by_path_matches_prefix_and_exact() {
        let mut t = Table::new();
        t.insert_one(entry("x.txt", "/r/a", "/r"));
        t.insert_one(entry("y.txt", "/r/a/deep", "/r"));
        t.insert_one(entry("z.txt", "/r/b", "/r"));
        t.remove_by_path(Path::new("/r/a"));
        assert_eq!(t.len(), 1);
        assert!(t.slots.iter().flatten().any(|e| e.name == "z.txt"));
    }

    #[test]
    fn insertion_order_is_preserved_across_deletes() {
        let mut t = Table::new();
        for n in ["a", "b", "c", "d"] {
            t.insert_one(entry(n, "/r", "/r"));
        }
        t.remove_one("b", Path::new("/r"));
        let order: Vec<&str> = t.slots.iter().flatten().map(|e| e.name.as_str()).collect();
        assert_eq!(order, vec!["a", "c", "d"]);
    }
}
