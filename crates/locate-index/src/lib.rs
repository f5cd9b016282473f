//! Thread-safe in-memory index of file entries.
//!
//! `Index` is the single source of truth a scanner and a watcher both write
//! into and a query reads from. It is cheap to clone (an `Arc` handle, in the
//! style of the teacher's `IndexWriter`) so every producer and the query
//! surface share one backing table without any of them owning it outright.
//!
//! Mutations (`insert`, `insert_many`, `remove_one`, `remove_by_root`,
//! `remove_by_path`) take a write lock; a query takes a read lock for its
//! entire run, so a query observes one consistent snapshot of the table and
//! never a write in progress. Only one query runs at a time: starting a new
//! one cancels and joins whatever query is still running first.

pub mod entry;
pub mod error;
mod query;
mod table;

use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::thread::JoinHandle;

pub use entry::{Entry, Perms};
pub use error::IndexError;
pub use query::QueryMode;

use query::run_query;
use table::Table;

/// The capability a producer (scanner or watcher) needs against the index.
///
/// Expressing this as a trait rather than handing out the concrete `Index`
/// lets producers depend on "can mutate the table" without pulling in the
/// query machinery, and keeps `Index` free to add read-only methods later
/// without widening what a producer can do.
pub trait IndexWriteHandle: Send + Sync {
    fn insert(&self, entry: Entry) -> Result<(), IndexError>;
    fn insert_many(&self, entries: Vec<Entry>) -> Result<(), IndexError>;
    fn remove_one(&self, name: &str, path: &Path);
    fn remove_by_root(&self, root: &Path);
    fn remove_by_path(&self, path: &Path);
}

struct QuerySlot {
    cancel: Arc<AtomicBool>,
    handle: JoinHandle<()>,
}

struct Inner {
    table: RwLock<Table>,
    query_seq: AtomicU64,
    current: Mutex<Option<QuerySlot>>,
}

/// A cheap-to-clone handle onto a shared in-memory file index.
#[derive(Clone)]
pub struct Index(Arc<Inner>);

impl Default for Index {
    fn default() -> Self {
        Self::new()
    }
}

impl Index {
    pub fn new() -> Self {
        Index(Arc::new(Inner {
            table: RwLock::new(Table::new()),
            query_seq: AtomicU64::new(0),
            current: Mutex::new(None),
        }))
    }

    /// Number of live (non-tombstoned) entries.
    pub fn len(&self) -> usize {
        self.0.table.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn insert(&self, entry: Entry) -> Result<(), IndexError> {
        let mut table = self.0.table.write().unwrap_or_else(|e| e.into_inner());
        table.try_reserve(1).map_err(|_| IndexError::Alloc)?;
        table.insert_one(entry);
        Ok(())
    }

    /// Insert a batch of entries. Either all become visible to subsequent
    /// queries or, if the batch can't be allocated for, none do — the
    /// reservation is checked before any entry is pushed.
    pub fn insert_many(&self, entries: Vec<Entry>) -> Result<(), IndexError> {
        if entries.is_empty() {
            return Ok(());
        }
        let mut table = self.0.table.write().unwrap_or_else(|e| e.into_inner());
        table.try_reserve(entries.len()).map_err(|_| IndexError::Alloc)?;
        for entry in entries {
            table.insert_one(entry);
        }
        Ok(())
    }

    /// Remove the entry named `name` in directory `path`, if present.
    /// Removing an entry that isn't there is not an error.
    pub fn remove_one(&self, name: &str, path: &Path) {
        self.0
            .table
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove_one(name, path);
    }

    /// Remove every entry discovered under root `root`.
    pub fn remove_by_root(&self, root: &Path) {
        self.0
            .table
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove_by_root(root);
    }

    /// Remove every entry whose containing directory equals or is nested
    /// under `path`. Used when a directory (not a root) is deleted or moved
    /// away.
    pub fn remove_by_path(&self, path: &Path) {
        self.0
            .table
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove_by_path(path);
    }

    /// Cancel whatever query is currently running and block until it has
    /// actually stopped. A no-op if no query is running.
    pub fn cancel_query(&self) {
        let slot = self.0.current.lock().unwrap_or_else(|e| e.into_inner()).take();
        if let Some(slot) = slot {
            slot.cancel.store(true, Ordering::Relaxed);
            let _ = slot.handle.join();
        }
    }

    /// Start a query, cancelling and joining any query already in flight.
    ///
    /// `on_row` is invoked once per matching entry, in insertion order,
    /// with the sequence number of this query; `on_done` is invoked exactly
    /// once, after the last row (or immediately, if the query was cancelled
    /// before inspecting a row). Returns the sequence number assigned to
    /// this query, which callers can use to tell stale rows from a
    /// pre-empted query apart from the query that superseded it.
    pub fn query(
        &self,
        pattern: &str,
        mode: QueryMode,
        mut on_row: impl FnMut(u64, &Entry) + Send + 'static,
        on_done: impl FnOnce() + Send + 'static,
    ) -> u64 {
        self.cancel_query();

        let seq = self.0.query_seq.fetch_add(1, Ordering::SeqCst) + 1;
        let cancel = Arc::new(AtomicBool::new(false));
        let cancel_for_thread = Arc::clone(&cancel);
        let inner = Arc::clone(&self.0);
        let pattern = pattern.to_string();

        let handle = std::thread::Builder::new()
            .name(format!("index-query-{seq}"))
            .spawn(move || {
                run_query(&inner.table, seq, &pattern, mode, &cancel_for_thread, |s, e| {
                    on_row(s, e);
                });
                on_done();
            })
            .expect("failed to spawn query thread");

        *self.0.current.lock().unwrap_or_else(|e| e.into_inner()) = Some(QuerySlot { cancel, handle });
        seq
    }
}

impl IndexWriteHandle for Index {
    fn insert(&self, entry: Entry) -> Result<(), IndexError> {
        Index::insert(self, entry)
    }

    fn insert_many(&self, entries: Vec<Entry>) -> Result<(), IndexError> {
        Index::insert_many(self, entries)
    }

    fn remove_one(&self, name: &str, path: &Path) {
        Index::remove_one(self, name, path)
    }

    fn remove_by_root(&self, root: &Path) {
        Index::remove_by_root(self, root)
    }

    fn remove_by_path(&self, path: &Path) {
        Index::remove_by_path(self, path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::sync::mpsc;

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
    fn insert_then_substring_query_finds_match() {
        let idx = Index::new();
        idx.insert(entry("report.txt", "/r", "/r")).unwrap();
        idx.insert(entry("notes.md", "/r", "/r")).unwrap();

        let (tx, rx) = mpsc::channel();
        let (done_tx, done_rx) = mpsc::channel();
        idx.query(
            "report",
            QueryMode::Substring,
            move |_seq, e| tx.send(e.name.clone()).unwrap(),
            move || done_tx.send(()).unwrap(),
        );
        done_rx.recv().unwrap();
        let hits: Vec<String> = rx.try_iter().collect();
        assert_eq!(hits, vec!["report.txt".to_string()]);
    }

    #[test]
    fn regex_query_with_bad_pattern_yields_no_rows_but_still_completes() {
        let idx = Index::new();
        idx.insert(entry("a.txt", "/r", "/r")).unwrap();

        let (tx, rx) = mpsc::channel();
        let (done_tx, done_rx) = mpsc::channel();
        idx.query(
            "(unterminated",
            QueryMode::Regex,
            move |_seq, e| tx.send(e.name.clone()).unwrap(),
            move || done_tx.send(()).unwrap(),
        );
        done_rx.recv().unwrap();
        assert!(rx.try_iter().next().is_none());
    }

    #[test]
    fn remove_by_root_drops_everything_under_that_root() {
        let idx = Index::new();
        idx.insert(entry("a.txt", "/r/sub", "/r")).unwrap();
        idx.insert(entry("b.txt", "/other", "/other")).unwrap();
        idx.remove_by_root(Path::new("/r"));
        assert_eq!(idx.len(), 1);
    }

    #[test]
    fn starting_a_new_query_cancels_the_previous_one() {
        let idx = Index::new();
        for i in 0..1000 {
            idx.insert(entry(&format!("f{i}.txt"), "/r", "/r")).unwrap();
        }
        let first_seq = idx.query(".*", QueryMode::Regex, |_, _| {}, || {});
        let second_seq = idx.query(".*", QueryMode::Regex, |_, _| {}, || {});
        assert!(second_seq > first_seq);
    }

    #[test]
    fn insert_many_is_all_or_nothing_visibility() {
        let idx = Index::new();
        idx.insert_many(vec![entry("a", "/r", "/r"), entry("b", "/r", "/r")]).unwrap();
        assert_eq!(idx.len(), 2);
    }
}
