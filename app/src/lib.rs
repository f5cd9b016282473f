//! Thin driver wiring an `Index`, a `Scanner`, and a `Watcher` together.
//!
//! Mirrors the shape of the teacher's `indexing/mod.rs`, which constructs
//! the store, the scanner, and the watcher and forwards root-management
//! calls to whichever of them needs to know about a root — except here
//! there is no SQLite store to hand a connection to, just the shared
//! in-memory `Index`.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

pub use locate_index::{Entry, IndexError, Perms, QueryMode};
use locate_index::Index;
use locate_scanner::{AddRootError as ScannerAddRootError, ScanConfig, Scanner};
use locate_watcher::{WatchConfig, Watcher, WatcherError};

const QUERY_DEBOUNCE: Duration = Duration::from_millis(200);

#[derive(Debug)]
pub enum AddRootError {
    Scanner(ScannerAddRootError),
    Watcher(WatcherError),
}

impl std::fmt::Display for AddRootError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AddRootError::Scanner(e) => write!(f, "{e}"),
            AddRootError::Watcher(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for AddRootError {}

/// A point-in-time snapshot of what the locator currently holds, answering
/// "what does the index think it has" without going through a query.
#[derive(Debug, Clone)]
pub struct OrchestratorStatus {
    pub roots: Vec<PathBuf>,
    pub entry_count: usize,
    pub scanning: bool,
}

pub struct Orchestrator {
    index: Index,
    scanner: Scanner<Index>,
    watcher: Watcher<Index>,
    debounce_gen: Arc<AtomicU64>,
}

impl Orchestrator {
    pub fn new(scan_config: ScanConfig, watch_config: WatchConfig) -> Self {
        let index = Index::new();
        let scanner = Scanner::new(index.clone(), scan_config);
        let watcher = Watcher::new(index.clone(), watch_config);
        Orchestrator {
            index,
            scanner,
            watcher,
            debounce_gen: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Registers `path` with both the scanner and the watcher. If the
    /// watcher fails after the scanner accepted the root, the scanner
    /// registration is rolled back so the two never disagree about which
    /// roots are live.
    pub fn add_root(&self, path: &Path) -> Result<(), AddRootError> {
        self.scanner.add_root(path).map_err(AddRootError::Scanner)?;
        if let Err(e) = self.watcher.watch(path) {
            self.scanner.remove_root(path);
            return Err(AddRootError::Watcher(e));
        }
        Ok(())
    }

    /// Removes `path` from both the scanner (purging its Index entries) and
    /// the watcher. Returns whether it had been registered.
    pub fn remove_root(&self, path: &Path) -> bool {
        let removed = self.scanner.remove_root(path);
        self.watcher.unwatch(path);
        removed
    }

    pub fn paths(&self) -> Vec<PathBuf> {
        self.scanner.paths()
    }

    pub fn start(&self) -> Result<(), WatcherError> {
        self.scanner.start();
        self.watcher.start()
    }

    /// Shuts everything down in reverse construction order: watcher, then
    /// scanner.
    pub fn stop(&self) {
        self.watcher.stop();
        self.scanner.stop();
    }

    pub fn status(&self) -> OrchestratorStatus {
        OrchestratorStatus {
            roots: self.paths(),
            entry_count: self.index.len(),
            scanning: self.scanner.is_running(),
        }
    }

    pub fn cancel_query(&self) {
        self.index.cancel_query();
    }

    /// Runs a query against the Index. With `debounce` set, the actual
    /// search is delayed by 200ms and skipped entirely if a newer `query`
    /// call arrives first — the keystroke-driven search hook. `on_done` is
    /// still invoked exactly once either way.
    pub fn query(
        &self,
        pattern: &str,
        mode: QueryMode,
        debounce: bool,
        on_row: impl FnMut(u64, &Entry) + Send + 'static,
        on_done: impl FnOnce() + Send + 'static,
    ) {
        let generation = self.debounce_gen.fetch_add(1, Ordering::SeqCst) + 1;
        if !debounce {
            self.index.query(pattern, mode, on_row, on_done);
            return;
        }

        let index = self.index.clone();
        let pattern = pattern.to_string();
        let debounce_gen = Arc::clone(&self.debounce_gen);
        std::thread::Builder::new()
            .name("orchestrator-debounce".into())
            .spawn(move || {
                std::thread::sleep(QUERY_DEBOUNCE);
                if debounce_gen.load(Ordering::SeqCst) != generation {
                    on_done();
                    return;
                }
                index.query(&pattern, mode, on_row, on_done);
            })
            .expect("failed to spawn debounce thread");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;

    #[test]
    fn add_root_then_bulk_enumeration_then_query() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("a/b")).unwrap();
        std::fs::write(dir.path().join("a/x.txt"), b"1").unwrap();
        std::fs::write(dir.path().join("a/b/y.txt"), b"22").unwrap();
        std::fs::write(dir.path().join("a/b/z.log"), b"333").unwrap();

        let orch = Orchestrator::new(ScanConfig::default(), WatchConfig::default());
        orch.add_root(dir.path()).unwrap();
        orch.start().unwrap();

        for _ in 0..300 {
            if orch.status().entry_count == 3 {
                break;
            }
            std::thread::sleep(Duration::from_millis(10));
        }

        let (tx, rx) = mpsc::channel();
        let (done_tx, done_rx) = mpsc::channel();
        orch.query(
            "y",
            QueryMode::Substring,
            false,
            move |_seq, e| tx.send((e.name.clone(), e.path.clone())).unwrap(),
            move || done_tx.send(()).unwrap(),
        );
        done_rx.recv().unwrap();
        let hits: Vec<_> = rx.try_iter().collect();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].0, "y.txt");
        assert_eq!(hits[0].1, dir.path().join("a/b"));

        orch.stop();
    }

    #[test]
    fn remove_root_purges_entries_and_stops_future_updates() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("old.txt"), b"x").unwrap();

        let orch = Orchestrator::new(ScanConfig::default(), WatchConfig::default());
        orch.add_root(dir.path()).unwrap();
        orch.start().unwrap();

        for _ in 0..300 {
            if orch.status().entry_count == 1 {
                break;
            }
            std::thread::sleep(Duration::from_millis(10));
        }

        assert!(orch.remove_root(dir.path()));
        assert_eq!(orch.status().entry_count, 0);

        std::fs::write(dir.path().join("new.txt"), b"y").unwrap();
        std::thread::sleep(Duration::from_millis(200));
        assert_eq!(orch.status().entry_count, 0);

        orch.stop();
    }
}
