//! Keeps an [`locate_index::Index`] in sync with live filesystem changes.
//!
//! The teacher's own non-FSEvents watchers (`volumes/watcher.rs`,
//! `file_system/watcher.rs`) build on the `notify` crate rather than
//! hand-rolling OS-specific watch-descriptor bookkeeping, and `notify`'s
//! `RecursiveMode::Recursive` already performs, one layer down, the
//! per-directory watch registration a raw inotify backend needs. So the
//! three-map `folder[WD]`/`parent[WD]`/`children[root]` bookkeeping this
//! component would otherwise carry collapses to one map: which root a path
//! belongs to, answered by the longest registered-root prefix.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use notify::{EventKind, RecommendedWatcher, RecursiveMode, Watcher as NotifyWatcher};

use locate_index::{Entry, IndexWriteHandle};

#[derive(Debug, Clone, Copy)]
pub struct WatchConfig {
    /// How long the event loop blocks waiting for the next notification
    /// before re-checking the running flag.
    pub poll_timeout: Duration,
}

impl Default for WatchConfig {
    fn default() -> Self {
        WatchConfig {
            poll_timeout: Duration::from_millis(100),
        }
    }
}

#[derive(Debug)]
pub enum WatcherError {
    Notify(notify::Error),
}

impl std::fmt::Display for WatcherError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WatcherError::Notify(e) => write!(f, "watcher error: {e}"),
        }
    }
}

impl std::error::Error for WatcherError {}

impl From<notify::Error> for WatcherError {
    fn from(e: notify::Error) -> Self {
        WatcherError::Notify(e)
    }
}

struct Running {
    watcher: RecommendedWatcher,
    loop_handle: JoinHandle<()>,
}

/// Watches a set of registered roots and mirrors CREATE/DELETE/rename
/// notifications into an `Index`.
pub struct Watcher<I: IndexWriteHandle + Clone + Send + Sync + 'static> {
    index: I,
    config: WatchConfig,
    roots: Arc<Mutex<Vec<PathBuf>>>,
    running_flag: Arc<AtomicBool>,
    running: Mutex<Option<Running>>,
}

impl<I: IndexWriteHandle + Clone + Send + Sync + 'static> Watcher<I> {
    pub fn new(index: I, config: WatchConfig) -> Self {
        Watcher {
            index,
            config,
            roots: Arc::new(Mutex::new(Vec::new())),
            running_flag: Arc::new(AtomicBool::new(false)),
            running: Mutex::new(None),
        }
    }

    /// Opens the OS notification object and starts the event loop thread.
    /// Any roots already registered via `watch` are (re)subscribed.
    pub fn start(&self) -> Result<(), WatcherError> {
        let mut running = self.running.lock().unwrap_or_else(|e| e.into_inner());
        if running.is_some() {
            return Ok(());
        }

        let (tx, rx) = mpsc::channel();
        let mut watcher = notify::recommended_watcher(move |res| {
            let _ = tx.send(res);
        })?;
        for root in self.roots.lock().unwrap_or_else(|e| e.into_inner()).iter() {
            watcher.watch(root, RecursiveMode::Recursive)?;
        }

        self.running_flag.store(true, Ordering::SeqCst);
        let index = self.index.clone();
        let roots = Arc::clone(&self.roots);
        let running_flag = Arc::clone(&self.running_flag);
        let poll_timeout = self.config.poll_timeout;

        let loop_handle = std::thread::Builder::new()
            .name("watcher-event-loop".into())
            .spawn(move || event_loop(rx, index, roots, running_flag, poll_timeout))
            .expect("failed to spawn watcher event loop");

        *running = Some(Running { watcher, loop_handle });
        Ok(())
    }

    /// Register `root` (a no-op, returning ok, if already watched).
    pub fn watch(&self, root: &Path) -> Result<(), WatcherError> {
        let mut roots = self.roots.lock().unwrap_or_else(|e| e.into_inner());
        if roots.iter().any(|r| r == root) {
            return Ok(());
        }
        if let Some(running) = self.running.lock().unwrap_or_else(|e| e.into_inner()).as_mut() {
            running.watcher.watch(root, RecursiveMode::Recursive)?;
        }
        roots.push(root.to_path_buf());
        Ok(())
    }

    /// Tear down the watch for `root`. Returns `true` if it was registered.
    pub fn unwatch(&self, root: &Path) -> bool {
        let mut roots = self.roots.lock().unwrap_or_else(|e| e.into_inner());
        let before = roots.len();
        roots.retain(|r| r != root);
        let removed = roots.len() != before;
        if removed {
            if let Some(running) = self.running.lock().unwrap_or_else(|e| e.into_inner()).as_mut() {
                let _ = running.watcher.unwatch(root);
            }
        }
        removed
    }

    /// Close the OS notification object, join the event loop, and drop all
    /// bookkeeping.
    pub fn stop(&self) {
        self.running_flag.store(false, Ordering::SeqCst);
        if let Some(running) = self.running.lock().unwrap_or_else(|e| e.into_inner()).take() {
            drop(running.watcher);
            let _ = running.loop_handle.join();
        }
        self.roots.lock().unwrap_or_else(|e| e.into_inner()).clear();
    }
}

fn event_loop(
    rx: mpsc::Receiver<notify::Result<notify::Event>>,
    index: impl IndexWriteHandle,
    roots: Arc<Mutex<Vec<PathBuf>>>,
    running_flag: Arc<AtomicBool>,
    poll_timeout: Duration,
) {
    loop {
        if !running_flag.load(Ordering::SeqCst) {
            return;
        }
        match rx.recv_timeout(poll_timeout) {
            Ok(Ok(event)) => handle_event(&event, &index, &roots),
            Ok(Err(e)) => log::warn!("watcher: notification error: {e}"),
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => return,
        }
    }
}

fn resolve_root(roots: &Mutex<Vec<PathBuf>>, path: &Path) -> Option<PathBuf> {
    roots
        .lock()
        .unwrap_or_else(|e| e.into_inner())
        .iter()
        .filter(|r| path.starts_with(r))
        .max_by_key(|r| r.as_os_str().len())
        .cloned()
}

fn handle_event(event: &notify::Event, index: &impl IndexWriteHandle, roots: &Arc<Mutex<Vec<PathBuf>>>) {
    use notify::event::{ModifyKind, RenameMode};

    match event.kind {
        EventKind::Create(_) => {
            for path in &event.paths {
                handle_arrival(path, index, roots);
            }
        }
        EventKind::Modify(ModifyKind::Name(RenameMode::To)) => {
            for path in &event.paths {
                handle_arrival(path, index, roots);
            }
        }
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) if event.paths.len() == 2 => {
            handle_departure(&event.paths[0], index);
            handle_arrival(&event.paths[1], index, roots);
        }
        EventKind::Modify(ModifyKind::Name(RenameMode::From)) => {
            for path in &event.paths {
                handle_departure(path, index);
            }
        }
        EventKind::Remove(_) => {
            for path in &event.paths {
                handle_departure(path, index);
            }
        }
        _ => {}
    }
}

/// CREATE or MOVED_TO: resolve the owning root, stat the path, and insert
/// either the single file or (recursively, for a directory moved/created
/// in) every regular file it now contains.
fn handle_arrival(path: &Path, index: &impl IndexWriteHandle, roots: &Arc<Mutex<Vec<PathBuf>>>) {
    let Some(root) = resolve_root(roots, path) else {
        return;
    };
    let meta = match std::fs::metadata(path) {
        Ok(m) => m,
        Err(e) => {
            log::debug!("watcher: stat failed for {}: {e}", path.display());
            return;
        }
    };
    if meta.is_dir() {
        let mut entries = Vec::new();
        enumerate_subtree(path, &root, &mut entries);
        if let Err(e) = index.insert_many(entries) {
            log::warn!("watcher: failed to index new directory {}: {e}", path.display());
        }
    } else if let Some(entry) = Entry::from_path(path, &root) {
        if let Err(e) = index.insert(entry) {
            log::warn!("watcher: failed to index {}: {e}", path.display());
        }
    }
}

/// DELETE or MOVED_FROM. The path no longer exists, so its kind can't be
/// stat'd; both removal shapes are applied, and whichever doesn't apply is
/// a no-op: `removeOne` for the file case and `removeByPath` for the
/// subtree-purge case a removed directory needs.
fn handle_departure(path: &Path, index: &impl IndexWriteHandle) {
    if let (Some(name), Some(dir)) = (path.file_name(), path.parent()) {
        index.remove_one(&name.to_string_lossy(), dir);
    }
    index.remove_by_path(path);
}

/// Recursively collects every regular file under `dir`. Directories are
/// deduped by canonicalized identity (not their literal path) before being
/// pushed onto the work stack: symlinks are followed (per the containing
/// directory being followed when the watcher stats it), and a symlink
/// cycle would otherwise produce an ever-longer, never-repeating literal
/// path at each hop and recurse forever.
fn enumerate_subtree(dir: &Path, root: &Path, out: &mut Vec<Entry>) {
    let mut stack = vec![dir.to_path_buf()];
    let mut visited = HashSet::new();
    if let Ok(canon) = std::fs::canonicalize(dir) {
        visited.insert(canon);
    }
    while let Some(current) = stack.pop() {
        let read_dir = match std::fs::read_dir(&current) {
            Ok(rd) => rd,
            Err(e) => {
                log::debug!("watcher: read_dir failed for {}: {e}", current.display());
                continue;
            }
        };
        for item in read_dir {
            let Ok(item) = item else { continue };
            let path = item.path();
            let meta = match std::fs::metadata(&path) {
                Ok(m) => m,
                Err(e) => {
                    log::debug!("watcher: stat failed for {}: {e}", path.display());
                    continue;
                }
            };
            if meta.is_dir() {
                let identity = std::fs::canonicalize(&path).unwrap_or_else(|_| path.clone());
                if visited.insert(identity) {
                    stack.push(path);
                }
            } else if let Some(entry) = Entry::from_path(&path, root) {
                out.push(entry);
            }
        }
    }
}
