//! Recursive enumeration of registered roots into a [`locate_index::Index`].
//!
//! Shaped after the teacher's `indexing/scanner.rs`: a dispatcher thread
//! waits on a condition variable for roots to walk, and hands each one to
//! its own walk worker thread so multiple roots enumerate concurrently.
//! Where the teacher's dispatcher drained a channel, this one drains a
//! `Mutex<VecDeque<_>>` guarded by a `Condvar`, because `addRoot` needs to
//! wake a dispatcher that might otherwise be parked indefinitely between
//! `start()` and the first root.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;

use locate_index::{Entry, IndexError, IndexWriteHandle};

/// Tunable knobs for the background walk. `batch_size` matches the 32,768
/// entries-per-flush the bulk traversal model calls for.
#[derive(Debug, Clone, Copy)]
pub struct ScanConfig {
    pub batch_size: usize,
}

impl Default for ScanConfig {
    fn default() -> Self {
        ScanConfig { batch_size: 32_768 }
    }
}

#[derive(Debug)]
pub enum AddRootError {
    DoesNotExist,
    NotDirectory,
    AlreadyAdded,
    ParentAlreadyAdded,
}

impl std::fmt::Display for AddRootError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AddRootError::DoesNotExist => write!(f, "path does not exist"),
            AddRootError::NotDirectory => write!(f, "path is not a directory"),
            AddRootError::AlreadyAdded => write!(f, "path is already a root"),
            AddRootError::ParentAlreadyAdded => write!(f, "an ancestor of this path is already a root"),
        }
    }
}

impl std::error::Error for AddRootError {}

#[derive(Debug)]
pub enum ScanError {
    Index(IndexError),
}

impl std::fmt::Display for ScanError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ScanError::Index(e) => write!(f, "index error during scan: {e}"),
        }
    }
}

impl std::error::Error for ScanError {}

impl From<IndexError> for ScanError {
    fn from(e: IndexError) -> Self {
        ScanError::Index(e)
    }
}

struct WorkQueue {
    items: Mutex<VecDeque<PathBuf>>,
    ready: Condvar,
}

impl WorkQueue {
    fn new() -> Self {
        WorkQueue {
            items: Mutex::new(VecDeque::new()),
            ready: Condvar::new(),
        }
    }

    fn push(&self, path: PathBuf) {
        self.items.lock().unwrap_or_else(|e| e.into_inner()).push_back(path);
        self.ready.notify_one();
    }

    fn remove(&self, path: &Path) {
        self.items
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .retain(|p| p != path);
    }
}

/// Owns the user's root paths and drives background enumeration of them.
pub struct Scanner<I: IndexWriteHandle + Clone + Send + Sync + 'static> {
    index: I,
    config: ScanConfig,
    roots: Arc<Mutex<Vec<PathBuf>>>,
    queue: Arc<WorkQueue>,
    running: Arc<AtomicBool>,
    dispatcher: Mutex<Option<JoinHandle<()>>>,
    workers: Arc<Mutex<Vec<JoinHandle<()>>>>,
}

impl<I: IndexWriteHandle + Clone + Send + Sync + 'static> Scanner<I> {
    pub fn new(index: I, config: ScanConfig) -> Self {
        Scanner {
            index,
            config,
            roots: Arc::new(Mutex::new(Vec::new())),
            queue: Arc::new(WorkQueue::new()),
            running: Arc::new(AtomicBool::new(false)),
            dispatcher: Mutex::new(None),
            workers: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn paths(&self) -> Vec<PathBuf> {
        self.roots.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn add_root(&self, path: &Path) -> Result<(), AddRootError> {
        let meta = std::fs::metadata(path).map_err(|_| AddRootError::DoesNotExist)?;
        if !meta.is_dir() {
            return Err(AddRootError::NotDirectory);
        }

        let mut roots = self.roots.lock().unwrap_or_else(|e| e.into_inner());
        if roots.iter().any(|r| r == path) {
            return Err(AddRootError::AlreadyAdded);
        }
        if roots.iter().any(|r| path.starts_with(r)) {
            return Err(AddRootError::ParentAlreadyAdded);
        }
        roots.push(path.to_path_buf());
        drop(roots);

        if self.running.load(Ordering::SeqCst) {
            self.queue.push(path.to_path_buf());
        }
        Ok(())
    }

    pub fn remove_root(&self, path: &Path) -> bool {
        let mut roots = self.roots.lock().unwrap_or_else(|e| e.into_inner());
        let before = roots.len();
        roots.retain(|r| r != path);
        let removed = roots.len() != before;
        drop(roots);

        if removed {
            self.queue.remove(path);
            self.index.remove_by_root(path);
        }
        removed
    }

    pub fn start(&self) {
        if self.running.swap(true, Ordering::SeqCst) {
            return;
        }
        for root in self.roots.lock().unwrap_or_else(|e| e.into_inner()).iter() {
            self.queue.push(root.clone());
        }

        let queue = Arc::clone(&self.queue);
        let running = Arc::clone(&self.running);
        let roots = Arc::clone(&self.roots);
        let workers = Arc::clone(&self.workers);
        let index = self.index.clone();
        let batch_size = self.config.batch_size;

        let handle = std::thread::Builder::new()
            .name("scanner-dispatcher".into())
            .spawn(move || dispatcher_loop(queue, running, roots, workers, index, batch_size))
            .expect("failed to spawn scanner dispatcher");
        *self.dispatcher.lock().unwrap_or_else(|e| e.into_inner()) = Some(handle);
    }

    pub fn stop(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }
        self.queue.ready.notify_all();
        if let Some(handle) = self.dispatcher.lock().unwrap_or_else(|e| e.into_inner()).take() {
            let _ = handle.join();
        }
        let workers: Vec<JoinHandle<()>> = std::mem::take(&mut *self.workers.lock().unwrap_or_else(|e| e.into_inner()));
        for w in workers {
            let _ = w.join();
        }
    }
}

fn dispatcher_loop(
    queue: Arc<WorkQueue>,
    running: Arc<AtomicBool>,
    roots: Arc<Mutex<Vec<PathBuf>>>,
    workers: Arc<Mutex<Vec<JoinHandle<()>>>>,
    index: impl IndexWriteHandle + Clone + Send + Sync + 'static,
    batch_size: usize,
) {
    loop {
        let mut items = queue.items.lock().unwrap_or_else(|e| e.into_inner());
        while items.is_empty() && running.load(Ordering::SeqCst) {
            items = queue.ready.wait(items).unwrap_or_else(|e| e.into_inner());
        }
        if items.is_empty() && !running.load(Ordering::SeqCst) {
            return;
        }
        let batch: Vec<PathBuf> = items.drain(..).collect();
        drop(items);

        for root in batch {
            let running = Arc::clone(&running);
            let roots = Arc::clone(&roots);
            let index = index.clone();
            let handle = std::thread::Builder::new()
                .name(format!("scanner-walk-{}", root.display()))
                .spawn(move || walk_root(&root, &index, running, roots, batch_size))
                .expect("failed to spawn scanner walk worker");
            workers.lock().unwrap_or_else(|e| e.into_inner()).push(handle);
        }
    }
}

fn still_registered(roots: &Mutex<Vec<PathBuf>>, root: &Path) -> bool {
    roots.lock().unwrap_or_else(|e| e.into_inner()).iter().any(|r| r == root)
}

fn walk_root(
    root: &Path,
    index: &impl IndexWriteHandle,
    running: Arc<AtomicBool>,
    roots: Arc<Mutex<Vec<PathBuf>>>,
    batch_size: usize,
) {
    let mut buffer: Vec<Entry> = Vec::with_capacity(batch_size);
    let walker = jwalk::WalkDir::new(root).skip_hidden(false).follow_links(true);

    for item in walker {
        if !running.load(Ordering::SeqCst) || !still_registered(&roots, root) {
            break;
        }
        let dent = match item {
            Ok(d) => d,
            Err(e) => {
                log::debug!("walk error under {}: {e}", root.display());
                continue;
            }
        };
        if dent.file_type().is_dir() {
            continue;
        }
        if let Some(entry) = Entry::from_path(dent.path().as_path(), root) {
            buffer.push(entry);
        }
        if buffer.len() >= batch_size && !flush(index, &mut buffer) {
            log::warn!("scanner: aborting walk of {} after allocation failure", root.display());
            return;
        }
    }
    flush(index, &mut buffer);
}

/// Flushes `buffer` into the index, returning `false` on a fatal
/// allocation error (the caller terminates the walk for that root only).
fn flush(index: &impl IndexWriteHandle, buffer: &mut Vec<Entry>) -> bool {
    if buffer.is_empty() {
        return true;
    }
    let batch = std::mem::take(buffer);
    if let Err(e) = index.insert_many(batch).map_err(ScanError::from) {
        log::warn!("scanner: failed to flush batch: {e}");
        return false;
    }
    true
}
