//! Query predicate and the background search routine it drives.
//!
//! The original system drove search through a callback registered against a
//! global sequence counter on a SQL scan. Here a query is its own short-lived
//! thread: it takes a read lock, walks the table in insertion order, and
//! checks a per-query cancellation flag between rows so a newer query can
//! pre-empt an older one without waiting for it to finish.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::RwLock;

use crate::entry::Entry;
use crate::table::Table;

/// How a query pattern is interpreted against an entry's `name`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryMode {
    /// Case-sensitive substring containment.
    Substring,
    /// A regular expression matched anywhere in the name.
    Regex,
}

/// Runs one query to completion (or until cancelled), invoking `on_row` for
/// every matching live entry in insertion order.
///
/// A malformed regex pattern is not an error: it simply matches nothing,
/// per the contract callers rely on to avoid plumbing a parse error back
/// through a pre-emptible search.
pub(crate) fn run_query(
    table: &RwLock<Table>,
    seq: u64,
    pattern: &str,
    mode: QueryMode,
    cancel: &AtomicBool,
    mut on_row: impl FnMut(u64, &Entry),
) {
    let predicate: Box<dyn Fn(&str) -> bool + Send> = match mode {
        QueryMode::Substring => {
            let needle = pattern.to_string();
            Box::new(move |name: &str| name.contains(&needle))
        }
        QueryMode::Regex => match regex::Regex::new(pattern) {
            Ok(re) => Box::new(move |name: &str| re.is_match(name)),
            Err(e) => {
                log::debug!("query {seq}: malformed regex {pattern:?}: {e}");
                Box::new(|_: &str| false)
            }
        },
    };

    let guard = table.read().unwrap_or_else(|e| e.into_inner());
    for slot in guard.slots.iter() {
        if cancel.load(Ordering::Relaxed) {
            log::debug!("query {seq}: cancelled");
            return;
        }
        if let Some(entry) = slot {
            if predicate(&entry.name) {
                on_row(seq, entry);
            }
        }
    }
}
