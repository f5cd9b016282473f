//! Hand-rolled error types for the index, matching the style of the
//! teacher's `ScanError`/`WatcherError`/`IndexStoreError` enums: a small
//! enum, a manual `Display`, and `std::error::Error`. No `anyhow`/`thiserror`.

/// Errors `Index` mutation operations can fail with.
///
/// In practice these are rare: the in-memory table only fails on the kind
/// of allocation error the spec calls out as the sole `insert` failure mode.
#[derive(Debug)]
pub enum IndexError {
    /// Allocation failed while growing the backing table.
    Alloc,
}

impl std::fmt::Display for IndexError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IndexError::Alloc => write!(f, "allocation failure while mutating the index"),
        }
    }
}

impl std::error::Error for IndexError {}
