//! The file record stored in the [`crate::Index`] and the permission bit layout
//! it carries. See `docs` in the crate root for the field semantics.

use std::path::{Path, PathBuf};

/// Owner read/write/execute.
pub const PERM_OWNER_READ: u16 = 0o400;
pub const PERM_OWNER_WRITE: u16 = 0o200;
pub const PERM_OWNER_EXEC: u16 = 0o100;
/// Group read/write/execute.
pub const PERM_GROUP_READ: u16 = 0o040;
pub const PERM_GROUP_WRITE: u16 = 0o020;
pub const PERM_GROUP_EXEC: u16 = 0o010;
/// Other read/write/execute.
pub const PERM_OTHER_READ: u16 = 0o004;
pub const PERM_OTHER_WRITE: u16 = 0o002;
pub const PERM_OTHER_EXEC: u16 = 0o001;
/// setuid/setgid/sticky.
pub const PERM_SETUID: u16 = 0o4000;
pub const PERM_SETGID: u16 = 0o2000;
pub const PERM_STICKY: u16 = 0o1000;

/// A 16-bit little-endian POSIX permission bit-set.
///
/// Platform-neutral: on Unix it is read straight off the low 12 bits of
/// `st_mode`. On platforms without POSIX permission bits the best
/// approximation (read bit always set, write bit reflecting the read-only
/// flag, no execute/setuid/sticky bits) is used.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub struct Perms(pub u16);

impl Perms {
    pub const fn bits(self) -> u16 {
        self.0
    }

    pub const fn has(self, bit: u16) -> bool {
        self.0 & bit != 0
    }
}

#[cfg(unix)]
impl From<&std::fs::Metadata> for Perms {
    fn from(meta: &std::fs::Metadata) -> Self {
        use std::os::unix::fs::MetadataExt;
        Perms((meta.mode() & 0o7777) as u16)
    }
}

#[cfg(not(unix))]
impl From<&std::fs::Metadata> for Perms {
    fn from(meta: &std::fs::Metadata) -> Self {
        let mut bits = PERM_OWNER_READ | PERM_GROUP_READ | PERM_OTHER_READ;
        if !meta.permissions().readonly() {
            bits |= PERM_OWNER_WRITE | PERM_GROUP_WRITE | PERM_OTHER_WRITE;
        }
        Perms(bits)
    }
}

/// One regular file discovered under a registered root.
///
/// Directories are never stored as entries (see the Index module docs);
/// `path` is always the directory immediately containing this file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    /// File basename, e.g. `"report.txt"`.
    pub name: String,
    /// Absolute path of the immediate containing directory.
    pub path: PathBuf,
    /// Absolute path of the root this entry was discovered under.
    pub parent: PathBuf,
    /// Byte count at the time of observation.
    pub size: u64,
    /// POSIX permission bits at the time of observation.
    pub perms: Perms,
}

impl Entry {
    /// The full path to the file itself (`path` joined with `name`).
    pub fn full_path(&self) -> PathBuf {
        self.path.join(&self.name)
    }

    /// Build an entry for `full_path`, stat-ing it for size and permissions.
    ///
    /// Symlinks are followed (the locator indexes the target), so this
    /// stats through the final link rather than the link itself. Errors
    /// reading metadata are tolerated: the entry is still produced with
    /// `size` defaulted to 0, matching the scanner's
    /// skip-permission-denied semantics.
    pub fn from_path(full_path: &Path, root: &Path) -> Option<Entry> {
        let name = full_path.file_name()?.to_string_lossy().into_owned();
        let dir = full_path.parent()?.to_path_buf();
        let (size, perms) = match std::fs::metadata(full_path) {
            Ok(meta) => (meta.len(), Perms::from(&meta)),
            Err(e) => {
                log::debug!("stat failed for {}: {e}", full_path.display());
                (0, Perms::default())
            }
        };
        Some(Entry {
            name,
            path: dir,
            parent: root.to_path_buf(),
            size,
            perms,
        })
    }
}
