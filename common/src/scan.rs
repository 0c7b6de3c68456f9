//! Find submission archives under a solutions root.

use crate::ARCHIVE_SUFFIX;
use itertools::Itertools;
use log::warn;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// A submission archive found on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchivePath {
    /// Where the archive lives on disk.
    pub full: PathBuf,
    /// The path below the scan root with a leading `/`, `/`-separated. This is the
    /// ledger key.
    pub relative: String,
}

/// Lazily walk `root` and yield every file whose name ends in [`ARCHIVE_SUFFIX`].
/// Unreadable directories are logged and skipped. Sibling order is unspecified.
pub fn scan_archives(root: &Path) -> impl Iterator<Item = ArchivePath> + '_ {
    WalkDir::new(root)
        .into_iter()
        .filter_map(move |entry| match entry {
            Ok(entry) => Some(entry),
            Err(e) => {
                warn!("error walking {}: {e}", root.display());
                None
            }
        })
        .filter(|entry| entry.file_type().is_file())
        .filter(|entry| {
            entry
                .file_name()
                .to_string_lossy()
                .ends_with(ARCHIVE_SUFFIX)
        })
        .filter_map(move |entry| {
            let relative = relative_key(entry.path().strip_prefix(root).ok()?);
            Some(ArchivePath {
                full: entry.into_path(),
                relative,
            })
        })
}

/// Key a relative path as `/a/b.tar.gz` regardless of platform.
fn relative_key(relative: &Path) -> String {
    relative
        .components()
        .map(|c| format!("/{}", c.as_os_str().to_string_lossy()))
        .join("")
}

/// Turn a ledger key back into a path below `root`.
pub fn archive_location(root: &Path, relative: &str) -> PathBuf {
    root.join(relative.trim_start_matches('/'))
}
