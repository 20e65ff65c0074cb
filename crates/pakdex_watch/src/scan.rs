//! Archive discovery on the local filesystem
//!
//! The traversal helpers tolerate unreadable subdirectories: an
//! access-denied subtree is skipped, not an error, so a partially readable
//! mount still synchronizes everything it can.

use crate::ARCHIVE_EXTENSIONS;
use std::path::{Path, PathBuf};
use tracing::debug;
use walkdir::WalkDir;

/// Whether a file name matches the archive-like extension set
/// (case-insensitive).
pub fn is_archive_name(name: &str) -> bool {
    let lowered = name.to_lowercase();
    ARCHIVE_EXTENSIONS
        .iter()
        .any(|ext| lowered.ends_with(&ext.to_lowercase()))
}

/// Archive files directly inside `directory` (non-recursive).
pub fn archive_files_in(directory: &Path) -> Vec<PathBuf> {
    let Ok(entries) = std::fs::read_dir(directory) else {
        debug!(directory = %directory.display(), "directory not readable");
        return Vec::new();
    };
    entries
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| {
            path.is_file()
                && path
                    .file_name()
                    .map(|n| is_archive_name(&n.to_string_lossy()))
                    .unwrap_or(false)
        })
        .collect()
}

/// Every subdirectory below `directory`, itself excluded. Unreadable
/// subtrees are skipped.
pub fn subdirectories(directory: &Path) -> Vec<PathBuf> {
    WalkDir::new(directory)
        .min_depth(1)
        .into_iter()
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(error) => {
                debug!(%error, "skipping unreadable directory entry");
                None
            }
        })
        .filter(|entry| entry.file_type().is_dir())
        .map(|entry| entry.path().to_path_buf())
        .collect()
}

/// Archive files under `directory`, recursively when asked.
pub fn archive_files_under(directory: &Path, recursive: bool) -> Vec<PathBuf> {
    let mut files = archive_files_in(directory);
    if recursive {
        for subdir in subdirectories(directory) {
            files.extend(archive_files_in(&subdir));
        }
    }
    files
}
