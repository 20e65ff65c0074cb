//! Watched-directory reconciliation and archive discovery
//!
//! A [`FsWatcher`] keeps a user-declared set of (path, recursive) watch
//! roots synchronized with the consumer: native watch handles deliver
//! create/modify/delete signals, and a low-frequency reconciliation loop
//! re-checks each root's existence so unmounted and remounted storage is
//! picked up even when no watch event is ever delivered.

pub mod error;
pub mod scan;
pub mod watcher;

pub use error::{Result, WatchError};
pub use scan::{archive_files_in, archive_files_under, is_archive_name, subdirectories};
pub use watcher::{FsWatcher, WatchSignal, WatchedDirectory};

/// A file below this size cannot yet hold a readable archive header.
pub const MIN_ARCHIVE_LEN: u64 = 0x1000;

/// File name extensions treated as archive-like. Partial-download suffixes
/// are included so in-progress transfers surface as soon as their header is
/// complete.
pub const ARCHIVE_EXTENSIONS: &[&str] = &[
    ".pkg",
    ".part",
    ".crdownload",
    ".download",
    ".opdownload",
    ".!ut",
    ".!bt",
    ".!qB",
];
