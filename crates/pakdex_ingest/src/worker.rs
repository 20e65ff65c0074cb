//! The background ingestion worker
//!
//! Design principles:
//! - One worker thread per source collection, draining one queue
//! - run() consumes the worker - the loop can only be started once
//! - Per-file parse failures are logged and never abort a batch
//! - Finished records cross to the consumer as [`IndexEvent`]s; the worker
//!   itself never touches the index

use crate::cancel::CancelToken;
use crate::queue::{IngestionQueue, IngestionRequest};
use pakdex_format::{PkgError, PkgMetadata};
use pakdex_index::{format_row, DisplayRow, FormatConfig};
use pakdex_watch::archive_files_under;
use std::path::Path;
use std::sync::mpsc;
use std::sync::Arc;
use std::thread::JoinHandle;
use tracing::{debug, info, warn};

/// Mutation applied to the index on the consumer side.
#[derive(Debug)]
pub enum IndexEvent {
    /// Insert or replace one record and its display row.
    Upsert {
        record: Box<PkgMetadata>,
        row: DisplayRow,
    },
    /// Drop the record with exactly this path.
    RemovePath(String),
    /// Drop every record whose path falls under this directory.
    RemoveTree(String),
    /// Drop records in these directories whose backing file is gone.
    PruneMissing(Vec<String>),
}

/// Handle for a running worker: push further work through `queue`, stop it
/// with [`WorkerHandle::shutdown`].
pub struct WorkerHandle {
    queue: Arc<IngestionQueue>,
    cancel: CancelToken,
    join_handle: JoinHandle<()>,
}

impl WorkerHandle {
    pub fn queue(&self) -> &Arc<IngestionQueue> {
        &self.queue
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Graceful shutdown: everything queued so far is still processed.
    pub fn shutdown(self) {
        self.queue.push(IngestionRequest::Stop);
        let _ = self.join_handle.join();
    }

    /// Abrupt shutdown: abort the current unit of work, drop the rest.
    pub fn abort(self) {
        self.cancel.cancel();
        self.queue.push(IngestionRequest::Stop);
        let _ = self.join_handle.join();
    }
}

/// Single background loop draining the ingestion queue.
pub struct IngestionWorker {
    queue: Arc<IngestionQueue>,
    events: mpsc::Sender<IndexEvent>,
    config: FormatConfig,
    cancel: CancelToken,
    /// Monotonically increasing insertion stamp for the current session.
    stamp: u64,
}

impl IngestionWorker {
    /// Spawn the worker thread. `config` is an immutable snapshot; tag
    /// changes require a fresh worker. `first_stamp` continues the session's
    /// stamp sequence past any preloaded records.
    pub fn spawn(
        queue: Arc<IngestionQueue>,
        events: mpsc::Sender<IndexEvent>,
        config: FormatConfig,
        first_stamp: u64,
    ) -> std::io::Result<WorkerHandle> {
        let cancel = CancelToken::new();
        let worker = Self {
            queue: Arc::clone(&queue),
            events,
            config,
            cancel: cancel.clone(),
            stamp: first_stamp,
        };
        let join_handle = std::thread::Builder::new()
            .name("pakdex-ingest".to_string())
            .spawn(move || worker.run())?;
        Ok(WorkerHandle {
            queue,
            cancel,
            join_handle,
        })
    }

    /// The worker loop. Returns when the stop sentinel is popped or the
    /// consumer goes away.
    fn run(mut self) {
        info!("ingestion worker started");
        loop {
            match self.queue.pop() {
                IngestionRequest::Stop => {
                    info!("ingestion worker stopping");
                    return;
                }
                IngestionRequest::Path(path) => {
                    if self.ingest_file(&path).is_err() {
                        return;
                    }
                }
                IngestionRequest::Directory { path, recursive } => {
                    if self.ingest_directory(&path, recursive).is_err() {
                        return;
                    }
                }
                IngestionRequest::Record(record) => {
                    if self.publish(*record).is_err() {
                        return;
                    }
                }
            }
        }
    }

    /// Parse one file and publish it. Parse failures are logged and
    /// swallowed; only a dropped consumer ends the loop.
    fn ingest_file(&mut self, path: &Path) -> Result<(), ConsumerGone> {
        match PkgMetadata::from_path(path) {
            Ok(record) => self.publish(record),
            Err(PkgError::InvalidMagic(magic)) => {
                warn!(path = %path.display(), magic = %format!("{magic:#010x}"), "not an archive, skipping");
                Ok(())
            }
            Err(error) => {
                warn!(path = %path.display(), %error, "failed to parse archive, skipping");
                Ok(())
            }
        }
    }

    /// Expand a directory into per-file work, checking for cancellation
    /// between files so a long recursive scan can be aborted promptly.
    fn ingest_directory(&mut self, path: &Path, recursive: bool) -> Result<(), ConsumerGone> {
        let files = archive_files_under(path, recursive);
        debug!(path = %path.display(), recursive, count = files.len(), "expanding directory request");
        for file in files {
            if self.cancel.is_cancelled() {
                warn!(path = %path.display(), "directory ingestion interrupted");
                return Ok(());
            }
            self.ingest_file(&file)?;
        }
        Ok(())
    }

    fn publish(&mut self, record: PkgMetadata) -> Result<(), ConsumerGone> {
        let row = format_row(&record, self.stamp, &self.config);
        self.stamp += 1;
        self.events
            .send(IndexEvent::Upsert {
                record: Box::new(record),
                row,
            })
            .map_err(|_| {
                info!("consumer channel closed, worker exiting");
                ConsumerGone
            })
    }
}

/// The consumer dropped its event receiver; nothing left to publish to.
struct ConsumerGone;

#[cfg(test)]
mod tests {
    use super::*;
    use pakdex_index::Column;
    use std::path::PathBuf;
    use std::time::Duration;

    /// Minimal valid archive: magic, one digest-table entry, zeroed digests.
    fn minimal_archive() -> Vec<u8> {
        let mut buffer = vec![0u8; 0x2060];
        buffer[0..4].copy_from_slice(&pakdex_format::MAGIC.to_be_bytes());
        buffer[0x10..0x14].copy_from_slice(&1u32.to_be_bytes()); // entry_count
        buffer[0x18..0x1C].copy_from_slice(&0x2020u32.to_be_bytes()); // table_offset
        // entry 0: id 0x1 (digest table), offset 0x2000, size 0x20
        buffer[0x2020..0x2024].copy_from_slice(&1u32.to_be_bytes());
        buffer[0x2030..0x2034].copy_from_slice(&0x2000u32.to_be_bytes());
        buffer[0x2034..0x2038].copy_from_slice(&0x20u32.to_be_bytes());
        buffer
    }

    fn write_archive(path: &Path) {
        std::fs::write(path, minimal_archive()).unwrap();
    }

    fn spawn_worker() -> (WorkerHandle, mpsc::Receiver<IndexEvent>) {
        let queue = Arc::new(IngestionQueue::new());
        let (tx, rx) = mpsc::channel();
        let handle = IngestionWorker::spawn(queue, tx, FormatConfig::default(), 0).unwrap();
        (handle, rx)
    }

    fn expect_upsert(rx: &mpsc::Receiver<IndexEvent>) -> (Box<PkgMetadata>, DisplayRow) {
        match rx.recv_timeout(Duration::from_secs(5)).unwrap() {
            IndexEvent::Upsert { record, row } => (record, row),
            other => panic!("expected upsert, got {other:?}"),
        }
    }

    #[test]
    fn test_single_path_is_parsed_and_published() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("one.pkg");
        write_archive(&path);

        let (handle, rx) = spawn_worker();
        handle.queue().push(IngestionRequest::Path(path.clone()));

        let (record, row) = expect_upsert(&rx);
        assert_eq!(record.path, path.to_string_lossy());
        assert_eq!(row.cell(Column::Index), "0");
        handle.shutdown();
    }

    #[test]
    fn test_directory_expansion_skips_bad_files() {
        let dir = tempfile::tempdir().unwrap();
        write_archive(&dir.path().join("good1.pkg"));
        write_archive(&dir.path().join("good2.pkg"));
        std::fs::write(dir.path().join("bad.pkg"), b"not an archive").unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();
        write_archive(&dir.path().join("sub/deep.pkg"));

        let (handle, rx) = spawn_worker();
        handle.queue().push(IngestionRequest::Directory {
            path: dir.path().to_path_buf(),
            recursive: true,
        });
        handle.queue().push(IngestionRequest::Stop);

        let mut published = Vec::new();
        while let Ok(event) = rx.recv_timeout(Duration::from_secs(5)) {
            if let IndexEvent::Upsert { record, .. } = event {
                published.push(record.filename.clone());
            }
        }
        published.sort();
        assert_eq!(published, ["deep.pkg", "good1.pkg", "good2.pkg"]);
    }

    #[test]
    fn test_non_recursive_directory_stays_shallow() {
        let dir = tempfile::tempdir().unwrap();
        write_archive(&dir.path().join("top.pkg"));
        std::fs::create_dir(dir.path().join("sub")).unwrap();
        write_archive(&dir.path().join("sub/deep.pkg"));

        let (handle, rx) = spawn_worker();
        handle.queue().push(IngestionRequest::Directory {
            path: dir.path().to_path_buf(),
            recursive: false,
        });

        let (record, _) = expect_upsert(&rx);
        assert_eq!(record.filename, "top.pkg");
        assert!(rx.recv_timeout(Duration::from_millis(300)).is_err());
        handle.shutdown();
    }

    #[test]
    fn test_prebuilt_record_passes_through() {
        let record = PkgMetadata::from_bytes(&minimal_archive()).unwrap();
        let (handle, rx) = spawn_worker();
        handle
            .queue()
            .push(IngestionRequest::Record(Box::new(record)));

        let (published, _) = expect_upsert(&rx);
        assert_eq!(published.header.entry_count, 1);
        handle.shutdown();
    }

    #[test]
    fn test_stamps_increase_monotonically() {
        let dir = tempfile::tempdir().unwrap();
        write_archive(&dir.path().join("a.pkg"));
        write_archive(&dir.path().join("b.pkg"));

        let (handle, rx) = spawn_worker();
        handle
            .queue()
            .push(IngestionRequest::Path(dir.path().join("a.pkg")));
        handle
            .queue()
            .push(IngestionRequest::Path(dir.path().join("b.pkg")));

        let (_, first) = expect_upsert(&rx);
        let (_, second) = expect_upsert(&rx);
        assert_eq!(first.cell(Column::Index), "0");
        assert_eq!(second.cell(Column::Index), "1");
        handle.shutdown();
    }

    #[test]
    fn test_cancelled_directory_expansion_publishes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        for i in 0..4 {
            write_archive(&dir.path().join(format!("f{i}.pkg")));
        }

        let (handle, rx) = spawn_worker();
        handle.cancel_token().cancel();
        handle.queue().push(IngestionRequest::Directory {
            path: dir.path().to_path_buf(),
            recursive: false,
        });
        handle.queue().push(IngestionRequest::Stop);

        assert!(rx.recv_timeout(Duration::from_millis(500)).is_err());
    }

    #[test]
    fn test_graceful_shutdown_drains_queue_first() {
        let dir = tempfile::tempdir().unwrap();
        write_archive(&dir.path().join("last.pkg"));

        let (handle, rx) = spawn_worker();
        handle
            .queue()
            .push(IngestionRequest::Path(dir.path().join("last.pkg")));
        handle.shutdown();

        let (record, _) = expect_upsert(&rx);
        assert_eq!(record.filename, "last.pkg");
    }

    #[test]
    fn test_missing_file_is_skipped() {
        let (handle, rx) = spawn_worker();
        handle
            .queue()
            .push(IngestionRequest::Path(PathBuf::from("/nonexistent/x.pkg")));
        handle.queue().push(IngestionRequest::Stop);
        assert!(rx.recv_timeout(Duration::from_millis(500)).is_err());
    }
}
