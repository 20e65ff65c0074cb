//! The ingestion session
//!
//! Wires the queue, the worker, the watcher and the index together. The
//! thread that owns the [`Session`] is the consumer context: it is the only
//! place the index is mutated, by draining [`IndexEvent`]s. The watcher's
//! signals are pumped into either the queue (adds) or the event channel
//! (removals) by a small forwarding thread, so the watcher never touches
//! the index directly either.

use crate::config::PakdexConfig;
use anyhow::{Context, Result};
use pakdex_format::PkgMetadata;
use pakdex_index::{format_row, SortedIndex};
use pakdex_ingest::{
    CancelToken, IndexEvent, IngestionQueue, IngestionRequest, IngestionWorker, WorkerHandle,
};
use pakdex_watch::{FsWatcher, WatchSignal};
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::info;

/// One live ingestion session: a queue, one worker, one watcher, one index.
pub struct Session {
    index: SortedIndex,
    queue: Arc<IngestionQueue>,
    worker: Option<WorkerHandle>,
    events: mpsc::Receiver<IndexEvent>,
    watcher: FsWatcher,
    pump: Option<JoinHandle<()>>,
}

impl Session {
    /// Start a session, preloading previously stored records. Watched
    /// directories from the configuration are declared immediately; their
    /// initial synchronization happens on the watcher's schedule.
    pub fn start(config: &PakdexConfig, preload: Vec<PkgMetadata>) -> Result<Self> {
        let format = config.format_config();

        let mut index = SortedIndex::new();
        let mut stamp = 0u64;
        for record in preload {
            let row = format_row(&record, stamp, &format);
            stamp += 1;
            index.upsert(record, row);
        }

        let queue = Arc::new(IngestionQueue::new());
        let (events_tx, events) = mpsc::channel();
        let worker = IngestionWorker::spawn(Arc::clone(&queue), events_tx.clone(), format, stamp)
            .context("Failed to spawn ingestion worker")?;

        let (signal_tx, signal_rx) = mpsc::channel();
        let watcher = FsWatcher::spawn(signal_tx).context("Failed to start watcher")?;
        for root in &config.watched_directories {
            watcher.declare(PathBuf::from(&root.path), root.recursive);
        }

        let pump_queue = Arc::clone(&queue);
        let pump = std::thread::Builder::new()
            .name("pakdex-signal-pump".to_string())
            .spawn(move || pump_signals(signal_rx, pump_queue, events_tx))
            .context("Failed to start signal pump")?;

        info!(preloaded = stamp, "session started");
        Ok(Self {
            index,
            queue,
            worker: Some(worker),
            events,
            watcher,
            pump: Some(pump),
        })
    }

    // --- producer surface -------------------------------------------------

    /// Queue a single archive file for ingestion.
    pub fn submit_path(&self, path: PathBuf) {
        self.queue.push(IngestionRequest::Path(path));
    }

    /// Queue a directory for expansion and ingestion.
    pub fn submit_directory(&self, path: PathBuf, recursive: bool) {
        self.queue.push(IngestionRequest::Directory { path, recursive });
    }

    /// Queue an already-parsed record (remote imports).
    pub fn submit_record(&self, record: PkgMetadata) {
        self.queue.push(IngestionRequest::Record(Box::new(record)));
    }

    /// Declare a directory to keep synchronized with the index.
    pub fn declare_watched_directory(&self, path: PathBuf, recursive: bool) {
        self.watcher.declare(path, recursive);
    }

    /// Stop watching a directory. Records already indexed stay.
    pub fn remove_watched_directory(&self, path: &Path) {
        self.watcher.undeclare(path);
    }

    pub fn queue(&self) -> &Arc<IngestionQueue> {
        &self.queue
    }

    /// Token that aborts in-flight ingestion work.
    pub fn cancel_token(&self) -> Option<CancelToken> {
        self.worker.as_ref().map(|worker| worker.cancel_token())
    }

    // --- consumer surface -------------------------------------------------

    pub fn index(&self) -> &SortedIndex {
        &self.index
    }

    pub fn index_mut(&mut self) -> &mut SortedIndex {
        &mut self.index
    }

    /// Apply everything already published, without blocking.
    pub fn drain_pending(&mut self) {
        while let Ok(event) = self.events.try_recv() {
            apply(&mut self.index, event);
        }
    }

    /// Apply events for up to `duration`, then return.
    pub fn drain_for(&mut self, duration: Duration) {
        let deadline = std::time::Instant::now() + duration;
        loop {
            let Some(remaining) = deadline.checked_duration_since(std::time::Instant::now())
            else {
                return;
            };
            match self.events.recv_timeout(remaining) {
                Ok(event) => apply(&mut self.index, event),
                Err(_) => return,
            }
        }
    }

    /// Apply events until the pipeline has been quiet for `idle` and the
    /// queue is empty.
    pub fn drain_until_idle(&mut self, idle: Duration) {
        loop {
            match self.events.recv_timeout(idle) {
                Ok(event) => apply(&mut self.index, event),
                Err(mpsc::RecvTimeoutError::Timeout) => {
                    if self.queue.is_empty() {
                        return;
                    }
                }
                Err(mpsc::RecvTimeoutError::Disconnected) => return,
            }
        }
    }

    /// Graceful shutdown: queued work is processed, then every published
    /// event is applied before the index is handed back.
    pub fn shutdown(self) -> SortedIndex {
        let Session {
            mut index,
            queue: _queue,
            worker,
            events,
            watcher,
            pump,
        } = self;

        // Stop the watcher first so no new work arrives while draining.
        drop(watcher);
        if let Some(pump) = pump {
            let _ = pump.join();
        }
        if let Some(worker) = worker {
            worker.shutdown();
        }
        while let Ok(event) = events.try_recv() {
            apply(&mut index, event);
        }
        info!(records = index.len(), "session shut down");
        index
    }

    /// Abrupt shutdown: the current unit of work is aborted; whatever was
    /// already published is still applied.
    pub fn abort(self) -> SortedIndex {
        let Session {
            mut index,
            queue: _queue,
            worker,
            events,
            watcher,
            pump,
        } = self;

        drop(watcher);
        if let Some(pump) = pump {
            let _ = pump.join();
        }
        if let Some(worker) = worker {
            worker.abort();
        }
        while let Ok(event) = events.try_recv() {
            apply(&mut index, event);
        }
        index
    }
}

/// Forward watcher signals: adds become queue work (the worker parses and
/// publishes), removals go straight to the consumer as index events.
fn pump_signals(
    signals: mpsc::Receiver<WatchSignal>,
    queue: Arc<IngestionQueue>,
    events: mpsc::Sender<IndexEvent>,
) {
    for signal in signals {
        let forwarded = match signal {
            WatchSignal::Ingest(path) => {
                queue.push(IngestionRequest::Path(path));
                Ok(())
            }
            WatchSignal::Remove(path) => {
                events.send(IndexEvent::RemovePath(path.to_string_lossy().into_owned()))
            }
            WatchSignal::RemoveTree(path) => {
                events.send(IndexEvent::RemoveTree(path.to_string_lossy().into_owned()))
            }
            WatchSignal::SyncPrune { dirs } => events.send(IndexEvent::PruneMissing(dirs)),
        };
        if forwarded.is_err() {
            return;
        }
    }
}

fn apply(index: &mut SortedIndex, event: IndexEvent) {
    match event {
        IndexEvent::Upsert { record, row } => index.upsert(*record, row),
        IndexEvent::RemovePath(path) => {
            index.remove_path(&path);
        }
        IndexEvent::RemoveTree(prefix) => {
            index.remove_under(&prefix);
        }
        IndexEvent::PruneMissing(dirs) => {
            index.prune_missing(&dirs);
        }
    }
}
