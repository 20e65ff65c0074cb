//! The blocking ingestion queue

use pakdex_format::PkgMetadata;
use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::{Condvar, Mutex};

/// One unit of ingestion work.
#[derive(Debug)]
pub enum IngestionRequest {
    /// Parse a single archive file.
    Path(PathBuf),
    /// Enumerate archive files under a directory and parse each in turn.
    Directory { path: PathBuf, recursive: bool },
    /// Publish an already-constructed record (e.g. from a remote download).
    Record(Box<PkgMetadata>),
    /// Drain-and-stop sentinel: the worker finishes everything queued ahead
    /// of this and then returns.
    Stop,
}

/// Blocking, order-preserving multi-producer/single-consumer queue.
///
/// All operations are fully synchronized internally; this is the only
/// structure in the pipeline touched by more than one context without an
/// external serialization point.
#[derive(Debug, Default)]
pub struct IngestionQueue {
    items: Mutex<VecDeque<IngestionRequest>>,
    available: Condvar,
}

impl IngestionQueue {
    pub fn new() -> Self {
        Self {
            items: Mutex::new(VecDeque::new()),
            available: Condvar::new(),
        }
    }

    /// Append one request and wake one waiting consumer.
    pub fn push(&self, request: IngestionRequest) {
        if let Ok(mut items) = self.items.lock() {
            items.push_back(request);
            self.available.notify_one();
        }
    }

    /// Append a batch in order and wake one waiting consumer.
    pub fn push_all<I: IntoIterator<Item = IngestionRequest>>(&self, requests: I) {
        if let Ok(mut items) = self.items.lock() {
            items.extend(requests);
            self.available.notify_one();
        }
    }

    /// Block until a request is available, then return it.
    pub fn pop(&self) -> IngestionRequest {
        let mut items = match self.items.lock() {
            Ok(items) => items,
            // A poisoned queue can only mean a crashed producer mid-push;
            // treat it as shutdown.
            Err(_) => return IngestionRequest::Stop,
        };
        loop {
            if let Some(request) = items.pop_front() {
                return request;
            }
            items = match self.available.wait(items) {
                Ok(items) => items,
                Err(_) => return IngestionRequest::Stop,
            };
        }
    }

    pub fn len(&self) -> usize {
        self.items.lock().map(|items| items.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
