//! Ingestion queue and background worker
//!
//! Producers (the watcher, the CLI, the remote import workflow) enqueue
//! [`IngestionRequest`]s; a single worker thread drains the queue, parses
//! archives and hands finished (record, row) pairs to the consumer context.
//! The worker never mutates the index — every result crosses an `mpsc`
//! channel and is applied on the consumer side.

pub mod cancel;
pub mod queue;
pub mod worker;

pub use cancel::CancelToken;
pub use queue::{IngestionQueue, IngestionRequest};
pub use worker::{IndexEvent, IngestionWorker, WorkerHandle};
