//! Pakdex application library: configuration, persistence, the ingestion
//! session and the remote import workflow.

pub mod config;
pub mod remote_import;
pub mod session;
pub mod store;

pub use config::{PakdexConfig, WatchedRoot};
pub use session::Session;
pub use store::MetadataStore;
