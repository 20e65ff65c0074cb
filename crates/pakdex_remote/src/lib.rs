//! Minimal FTP client
//!
//! A quick, deliberately incomplete FTP client: enough of the protocol to
//! enumerate directories and pull archive bytes off a remote device. One
//! line-oriented control channel carries three-digit status replies
//! (multi-line continuations are marked by a dash after the code); each
//! transfer opens a fresh data channel at the server-negotiated passive
//! address. After every data transfer exactly one more control reply is
//! consumed so the control channel stays consistent for the next command.
//!
//! Status codes consumed: 120/220/421 (greeting), 230/331/332/530 (login),
//! 200 (type), 227 (passive), 150/226/450/550 (transfers); a 450 reply is
//! retried after a fixed delay.

pub mod client;
pub mod entry;
pub mod error;

pub use client::{Connect, FtpClient};
pub use entry::{RemoteEntry, RemoteEntryKind};
pub use error::{RemoteError, Result};
