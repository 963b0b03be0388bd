//! Error types for the X80 station
//!
//! # Error Recovery Strategies
//!
//! Different error types require different recovery approaches:
//!
//! ## Transient Errors (Watchdog Recovers)
//!
//! - **`Io`**: UDP send/recv or bind failure. The medium is Wi-Fi and the
//!   peer offers no reliability layer; transport errors feed the watchdog's
//!   failure counters and are recovered by a socket rebind, never by retry
//!   inside the sender itself.
//!
//! ## Protocol Errors (Count and Drop)
//!
//! - **`Decode`**: A packet failed structural validation (header, tail,
//!   length, or checksum). The link is lossy by design: these are counted
//!   in the link statistics and dropped. They never reach a collaborator.
//!
//! ## Configuration Errors (Fix and Restart)
//!
//! - **`Config`**: Configuration file is invalid. Fatal to `connect()`,
//!   not to the process.
//!
//! ## Shutdown
//!
//! - **`ShutdownTimeout`**: One or more tasks did not join within the 2 s
//!   grace window. Logged; the offending threads are detached.

use thiserror::Error;

/// Structural packet-validation failure.
///
/// Returned by the decode paths in [`crate::protocol`]; encoders are total
/// and never fail.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeError {
    #[error("invalid length")]
    InvalidLength,

    #[error("bad header")]
    BadHeader,

    #[error("bad tail")]
    BadTail,

    #[error("checksum mismatch")]
    ChecksumMismatch,
}

/// Errors that can occur in the X80 station
///
/// See module-level documentation for recovery strategies.
#[derive(Error, Debug)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("decode error: {0}")]
    Decode(#[from] DecodeError),

    #[error("config error: {0}")]
    Config(String),

    #[error("unknown autopilot pattern: {0}")]
    UnknownPattern(String),

    #[error("link is not connected")]
    NotConnected,

    #[error("tasks did not stop within the shutdown grace window")]
    ShutdownTimeout,

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, Error>;
