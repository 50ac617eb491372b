//! Error types for transport sessions.

use std::collections::TryReserveError;
use std::io;
use std::time::Duration;

use thiserror::Error;

/// Errors that can occur while establishing or driving a transport session.
#[derive(Debug, Error)]
pub enum Error {
    /// The host/port pair could not be resolved to any stream address.
    #[error("unable to resolve {host}:{port}: {source}")]
    Resolution {
        /// Hostname that was looked up.
        host: String,
        /// Port that was looked up.
        port: u16,
        /// Underlying resolver error.
        #[source]
        source: io::Error,
    },

    /// Every resolved candidate refused the connection.
    #[error("unable to connect to {host}:{port} after {attempts} attempt(s)")]
    Unreachable {
        /// Hostname that was resolved.
        host: String,
        /// Port that was dialed.
        port: u16,
        /// Number of candidate addresses tried.
        attempts: usize,
    },

    /// The read buffer could not be allocated after a successful connect.
    #[error("unable to allocate the session read buffer: {0}")]
    Allocation(#[from] TryReserveError),

    /// TLS context establishment over the connected socket failed.
    #[error("TLS upgrade failed: {0}")]
    SecureUpgrade(#[source] io::Error),

    /// The session host is not usable as a TLS server name.
    #[error("Invalid DNS name: {0}")]
    InvalidDnsName(#[from] rustls::pki_types::InvalidDnsNameError),

    /// I/O error on the connected stream.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A read or write did not complete within the configured timeout.
    #[error("Operation timed out after {0:?}")]
    Timeout(Duration),

    /// A single line did not fit into the fixed read buffer.
    #[error("line exceeds the {capacity} byte read buffer")]
    LineTooLong {
        /// Capacity of the read buffer.
        capacity: usize,
    },

    /// The session has already been closed or never finished connecting.
    #[error("session is closed")]
    Closed,

    /// Fewer bytes were transferred than the caller handed over.
    #[error("short transfer: {transferred} of {expected} bytes")]
    ShortTransfer {
        /// Bytes actually transferred.
        transferred: usize,
        /// Bytes the caller expected to transfer.
        expected: usize,
    },
}

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;
