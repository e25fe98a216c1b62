use std::io;
use std::net::SocketAddr;
use std::path::PathBuf;

use thiserror::Error;

/// Everything that can go wrong in either half of a transfer.
///
/// Variants fall into two tiers. Fatal ones end the process after the
/// session has been released; recoverable ones only cost the current file.
#[derive(Debug, Error)]
pub enum TransferError {
    #[error("{0}")]
    Usage(String),

    #[error("Port number is invalid: {0}")]
    InvalidPort(String),

    #[error("Port number is privileged: {0}")]
    PrivilegedPort(i64),

    #[error("Failed to allocate memory for a {0} byte buffer")]
    Alloc(usize),

    #[error("Failed to create socket: {0}")]
    Socket(#[source] io::Error),

    #[error("setsockopt failed: {0}")]
    SocketOption(#[source] io::Error),

    #[error("Failed to bind socket to {addr}: {source}")]
    Bind { addr: SocketAddr, source: io::Error },

    #[error("listen() failed: {0}")]
    Listen(#[source] io::Error),

    #[error("Invalid IP address: {0}")]
    InvalidAddress(String),

    #[error("connecting to {addr}: {source}")]
    Connect { addr: SocketAddr, source: io::Error },

    #[error("Interrupted")]
    Interrupted,

    #[error("transfer buffer used after release")]
    BufferReleased,

    #[error("While attempting to accept a connection: {0}")]
    Accept(#[source] io::Error),

    #[error("Failed to open: {path}: {source}")]
    Open { path: PathBuf, source: io::Error },

    #[error("Unable to read: {path}: {source}")]
    Read { path: PathBuf, source: io::Error },

    #[error("While sending data: sent {sent} of {expected} bytes")]
    Send { sent: usize, expected: usize },

    #[error("Reading from socket: {0}")]
    Receive(#[source] io::Error),

    #[error("Unable to create: {path}: {source}")]
    Create { path: PathBuf, source: io::Error },

    #[error("Unable to write: {path}: wrote {written} of {expected} bytes")]
    Write {
        path: PathBuf,
        written: usize,
        expected: usize,
    },
}

impl TransferError {
    /// Whether this error ends the process rather than just the current file.
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            TransferError::Accept(_)
                | TransferError::Open { .. }
                | TransferError::Read { .. }
                | TransferError::Send { .. }
                | TransferError::Receive(_)
                | TransferError::Create { .. }
                | TransferError::Write { .. }
        )
    }
}
