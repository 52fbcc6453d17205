use std::io;
use std::sync::Arc;
use thiserror::Error;

/// Convenient type alias for `Result<T, SmuxError>`.
pub type Result<T> = std::result::Result<T, SmuxError>;

/// Error types for the smux duplex.
///
/// Most variants are fatal: once they surface from the inbound or outbound
/// path the whole duplex is torn down. `PeerWindowOverflow` and
/// `UnknownCommand` are the exceptions, see [`SmuxError::is_recoverable`].
#[derive(Debug, Error)]
pub enum SmuxError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Invalid protocol version: {0}")]
    InvalidVersion(u8),

    #[error("Invalid stream ID: {0}")]
    InvalidStream(u32),

    #[error("Malformed fragment: expected {expected} bytes, got {actual}")]
    MalformedFragment { expected: usize, actual: usize },

    #[error("Fragment too large: {size} bytes (max: {max})")]
    FragmentTooLarge { size: usize, max: usize },

    #[error("Reassembly buffer overflow: {needed} bytes needed (capacity: {capacity})")]
    BufferOverflow { needed: usize, capacity: usize },

    #[error("Peer window reached: {inflight} bytes in flight (window: {window})")]
    PeerWindowOverflow { inflight: u64, window: u64 },

    #[error("Unknown command: {0}")]
    UnknownCommand(u8),

    #[error("Duplex closed")]
    Closed,

    #[error("Duplex aborted: {0}")]
    Aborted(Arc<SmuxError>),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl SmuxError {
    /// Whether the operation that produced this error may be retried without
    /// tearing down the duplex.
    pub fn is_recoverable(&self) -> bool {
        match self {
            SmuxError::Io(e) => matches!(
                e.kind(),
                io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted
            ),
            SmuxError::PeerWindowOverflow { .. } | SmuxError::UnknownCommand(_) => true,
            SmuxError::InvalidVersion(_)
            | SmuxError::InvalidStream(_)
            | SmuxError::MalformedFragment { .. }
            | SmuxError::FragmentTooLarge { .. }
            | SmuxError::BufferOverflow { .. }
            | SmuxError::Closed
            | SmuxError::Aborted(_)
            | SmuxError::Config(_) => false,
        }
    }
}
