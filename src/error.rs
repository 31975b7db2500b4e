use std::io;

use thiserror::Error;

/// Errors returned by the DCB core.
#[derive(Debug, Error)]
pub enum Error {
    /// Fatal I/O error surfaced from a read or connect path.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    /// No protocol module registered under the requested name.
    #[error("unknown protocol module: {0}")]
    UnknownProtocol(String),
    /// The session was torn down before the DCB could link to it.
    #[error("session no longer accepts links")]
    SessionGone,
    /// A write hit an errno other than EAGAIN/EWOULDBLOCK. The unsent
    /// remainder stays on the write queue; the caller decides whether
    /// to close the DCB.
    #[error("write failed: {0}")]
    WriteFailed(io::Error),
    /// Configuration validation failed.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}
