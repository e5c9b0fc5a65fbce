//! Failure of a single transfer attempt.

use std::fmt;

/// Why an attempt did not complete. Collapsed into [`super::Outcome`] by the
/// executor; the message is kept on the job as its last error.
#[derive(Debug)]
pub enum TransferError {
    /// Final response had a status outside 2xx (or a 416 that did not prove
    /// the file complete).
    RequestFailed(u32),
    /// libcurl reported an error (timeout, DNS, connection reset, ...).
    Curl(curl::Error),
    /// Creating, truncating or writing the destination file failed.
    Io(std::io::Error),
    /// A `206` answer to a resume request started neither at the requested
    /// offset nor at byte 0, so its body cannot be placed in the file.
    RangeMismatch { requested: u64, served: Option<u64> },
    /// The stream ended before the known total was on disk.
    Incomplete { expected: u64, received: u64 },
    /// The cancellation token fired during the attempt.
    Cancelled,
}

impl fmt::Display for TransferError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransferError::RequestFailed(code) => write!(f, "HTTP {}", code),
            TransferError::Curl(e) => write!(f, "{}", e),
            TransferError::Io(e) => write!(f, "storage: {}", e),
            TransferError::RangeMismatch { requested, served: Some(start) } => write!(
                f,
                "range mismatch: asked for byte {}, server sent from byte {}",
                requested, start
            ),
            TransferError::RangeMismatch { requested, served: None } => write!(
                f,
                "range mismatch: asked for byte {}, server sent 206 without Content-Range",
                requested
            ),
            TransferError::Incomplete { expected, received } => {
                if *expected == 0 {
                    write!(f, "stream ended after {} bytes with unknown total size", received)
                } else {
                    write!(f, "incomplete: expected {} bytes, got {}", expected, received)
                }
            }
            TransferError::Cancelled => write!(f, "cancelled"),
        }
    }
}

impl std::error::Error for TransferError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            TransferError::Curl(e) => Some(e),
            TransferError::Io(e) => Some(e),
            TransferError::RequestFailed(_)
            | TransferError::RangeMismatch { .. }
            | TransferError::Incomplete { .. }
            | TransferError::Cancelled => None,
        }
    }
}

impl From<curl::Error> for TransferError {
    fn from(e: curl::Error) -> Self {
        TransferError::Curl(e)
    }
}

impl From<std::io::Error> for TransferError {
    fn from(e: std::io::Error) -> Self {
        TransferError::Io(e)
    }
}
