//! Error types for the BIN log parser library.

use std::fmt;

/// Result type alias for BIN log operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can abort a decoding run.
///
/// Per-frame problems (unknown message types, truncated tails, undecodable
/// schemas) are never errors; they surface as [`Warning`](crate::Warning)s
/// instead.
#[derive(Debug)]
pub enum Error {
    /// Invalid BIN file structure (e.g. the self-describing FMT schema cannot be decoded)
    InvalidFormat(String),

    /// I/O error occurred while opening, mapping or reading the file
    Io(std::io::Error),

    /// A worker failed hard while decoding one segment
    Segment {
        /// Index of the byte range assigned to the failed worker
        segment_id: usize,
        /// What went wrong
        detail: String,
    },

    /// Spill file serialization or deserialization error
    Spill(String),

    /// The run was cancelled before the merge completed
    Cancelled,

    /// Generic error with message
    Other(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::InvalidFormat(msg) => write!(f, "Invalid BIN format: {}", msg),
            Error::Io(err) => write!(f, "I/O error: {}", err),
            Error::Segment { segment_id, detail } => {
                write!(f, "Segment {} failed: {}", segment_id, detail)
            }
            Error::Spill(msg) => write!(f, "Spill error: {}", msg),
            Error::Cancelled => write!(f, "Decoding run was cancelled"),
            Error::Other(msg) => write!(f, "{}", msg),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err)
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Spill(err.to_string())
    }
}

impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Error::Other(err.to_string())
    }
}
