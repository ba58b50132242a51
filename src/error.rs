use std::io;
use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Everything that can go wrong while opening or reading a trajectory.
///
/// Decoding errors are local to the record being processed and surface
/// immediately; batch operations abort on the first failure rather than
/// returning partial results.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    #[error("file not found: {}", path.display())]
    FileNotFound { path: PathBuf },

    #[error("wrong magic number {found:#06x}, expected {:#06x}", crate::header::MAGIC)]
    WrongMagicNumber { found: i32 },

    #[error("empty or invalid trajectory")]
    EmptyOrInvalidTrajectory,

    #[error("truncated input while reading {context}")]
    TruncatedInput { context: &'static str },

    #[error("corrupt frame: {reason}")]
    CorruptFrame { reason: &'static str },

    #[error("end of trajectory")]
    EndOfTrajectory,

    #[error("shape mismatch for the {buffer} buffer: expected {expected} elements, found {found}")]
    ShapeMismatch {
        buffer: &'static str,
        expected: usize,
        found: usize,
    },

    #[error("selection out of range: {kind} index {index} is not below {bound}")]
    OutOfRangeSelection {
        kind: &'static str,
        index: u64,
        bound: u64,
    },

    #[error("reader is closed")]
    ReaderClosed,

    #[error(transparent)]
    Io(#[from] io::Error),
}

impl Error {
    /// Classify an I/O failure from a bounded read: running off the end of
    /// the source is a truncation, anything else passes through.
    pub(crate) fn from_read(err: io::Error, context: &'static str) -> Self {
        if err.kind() == io::ErrorKind::UnexpectedEof {
            Self::TruncatedInput { context }
        } else {
            Self::Io(err)
        }
    }
}
