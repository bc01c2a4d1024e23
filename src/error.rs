//! Error type shared by instruction resolution, shard planning and reading.
//!
//! Pure computations (parsing, resolution, planning, config merging) return
//! [`SliceResult`]. Filesystem-facing code returns [`anyhow::Result`] and carries a
//! [`SliceError`] inside when the failure is one of the validation kinds below, so
//! callers can still tell "split doesn't exist yet" apart from "malformed spec":
//!
//! ```
//! use ironshard::error::{error_kind, ErrorKind, SliceError};
//!
//! let err = anyhow::Error::new(SliceError::new(ErrorKind::UnknownSplit, "no split `dev`"));
//! assert_eq!(error_kind(&err), Some(ErrorKind::UnknownSplit));
//! ```

use std::error::Error;
use std::fmt;

/// Distinguishable failure categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Malformed slice specification string.
    Format,
    /// The instruction names a split absent from the persisted metadata.
    UnknownSplit,
    /// An absolute bound exceeds the split length, or the range is inverted.
    OutOfRange,
    /// Too few records for percent slicing or for the requested shard count.
    InsufficientExamples,
    /// Instructions with different rounding policies were added together.
    RoundingMismatch,
    /// The split has no persisted records; the dataset was never generated.
    EmptyShard,
    /// Two records hashed to the same de-duplication key while writing.
    DuplicateKey,
    /// The instruction resolved to no file at all.
    EmptySelection,
    /// The realized record count differs from the planned count.
    Cardinality,
    /// Persisted metadata is inconsistent or refers to missing files.
    Metadata,
    /// A record failed its CRC check.
    Checksum,
    /// Two configs carry different non-default values for the same field.
    ConfigConflict,
}

/// Validation error with a kind and a human readable message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SliceError {
    pub kind: ErrorKind,
    pub message: String,
}

impl fmt::Display for SliceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.message)
    }
}

impl Error for SliceError {}

impl SliceError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn format(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Format, message)
    }

    pub fn out_of_range(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::OutOfRange, message)
    }

    pub fn insufficient(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InsufficientExamples, message)
    }

    pub fn metadata(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Metadata, message)
    }
}

pub type SliceResult<T> = Result<T, SliceError>;

/// Recover the [`ErrorKind`] of a [`SliceError`] travelling inside an `anyhow::Error`,
/// looking through any context layers added on the way up.
#[must_use]
pub fn error_kind(err: &anyhow::Error) -> Option<ErrorKind> {
    err.chain()
        .find_map(|cause| cause.downcast_ref::<SliceError>())
        .map(|e| e.kind)
}
