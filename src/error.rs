//! Crate-wide error type.

use std::{fmt, io};

/// The taxonomy of error kinds a public operation can return.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GptErrorKind {
    /// Any on-medium inconsistency: wrong magic/version, CRC mismatch,
    /// out-of-range fields, mirror divergence.
    BadPartTable,
    /// Caller passed a non-GPT partition to a partition query.
    BadArgument,
    /// Backup location cannot be determined, or exceeds the medium.
    OutOfRange,
    /// Allocation failure, or multiplicative overflow computing `entries_size`.
    OutOfMemory,
    /// Sector-size change between read and repair; non-native header size on write.
    NotImplementedYet,
    /// Internal invariant violation; indicates a programmer error in the core.
    Bug,
    /// Transparent pass-through from the block device.
    Io,
}

impl fmt::Display for GptErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            GptErrorKind::BadPartTable => "bad partition table",
            GptErrorKind::BadArgument => "bad argument",
            GptErrorKind::OutOfRange => "out of range",
            GptErrorKind::OutOfMemory => "out of memory",
            GptErrorKind::NotImplementedYet => "not implemented yet",
            GptErrorKind::Bug => "bug",
            GptErrorKind::Io => "I/O error",
        };
        write!(f, "{s}")
    }
}

/// An error produced by a public `gpt-core` operation.
///
/// Carries a [`GptErrorKind`] plus a human-readable message. [`GptError::context`]
/// layers additional explanation onto an error without losing the original
/// message, standing in for the source's process-wide push/pop error slot
/// (see DESIGN.md).
#[derive(Debug, Clone)]
pub struct GptError {
    kind: GptErrorKind,
    message: String,
}

impl GptError {
    /// Build a new error of the given kind.
    pub fn new(kind: GptErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// The kind of this error.
    pub fn kind(&self) -> GptErrorKind {
        self.kind
    }

    /// Prepend a layer of context, preserving the original kind and message.
    pub fn context(mut self, context: impl fmt::Display) -> Self {
        self.message = format!("{context}: {}", self.message);
        self
    }
}

impl fmt::Display for GptError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

impl std::error::Error for GptError {}

impl From<io::Error> for GptError {
    fn from(e: io::Error) -> Self {
        GptError::new(GptErrorKind::Io, e.to_string())
    }
}

/// Convenience alias for results returned by this crate.
pub type Result<T> = std::result::Result<T, GptError>;

/// Adds [`GptError::context`] to any `Result<T, GptError>`.
pub(crate) trait ResultExt<T> {
    fn context(self, context: impl fmt::Display) -> Result<T>;
}

impl<T> ResultExt<T> for Result<T> {
    fn context(self, context: impl fmt::Display) -> Result<T> {
        self.map_err(|e| e.context(context))
    }
}
