//! The error type shared by readers and writers.

use std::io;

use thiserror::Error;

/// Convenience alias used throughout this crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Everything that can go wrong while reading or writing a PLY file.
///
/// Errors are not recovered from: once an operation on a handle has failed,
/// the handle is poisoned and every further operation (except finishing or
/// dropping it) fails with [`Error::InvalidState`].
#[derive(Debug, Error)]
pub enum Error {
    /// A type spelling in the header is not one of the accepted seventeen.
    #[error("unknown PLY type \"{0}\"")]
    UnknownType(String),

    /// The format line declares a version other than `1.0`.
    #[error("unsupported PLY version \"{0}\" (only 1.0 is supported)")]
    UnsupportedVersion(String),

    /// A header line starts with something that is no PLY keyword, or a
    /// known keyword is followed by garbage.
    #[error("invalid header line: {0}")]
    UnknownKeyword(String),

    /// A header line is terminated with the wrong line ending. The first
    /// line fixes the convention for the whole header: `ply\r\n` makes it
    /// CRLF, `ply\n` makes it LF. Mixing both is rejected.
    #[error("line terminator does not match the convention set by the first line")]
    BadLineTerminator,

    /// A `property` line appeared before any `element` line.
    #[error("property declared before any element")]
    OrphanProperty,

    /// An integer literal could not be parsed or is out of range. Also
    /// reported for list length prefixes that are negative or not integral.
    #[error("invalid integer: {0}")]
    BadInteger(String),

    /// A floating point literal could not be parsed.
    #[error("invalid floating point literal: {0}")]
    BadFloat(String),

    /// The source ran dry in the middle of a token, value or header line.
    #[error("unexpected end of input")]
    UnexpectedEof,

    /// The underlying source or sink failed.
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    /// A schema rule was violated (duplicate names, empty element, invalid
    /// comment text, ...).
    #[error("schema error: {0}")]
    Schema(String),

    /// The schema cannot be modified anymore because the header has already
    /// been written.
    #[error("schema is locked: the header has already been written")]
    SchemaLocked,

    /// The operation is not allowed in the handle's current state.
    #[error("invalid handle state: {0}")]
    InvalidState(&'static str),

    /// More values were written than the declared schema can hold.
    #[error("more values written than the schema declares")]
    TooManyValues,

    /// The writer was finished although declared values are still missing.
    #[error("writer finished before all declared values were written")]
    Underrun,

    /// A read callback requested termination of the read pass.
    #[error("read aborted by callback")]
    Aborted,
}
