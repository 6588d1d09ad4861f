//! Error types returned by this crate.
//!
//! Every failure mode the core can produce is represented by a variant of
//! [`HmmError`]; there is no catch-all "other" bucket because the failure
//! surface is fully enumerated (malformed files, type mismatches, and the
//! NaN write guard are the only ways a caller-visible error can arise).

use thiserror::Error;

/// Errors produced while constructing, loading, saving, or querying an HMM
/// state machine or expectation container.
#[derive(Debug, Error)]
pub enum HmmError {
    /// The type tag on disk (or passed to a constructor) does not match the
    /// variant the caller asked for, e.g. loading a vanilla file with the
    /// `ContinuousPair` loader.
    #[error("wrong model type: expected one of {expected:?}, found {found}")]
    WrongModelType {
        /// Type tags the loader would have accepted.
        expected: Vec<u32>,
        /// Type tag actually present in the file or value.
        found: u32,
    },

    /// A file failed to parse: wrong token count, missing field, or a token
    /// that didn't parse as a number where one was expected.
    #[error("malformed file {path}: {detail}")]
    MalformedFile {
        /// Path of the file that failed to parse.
        path: String,
        /// Human-readable description of what went wrong and where.
        detail: String,
    },

    /// A NaN was detected among the values about to be written to disk; the
    /// write was suppressed and no partial file was produced.
    #[error("refusing to write non-finite parameter to {path}: {detail}")]
    NonFiniteParameter {
        /// Path that would have been written.
        path: String,
        /// Which field was non-finite.
        detail: String,
    },

    /// A k-mer index, state index, or skip bin fell outside its declared
    /// domain. This always indicates a programming bug (the value should
    /// have been validated before this point), never bad input data.
    #[error("index out of range: {what} = {value}, valid range is 0..{bound}")]
    IndexOutOfRange {
        /// Name of the quantity that was out of range.
        what: &'static str,
        /// The offending value.
        value: i64,
        /// Exclusive upper bound of the valid range.
        bound: i64,
    },
}

/// Convenience alias for this crate's `Result` type.
pub type Result<T> = std::result::Result<T, HmmError>;
