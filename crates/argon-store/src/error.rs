//! Error and Result types for argon-store operations.

use crate::record::FieldTag;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// A convenience `Result` type for argon-store operations.
pub type Result<T> = std::result::Result<T, ArgonError>;

/// The error type for store, codec and volume operations.
#[derive(Debug, Error)]
pub enum ArgonError {
    /// Inserted record lacks the designated index field.
    #[error("Record is missing index field {field}")]
    MissingIndexField {
        /// Tag of the designated index field.
        field: FieldTag,
    },

    /// The designated index field is present but not an integer.
    #[error("Index field {field} is not an integer")]
    InvalidIndexField {
        /// Tag of the designated index field.
        field: FieldTag,
    },

    /// Requested field tag is absent from the record.
    #[error("Field not found: {0}")]
    FieldNotFound(FieldTag),

    /// Point lookup or pop on an absent key.
    #[error("Key not found: {0}")]
    KeyNotFound(String),

    /// The backing volume directory does not exist and `CREATE_VOLUME`
    /// was not given.
    #[error("Volume does not exist: {}", .0.display())]
    VolumeMissing(PathBuf),

    /// The datastore file does not exist and `CREATE` was not given.
    #[error("Datastore does not exist: {0}")]
    DatastoreMissing(String),

    /// Volume URL could not be parsed.
    #[error("Invalid volume URL: {0}")]
    InvalidUrl(String),

    /// Bucket width must be a positive integer.
    #[error("Invalid bucket width: {0}")]
    InvalidBucketWidth(i64),

    /// Invalid magic bytes in the datastore log header.
    #[error("Invalid magic bytes: expected ARGN, got {0:?}")]
    InvalidMagic([u8; 4]),

    /// Unsupported datastore log format version.
    #[error("Unsupported version: {0}")]
    UnsupportedVersion(u16),

    /// Log entry checksum does not match expected value.
    #[error("Checksum mismatch: expected {expected}, got {actual}")]
    ChecksumMismatch {
        /// Expected CRC32 checksum.
        expected: u32,
        /// Actual computed CRC32 checksum.
        actual: u32,
    },

    /// Record byte form ended before the declared content.
    #[error("Truncated record: needed {expected} bytes, had {actual}")]
    TruncatedRecord {
        /// Bytes required by the declared content.
        expected: usize,
        /// Bytes actually available.
        actual: usize,
    },

    /// Unknown value type byte in a serialized record.
    #[error("Unknown value type: {0}")]
    UnknownValueType(u8),

    /// Serialized record declares the same field tag twice.
    #[error("Duplicate field tag: {0}")]
    DuplicateField(FieldTag),

    /// Serialized record has bytes past the declared content.
    #[error("Trailing bytes after record: {0}")]
    TrailingBytes(usize),

    /// Bucket blob could not be decoded.
    #[error("Corrupt bucket: {0}")]
    CorruptBucket(String),

    /// Operation on a handle that has been cleaned up.
    #[error("Store is closed")]
    StoreClosed,

    /// Underlying I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}
