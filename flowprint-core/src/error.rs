//! Error types for flowprint-core.
//!
//! Errors here cover startup and I/O paths only: resource-archive
//! ingestion and the output writer. Packet parsing never produces an
//! error value; malformed input yields an empty view through cursor
//! null-propagation (see [`crate::cursor`]).

use thiserror::Error;

/// Main error type for flowprint-core operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Error while ingesting the resource archive
    #[error("archive error: {0}")]
    Archive(#[from] ArchiveError),

    /// Error in the output writer
    #[error("output error: {0}")]
    Output(#[from] OutputError),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors related to resource-archive ingestion.
#[derive(Error, Debug)]
pub enum ArchiveError {
    /// A required archive member was not found
    #[error("resource archive is missing required file: {name}")]
    MissingFile { name: &'static str },

    /// VERSION file did not carry the expected qualifier count
    #[error("VERSION qualifier count {found} != {expected}")]
    QualifierMismatch { found: usize, expected: usize },

    /// Malformed record inside an archive member
    #[error("{file}: invalid record: {reason}")]
    InvalidRecord { file: &'static str, reason: String },
}

/// Errors from the output thread.
#[derive(Error, Debug)]
pub enum OutputError {
    /// Output file could not be opened
    #[error("could not open output file {path}: {source}")]
    Open {
        path: String,
        source: std::io::Error,
    },

    /// Ring storage could not be allocated
    #[error("failed to allocate {requested} ring queues")]
    RingAllocation { requested: usize },
}

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;
