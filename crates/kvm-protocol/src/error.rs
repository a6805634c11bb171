//! Error types for device protocol parsing

use thiserror::Error;

/// Errors that can occur while interpreting device output
///
/// Malformed lines from the hardware are expected noise; the state machines
/// drop them without surfacing these errors to callers. The variants exist so
/// the row parsers can report precisely what was wrong in tests and traces.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// Row has the wrong number of whitespace-separated fields
    #[error("invalid row ({expected} fields expected): {row}")]
    InvalidRow {
        /// Expected field count
        expected: usize,
        /// Offending row text
        row: String,
    },

    /// Leading row index did not parse as a number
    #[error("unparseable row index: {0}")]
    InvalidIndex(String),

    /// Row index did not match the expected table position
    #[error("row out of sequence: expected {expected}, got {actual}")]
    RowOutOfSequence {
        /// Expected index
        expected: usize,
        /// Actual index on the wire
        actual: usize,
    },

    /// Confirmation line did not match the known shape
    #[error("malformed confirmation: {0}")]
    MalformedConfirmation(String),

    /// Channel report carried a non-numeric channel
    #[error("invalid channel: {0}")]
    InvalidChannel(String),
}
