//! Typed errors raised by the decoding helpers.
//!
//! Helpers only define behavior for well-formed inputs. Anything else (a batch of
//! the wrong size, a step past the end of the ground-truth buffer, a stop signal
//! that never arrived) aborts the decode with one of these variants.

use thiserror::Error;

/// Result alias for helper operations.
pub type Result<T> = std::result::Result<T, HelperError>;

/// Errors produced by [`crate::helper`] and its collaborators.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum HelperError {
    /// A tensor had an unexpected shape.
    #[error("Shape mismatch for {what}: expected {expected:?}, got {actual:?}")]
    ShapeMismatch {
        /// Which tensor was checked.
        what: &'static str,
        /// Expected dimensions.
        expected: Vec<usize>,
        /// Actual dimensions.
        actual: Vec<usize>,
    },

    /// An index fell outside the buffer it addresses.
    #[error("Index out of range for {what}: index {index}, length {len}")]
    IndexOutOfRange {
        /// Which buffer was indexed.
        what: &'static str,
        /// Requested index.
        index: usize,
        /// Buffer length.
        len: usize,
    },

    /// Configuration values outside their valid domain.
    #[error("Invalid helper configuration: {0}")]
    InvalidConfig(String),

    /// Stop-token masking is enabled but no stop prediction was supplied.
    #[error("Stop-token predictions are required when mask_decoder_sequence is enabled")]
    MissingStopToken,

    /// Helpers need at least one sequence.
    #[error("Batch must contain at least one sequence")]
    EmptyBatch,
}

impl HelperError {
    pub(crate) fn shape(what: &'static str, expected: &[usize], actual: &[usize]) -> Self {
        Self::ShapeMismatch {
            what,
            expected: expected.to_vec(),
            actual: actual.to_vec(),
        }
    }
}
