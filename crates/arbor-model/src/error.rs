//! Error types shared by the arbor crates.

use thiserror::Error;

/// Errors raised while building or evaluating a kinematic tree.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ArborError {
    /// An input vector or matrix has the wrong size for the tree.
    #[error("dimension mismatch for {what}: expected {expected}, got {actual}")]
    Dimension {
        /// Which input was checked.
        what: &'static str,
        /// Size required by the tree.
        expected: usize,
        /// Size that was supplied.
        actual: usize,
    },

    /// A segment, body or DoF index is out of range.
    #[error("{what} index {index} out of range (have {len})")]
    Index {
        /// Kind of item being indexed.
        what: &'static str,
        /// The offending index.
        index: usize,
        /// Number of available items.
        len: usize,
    },

    /// A lookup by name did not resolve.
    #[error("{what} not found: {name}")]
    NotFound {
        /// Kind of item being looked up.
        what: &'static str,
        /// Name that failed to resolve.
        name: String,
    },

    /// The tree is structurally unable to serve the request.
    #[error("invalid configuration: {reason}")]
    Configuration {
        /// Description of the configuration problem.
        reason: String,
    },

    /// A linear solve or pivot was singular.
    #[error("numeric failure: {reason}")]
    NumericFailure {
        /// Description of what went wrong.
        reason: String,
    },
}

impl ArborError {
    /// Shorthand for [`ArborError::Configuration`].
    pub fn configuration(reason: impl Into<String>) -> Self {
        Self::Configuration {
            reason: reason.into(),
        }
    }

    /// Shorthand for [`ArborError::NumericFailure`].
    pub fn numeric(reason: impl Into<String>) -> Self {
        Self::NumericFailure {
            reason: reason.into(),
        }
    }
}

/// Result alias for arbor operations.
pub type Result<T> = std::result::Result<T, ArborError>;

/// Fail with [`ArborError::Dimension`] unless `actual == expected`.
#[inline]
pub fn check_dimension(what: &'static str, actual: usize, expected: usize) -> Result<()> {
    if actual == expected {
        Ok(())
    } else {
        Err(ArborError::Dimension {
            what,
            expected,
            actual,
        })
    }
}
