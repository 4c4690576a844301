//! Error types for the label index
//!
//! Every failure surfaces synchronously to the caller; nothing is retried
//! internally. Variants group into three classes exposed by [`Error::kind`]:
//! invalid arguments, missing series and internal failures.

use thiserror::Error;

use crate::types::Tsid;

/// Main error type for the index
#[derive(Error, Debug)]
pub enum Error {
    /// Caller supplied an argument the index cannot accept
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Label set failed validation
    #[error("Invalid label set: {0}")]
    Validation(#[from] ValidationError),

    /// Regex pattern failed to compile or exceeded limits
    #[error("Invalid regex '{pattern}': {reason}")]
    InvalidRegex {
        /// The offending pattern (truncated for long inputs)
        pattern: String,
        /// Why compilation failed
        reason: String,
    },

    /// Requested series does not exist
    #[error("Series not found: tsid {0}")]
    NotFound(Tsid),

    /// The configured series limit has been reached
    #[error("Series limit exceeded: limit is {limit} series")]
    CapacityExceeded {
        /// Maximum number of series allowed
        limit: usize,
    },

    /// Index state is inconsistent
    #[error("Internal index error: {0}")]
    Internal(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Coarse error classes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Bad input: duplicate label names, inverted time range, malformed regex
    InvalidArgument,
    /// Unknown or reserved TSID
    NotFound,
    /// Corruption, allocation failure, or environment problems
    Internal,
}

impl Error {
    /// Classify this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::InvalidArgument(_)
            | Error::Validation(_)
            | Error::InvalidRegex { .. }
            | Error::Configuration(_) => ErrorKind::InvalidArgument,
            Error::NotFound(_) => ErrorKind::NotFound,
            Error::CapacityExceeded { .. }
            | Error::Internal(_)
            | Error::Io(_)
            | Error::Serialization(_) => ErrorKind::Internal,
        }
    }

    /// Build an [`Error::InvalidRegex`], truncating long patterns
    pub(crate) fn invalid_regex(pattern: &str, reason: impl ToString) -> Self {
        // Keep error messages bounded for very long patterns
        let pattern = match pattern.char_indices().nth(50) {
            Some((idx, _)) => format!("{}...", &pattern[..idx]),
            None => pattern.to_string(),
        };
        Error::InvalidRegex {
            pattern,
            reason: reason.to_string(),
        }
    }
}

/// Label set validation errors
///
/// Raised before any mutation of the registry or tag tree, so a rejected
/// registration leaves no partial state behind.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// The same label name appears more than once
    #[error("duplicate label name '{0}'")]
    DuplicateName(String),

    /// A label has an empty name
    #[error("label name must not be empty")]
    EmptyName,

    /// Label set carries more labels than allowed
    #[error("too many labels: {count} (max: {max})")]
    TooManyLabels {
        /// Number of labels supplied
        count: usize,
        /// Configured maximum
        max: usize,
    },

    /// Label name exceeds the configured length
    #[error("label name '{name}' is {len} bytes (max: {max})")]
    NameTooLong {
        /// Offending label name
        name: String,
        /// Actual length in bytes
        len: usize,
        /// Configured maximum
        max: usize,
    },

    /// Label value exceeds the configured length
    #[error("value of label '{name}' is {len} bytes (max: {max})")]
    ValueTooLong {
        /// Label whose value is too long
        name: String,
        /// Actual length in bytes
        len: usize,
        /// Configured maximum
        max: usize,
    },
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;
