//! Error types for rmaledger.
//!
//! All errors are strongly typed using thiserror. Every failure carries an
//! [`ErrorKind`] so callers can branch on the class of failure without
//! matching individual variants.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::key::KeyError;
use crate::ledger::LedgerError;

/// Coarse classification of failures reported to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Wrong argument count, empty record identifier or unknown function.
    InvalidArgs,
    /// The targeted record does not exist.
    NotFound,
    /// Stored bytes failed to decode, or a record failed to encode.
    Corrupt,
    /// The ledger failed a read, write or scan.
    StoreUnavailable,
    /// A versioned write lost a race with another writer.
    Conflict,
}

impl ErrorKind {
    /// Host-style status code for this kind.
    #[must_use]
    pub const fn status_code(self) -> u16 {
        match self {
            Self::InvalidArgs => 400,
            Self::NotFound => 404,
            Self::Conflict => 409,
            Self::Corrupt => 500,
            Self::StoreUnavailable => 503,
        }
    }

    /// Stable lowercase name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::InvalidArgs => "invalid_args",
            Self::NotFound => "not_found",
            Self::Corrupt => "corrupt",
            Self::StoreUnavailable => "store_unavailable",
            Self::Conflict => "conflict",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Top-level error type for rmaledger.
#[derive(Debug, Error)]
pub enum RmaError {
    #[error("Incorrect number of arguments for '{operation}': expected {expected}, got {actual}")]
    ArgumentCount {
        operation: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("Record identifier cannot be empty")]
    EmptyRecordId,

    #[error("Unknown function '{name}'. Expecting one of: {expected}")]
    UnknownFunction {
        name: String,
        expected: String,
    },

    #[error("Invalid configuration: {message}")]
    InvalidConfig {
        message: String,
    },

    #[error("Invalid key: {0}")]
    Key(#[from] KeyError),

    #[error("RMA not found: {rmano}")]
    NotFound {
        rmano: String,
    },

    #[error("Corrupt record at {location}: {message}")]
    Corrupt {
        location: String,
        message: String,
    },

    #[error("Ledger unavailable: {0}")]
    StoreUnavailable(#[from] LedgerError),

    #[error("Write conflict on RMA {rmano}: expected version {expected}, found {found}")]
    Conflict {
        rmano: String,
        expected: u64,
        found: u64,
    },
}

impl RmaError {
    /// Creates a corruption error for the given location (usually a record id).
    #[must_use]
    pub fn corrupt(location: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Corrupt {
            location: location.into(),
            message: message.into(),
        }
    }

    /// Creates a not-found error.
    #[must_use]
    pub fn not_found(rmano: impl Into<String>) -> Self {
        Self::NotFound {
            rmano: rmano.into(),
        }
    }

    /// Classifies this error.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::ArgumentCount { .. }
            | Self::EmptyRecordId
            | Self::UnknownFunction { .. }
            | Self::InvalidConfig { .. }
            | Self::Key(_) => ErrorKind::InvalidArgs,
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::Corrupt { .. } => ErrorKind::Corrupt,
            Self::StoreUnavailable(_) => ErrorKind::StoreUnavailable,
            Self::Conflict { .. } => ErrorKind::Conflict,
        }
    }

    /// Host-style status code.
    #[must_use]
    pub const fn status_code(&self) -> u16 {
        self.kind().status_code()
    }

    /// Returns true if the caller may retry the same invocation.
    ///
    /// Nothing in this crate retries; the policy belongs to the caller.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::StoreUnavailable | ErrorKind::Conflict
        )
    }
}

/// Result type alias for rmaledger operations.
pub type RmaResult<T> = Result<T, RmaError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_argument_count_message() {
        let err = RmaError::ArgumentCount {
            operation: "update3b11",
            expected: 5,
            actual: 2,
        };
        let msg = err.to_string();
        assert!(msg.contains("update3b11"));
        assert!(msg.contains("expected 5"));
        assert!(msg.contains("got 2"));
        assert_eq!(err.kind(), ErrorKind::InvalidArgs);
    }

    #[test]
    fn test_not_found() {
        let err = RmaError::not_found("RMA-9");
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert_eq!(err.status_code(), 404);
        assert!(err.to_string().contains("RMA-9"));
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_ledger_error_maps_to_store_unavailable() {
        let err: RmaError = LedgerError::Backend("disk gone".to_string()).into();
        assert_eq!(err.kind(), ErrorKind::StoreUnavailable);
        assert_eq!(err.status_code(), 503);
        assert!(err.is_retryable());
        assert!(err.to_string().contains("disk gone"));
    }

    #[test]
    fn test_conflict_is_retryable() {
        let err = RmaError::Conflict {
            rmano: "RMA-1".to_string(),
            expected: 3,
            found: 4,
        };
        assert_eq!(err.kind(), ErrorKind::Conflict);
        assert_eq!(err.status_code(), 409);
        assert!(err.is_retryable());
    }

    #[test]
    fn test_corrupt_is_not_retryable() {
        let err = RmaError::corrupt("RMA-2", "expected value at line 1 column 1");
        assert_eq!(err.kind(), ErrorKind::Corrupt);
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_kind_names_are_stable() {
        assert_eq!(ErrorKind::InvalidArgs.to_string(), "invalid_args");
        assert_eq!(ErrorKind::StoreUnavailable.as_str(), "store_unavailable");
        let json = serde_json::to_string(&ErrorKind::NotFound).unwrap();
        assert_eq!(json, "\"not_found\"");
    }
}
