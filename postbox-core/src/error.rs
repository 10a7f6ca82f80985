//! Error types for Postbox operations

use crate::MessageId;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Storage layer errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StorageError {
    #[error("Backend unavailable during {operation}: {reason}")]
    BackendUnavailable { operation: String, reason: String },

    #[error("Transaction failed: {reason}")]
    TransactionFailed { reason: String },

    #[error("Corrupt index entry {entry:?}: {reason}")]
    CorruptIndexEntry { entry: String, reason: String },

    #[error("Corrupt record at {key}: {reason}")]
    CorruptRecord { key: String, reason: String },

    #[error("Identity sequence {counter_key} produced invalid value {value}")]
    InvalidSequenceValue { counter_key: String, value: u64 },

    #[error("Storage lock poisoned")]
    LockPoisoned,
}

impl StorageError {
    /// Shorthand for a [`StorageError::BackendUnavailable`].
    pub fn unavailable(operation: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::BackendUnavailable {
            operation: operation.into(),
            reason: reason.into(),
        }
    }

    /// True when the backend could not be reached or did not answer in time.
    pub fn is_unavailable(&self) -> bool {
        matches!(self, Self::BackendUnavailable { .. })
    }
}

/// Validation errors. Raised before any write happens.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Required field missing: {field}")]
    RequiredFieldMissing { field: String },

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },
}

impl ValidationError {
    /// The input field the error refers to.
    pub fn field(&self) -> &str {
        match self {
            Self::RequiredFieldMissing { field } | Self::InvalidValue { field, .. } => field,
        }
    }
}

/// Configuration errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing required configuration field: {field}")]
    MissingRequired { field: String },

    #[error("Invalid value for {field}: {value} - {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },
}

/// Master error type for all Postbox errors.
#[derive(Debug, Clone, Error)]
pub enum PostboxError {
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
}

/// Result type alias for Postbox operations.
pub type PostboxResult<T> = Result<T, PostboxError>;

/// A non-fatal inconsistency observed while reading.
///
/// Listing tolerates these by omitting the affected message; they are
/// reported alongside the results and logged, never raised.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConsistencyAnomaly {
    /// The index references a message whose record does not exist.
    MissingRecord {
        message_id: MessageId,
        record_key: String,
        index_entry: String,
    },
}

impl fmt::Display for ConsistencyAnomaly {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingRecord {
                message_id,
                record_key,
                index_entry,
            } => write!(
                f,
                "index entry {index_entry:?} references message {message_id} but {record_key} is missing"
            ),
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================
