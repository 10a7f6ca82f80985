//! Identity types for Postbox messages

use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Send time as supplied by the caller, keeping its original UTC offset.
pub type Timestamp = DateTime<FixedOffset>;

/// Whole seconds since the Unix epoch. Index entries use this precision.
pub type UnixSeconds = i64;

/// Message identifier minted by the identity sequence.
///
/// Ids are positive, strictly increasing and never reused. Zero is not a
/// valid id, so the only way to obtain one is through [`MessageId::new`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u64", into = "u64")]
pub struct MessageId(u64);

impl MessageId {
    /// Wrap a raw sequence value. Returns `None` for zero.
    pub fn new(raw: u64) -> Option<Self> {
        (raw > 0).then_some(Self(raw))
    }

    /// The raw sequence value.
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<u64> for MessageId {
    type Error = String;

    fn try_from(raw: u64) -> Result<Self, Self::Error> {
        Self::new(raw).ok_or_else(|| "message id must be positive".to_string())
    }
}

impl From<MessageId> for u64 {
    fn from(id: MessageId) -> Self {
        id.0
    }
}
