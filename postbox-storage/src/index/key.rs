//! Composite index key codec.
//!
//! An index entry is the string `{recipient}:{timestamp}:{id}`. Ordered
//! lexicographically, entries group by recipient first, then by send time,
//! then by id.
//!
//! # Text Format
//!
//! - `recipient`: the (prefix-stripped) recipient, which may not contain `:`
//! - `timestamp`: 20 decimal digits of the epoch seconds with the sign bit
//!   flipped, so that string order equals numeric order for every `i64`
//! - `id`: 20 decimal digits, zero-padded
//!
//! Fixed-width fields mean `"...:00000000000000000009"` sorts before
//! `"...:00000000000000000010"`, which variable-width decimal would get wrong.

use postbox_core::{MessageId, StorageError, UnixSeconds, ValidationError};

/// Separator between the three segments of an index entry.
pub const DELIMITER: char = ':';

/// Width of the encoded timestamp and id segments.
const FIELD_WIDTH: usize = 20;

/// Flipping the sign bit maps `i64::MIN..=i64::MAX` onto `0..=u64::MAX` in
/// order.
const SIGN_BIT: u64 = 1 << 63;

/// A decoded composite index entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct IndexKey {
    recipient: String,
    timestamp: UnixSeconds,
    message_id: MessageId,
}

impl IndexKey {
    /// Build a key, rejecting recipients that would corrupt the key layout.
    pub fn new(
        recipient: impl Into<String>,
        timestamp: UnixSeconds,
        message_id: MessageId,
    ) -> Result<Self, ValidationError> {
        let recipient = recipient.into();
        validate_recipient(&recipient)?;
        Ok(Self {
            recipient,
            timestamp,
            message_id,
        })
    }

    pub fn recipient(&self) -> &str {
        &self.recipient
    }

    pub fn timestamp(&self) -> UnixSeconds {
        self.timestamp
    }

    pub fn message_id(&self) -> MessageId {
        self.message_id
    }

    /// Encode to the stored entry string.
    pub fn encode(&self) -> String {
        format!(
            "{}{DELIMITER}{:0width$}",
            bound(&self.recipient, self.timestamp),
            self.message_id.get(),
            width = FIELD_WIDTH
        )
    }

    /// Decode a stored entry.
    ///
    /// Anything other than exactly three segments with fixed-width numeric
    /// fields is reported as a corrupt entry.
    pub fn decode(entry: &str) -> Result<Self, StorageError> {
        let corrupt = |reason: &str| StorageError::CorruptIndexEntry {
            entry: entry.to_string(),
            reason: reason.to_string(),
        };

        let segments: Vec<&str> = entry.split(DELIMITER).collect();
        let [recipient, timestamp, id] = segments[..] else {
            return Err(corrupt("expected recipient, timestamp and id segments"));
        };

        if recipient.is_empty() {
            return Err(corrupt("empty recipient"));
        }
        let timestamp =
            decode_fixed(timestamp).ok_or_else(|| corrupt("malformed timestamp segment"))?;
        let id = decode_fixed(id).ok_or_else(|| corrupt("malformed id segment"))?;
        let message_id = MessageId::new(id).ok_or_else(|| corrupt("id must be positive"))?;

        Ok(Self {
            recipient: recipient.to_string(),
            timestamp: (timestamp ^ SIGN_BIT) as i64,
            message_id,
        })
    }
}

/// Range bound for `recipient` at `timestamp`: `{recipient}:{timestamp}`.
///
/// Every full entry for that recipient and timestamp sorts strictly above
/// this string, and every entry with an earlier timestamp sorts below it.
pub fn bound(recipient: &str, timestamp: UnixSeconds) -> String {
    format!(
        "{recipient}{DELIMITER}{:0width$}",
        (timestamp as u64) ^ SIGN_BIT,
        width = FIELD_WIDTH
    )
}

/// Check that a recipient can be embedded in an index entry.
pub fn validate_recipient(recipient: &str) -> Result<(), ValidationError> {
    if recipient.is_empty() {
        return Err(ValidationError::RequiredFieldMissing {
            field: "recipient".to_string(),
        });
    }
    if recipient.contains(DELIMITER) {
        return Err(ValidationError::InvalidValue {
            field: "recipient".to_string(),
            reason: format!("must not contain {DELIMITER:?}, got {recipient:?}"),
        });
    }
    Ok(())
}

fn decode_fixed(segment: &str) -> Option<u64> {
    if segment.len() != FIELD_WIDTH || !segment.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    segment.parse().ok()
}
