//! The message record and its flat field representation.

use crate::{MessageId, StorageError, Timestamp, UnixSeconds};
use chrono::DateTime;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Flat string-to-string record as stored by the backend.
pub type RecordFields = BTreeMap<String, String>;

/// Record field holding the sender.
pub const FIELD_SENDER: &str = "from";
/// Record field holding the recipient, exactly as supplied.
pub const FIELD_RECIPIENT: &str = "to";
/// Record field holding the body.
pub const FIELD_BODY: &str = "body";
/// Record field holding the send time in RFC 3339.
pub const FIELD_SENT_AT: &str = "date_sent";

/// A stored message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub sender: String,
    pub recipient: String,
    pub body: String,
    /// Send time with the offset the caller supplied.
    pub sent_at: Timestamp,
}

impl Message {
    /// Send time truncated to whole epoch seconds, as used by the index.
    pub fn sent_at_unix(&self) -> UnixSeconds {
        self.sent_at.timestamp()
    }

    /// Flatten into backend record fields. The id is not stored in the
    /// record; it is carried by the record key.
    pub fn to_record(&self) -> RecordFields {
        let mut fields = RecordFields::new();
        fields.insert(FIELD_SENDER.to_string(), self.sender.clone());
        fields.insert(FIELD_RECIPIENT.to_string(), self.recipient.clone());
        fields.insert(FIELD_BODY.to_string(), self.body.clone());
        fields.insert(FIELD_SENT_AT.to_string(), self.sent_at.to_rfc3339());
        fields
    }

    /// Rebuild a message from its record. `record_key` is only used for
    /// error reporting.
    pub fn from_record(
        id: MessageId,
        record_key: &str,
        fields: &RecordFields,
    ) -> Result<Self, StorageError> {
        let field = |name: &str| {
            fields
                .get(name)
                .cloned()
                .ok_or_else(|| StorageError::CorruptRecord {
                    key: record_key.to_string(),
                    reason: format!("missing field {name:?}"),
                })
        };

        let raw_sent_at = field(FIELD_SENT_AT)?;
        let sent_at =
            DateTime::parse_from_rfc3339(&raw_sent_at).map_err(|e| StorageError::CorruptRecord {
                key: record_key.to_string(),
                reason: format!("field {FIELD_SENT_AT:?} is not RFC 3339: {e}"),
            })?;

        Ok(Self {
            id,
            sender: field(FIELD_SENDER)?,
            recipient: field(FIELD_RECIPIENT)?,
            body: field(FIELD_BODY)?,
            sent_at,
        })
    }
}
