//! Postbox Core - Message Types
//!
//! Pure data structures and input validation with no I/O. The storage crate
//! and test utilities depend on this.

pub mod config;
pub mod error;
pub mod identity;
pub mod message;
pub mod validation;

pub use config::{LmdbConfig, StoreConfig};
pub use error::{
    ConfigError, ConsistencyAnomaly, PostboxError, PostboxResult, StorageError, ValidationError,
};
pub use identity::{MessageId, Timestamp, UnixSeconds};
pub use message::{
    Message, RecordFields, FIELD_BODY, FIELD_RECIPIENT, FIELD_SENDER, FIELD_SENT_AT,
};
pub use validation::{
    parse_day, parse_send_time, require_text, validate_send_time, DAY_FORMAT,
};
