//! Composite recipient/time index.

mod composite;
mod key;

pub use composite::CompositeIndex;
pub use key::{bound, validate_recipient, IndexKey, DELIMITER};
