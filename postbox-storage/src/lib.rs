//! Postbox Storage - Backends, Composite Index and Message Store
//!
//! Messages are found by recipient and calendar day through one ordered set
//! of composite keys (`recipient:timestamp:id`) queried with lexicographic
//! bounds. The backend only needs ordered sets, flat records and an atomic
//! counter; [`OrderedKvBackend`] captures that contract.
//!
//! Backends:
//! - [`MockBackend`]: in-memory, with hooks for outages and latency
//! - [`LmdbBackend`]: persistent, via heed

pub mod backend;
mod deadline;
pub mod index;
pub mod store;

pub use backend::{
    is_empty_lex_range, LmdbBackend, LmdbBackendError, MockBackend, OrderedKvBackend, WriteOp,
};
pub use index::{CompositeIndex, IndexKey, DELIMITER};
pub use store::{DayListing, DayWindow, MessageStore};
