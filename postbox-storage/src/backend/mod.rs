//! Ordered key-value backends.

mod lmdb;
mod memory;
mod traits;

pub use lmdb::{LmdbBackend, LmdbBackendError};
pub use memory::MockBackend;
pub use traits::{is_empty_lex_range, OrderedKvBackend, WriteOp};
