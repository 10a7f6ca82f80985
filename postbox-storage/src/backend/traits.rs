//! Ordered key-value backend contract.
//!
//! This is the external collaborator the message store is built on: an
//! ordered set with lexicographic range queries, a flat record store and an
//! atomic counter. Any engine offering these primitives (Redis sorted sets,
//! LMDB, an in-memory map) can back the store.

use std::ops::Bound;

use async_trait::async_trait;
use postbox_core::{RecordFields, StorageError};

/// A single write, so that related writes can be grouped into one batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOp {
    /// Overwrite-or-create a flat record.
    RecordPut { key: String, fields: RecordFields },
    /// Add a member to an ordered set.
    OrderedSetAdd { set_key: String, member: String },
}

/// Ordered key-value backend trait.
///
/// Implementations must be thread-safe; the store issues calls from many
/// tasks concurrently.
///
/// # Ordering
///
/// Ordered set members are compared byte-wise, which for `str` is the same as
/// `Ord for str`. Range bounds follow [`std::ops::Bound`]: `Included` and
/// `Excluded` compare against the full member string, `Unbounded` opens that
/// side of the range.
#[async_trait]
pub trait OrderedKvBackend: Send + Sync {
    /// Increment `counter_key` and return the new value as one atomic step.
    ///
    /// A counter that does not exist yet starts at zero, so the first call
    /// returns 1.
    async fn atomic_increment(&self, counter_key: &str) -> Result<u64, StorageError>;

    /// Add `member` to the ordered set `set_key`.
    ///
    /// Returns `true` if the member was new. Adding an existing member is a
    /// no-op.
    async fn ordered_set_add(&self, set_key: &str, member: &str) -> Result<bool, StorageError>;

    /// Members of `set_key` within the given bounds, in ascending order.
    async fn ordered_set_range_by_lex(
        &self,
        set_key: &str,
        lower: Bound<&str>,
        upper: Bound<&str>,
    ) -> Result<Vec<String>, StorageError>;

    /// Overwrite-or-create the record at `key`.
    async fn record_put(&self, key: &str, fields: &RecordFields) -> Result<(), StorageError>;

    /// Fetch the record at `key`, or `None` if absent.
    async fn record_get(&self, key: &str) -> Result<Option<RecordFields>, StorageError>;

    /// Apply several writes.
    ///
    /// The default applies them one after another, so a failure can leave a
    /// prefix of the batch written. Backends with transactions override this
    /// to make the batch all-or-nothing.
    async fn apply_batch(&self, ops: &[WriteOp]) -> Result<(), StorageError> {
        for op in ops {
            match op {
                WriteOp::RecordPut { key, fields } => self.record_put(key, fields).await?,
                WriteOp::OrderedSetAdd { set_key, member } => {
                    self.ordered_set_add(set_key, member).await?;
                }
            }
        }
        Ok(())
    }
}

/// True when no string can satisfy both bounds.
///
/// Backends check this before scanning; `BTreeSet::range` panics on inverted
/// bounds rather than returning nothing.
pub fn is_empty_lex_range(lower: Bound<&str>, upper: Bound<&str>) -> bool {
    match (lower, upper) {
        (Bound::Unbounded, _) | (_, Bound::Unbounded) => false,
        (Bound::Included(l), Bound::Included(u)) => l > u,
        (Bound::Included(l), Bound::Excluded(u))
        | (Bound::Excluded(l), Bound::Included(u))
        | (Bound::Excluded(l), Bound::Excluded(u)) => l >= u,
    }
}
