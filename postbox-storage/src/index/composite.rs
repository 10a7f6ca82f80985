//! Composite recipient/time index over an ordered set.

use std::ops::Bound;
use std::sync::Arc;
use std::time::Duration;

use postbox_core::{MessageId, PostboxResult, StorageError, UnixSeconds};

use super::key::{bound, IndexKey};
use crate::backend::{OrderedKvBackend, WriteOp};
use crate::deadline::with_deadline;

/// Composite index mapping (recipient, send time) to message ids.
///
/// All entries live in one ordered set. A range query for one recipient
/// scans only that recipient's entries because the recipient is the leading
/// key segment and can never contain the delimiter.
pub struct CompositeIndex<B: OrderedKvBackend> {
    backend: Arc<B>,
    set_key: String,
    timeout: Option<Duration>,
}

impl<B: OrderedKvBackend> Clone for CompositeIndex<B> {
    fn clone(&self) -> Self {
        Self {
            backend: Arc::clone(&self.backend),
            set_key: self.set_key.clone(),
            timeout: self.timeout,
        }
    }
}

impl<B: OrderedKvBackend> CompositeIndex<B> {
    /// Create an index stored in the ordered set `set_key`.
    pub fn new(backend: Arc<B>, set_key: impl Into<String>) -> Self {
        Self {
            backend,
            set_key: set_key.into(),
            timeout: None,
        }
    }

    /// Apply a deadline to every backend call made by this index.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// The write that adds `key` to this index, for use in a batch.
    pub fn entry_op(&self, key: &IndexKey) -> WriteOp {
        WriteOp::OrderedSetAdd {
            set_key: self.set_key.clone(),
            member: key.encode(),
        }
    }

    /// Add an entry for `message_id` sent to `recipient` at `timestamp`.
    ///
    /// Inserting the same entry twice leaves a single entry.
    pub async fn insert(
        &self,
        recipient: &str,
        timestamp: UnixSeconds,
        message_id: MessageId,
    ) -> PostboxResult<IndexKey> {
        let key = IndexKey::new(recipient, timestamp, message_id)?;
        self.insert_key(&key).await?;
        Ok(key)
    }

    /// Add an already built entry.
    pub async fn insert_key(&self, key: &IndexKey) -> Result<(), StorageError> {
        let member = key.encode();
        with_deadline(
            self.timeout,
            "ordered_set_add",
            self.backend.ordered_set_add(&self.set_key, &member),
        )
        .await?;
        tracing::trace!(set_key = %self.set_key, entry = %member, "Index entry added");
        Ok(())
    }

    /// Entries for `recipient` between `start` (exclusive bound) and `end`
    /// (inclusive bound), ascending by timestamp then id.
    ///
    /// Bounds are the strings `{recipient}:{start}` and `{recipient}:{end}`.
    /// Every full entry at a given second sorts above the bound for that
    /// second, so the exclusive lower bound still admits entries sent at
    /// exactly `start`, and the inclusive upper bound still excludes entries
    /// sent at exactly `end`. In seconds the query window is `[start, end)`.
    pub async fn range_query(
        &self,
        recipient: &str,
        start: UnixSeconds,
        end: UnixSeconds,
    ) -> PostboxResult<Vec<IndexKey>> {
        super::key::validate_recipient(recipient)?;

        let lower = bound(recipient, start);
        let upper = bound(recipient, end);
        let entries = with_deadline(
            self.timeout,
            "ordered_set_range_by_lex",
            self.backend.ordered_set_range_by_lex(
                &self.set_key,
                Bound::Excluded(lower.as_str()),
                Bound::Included(upper.as_str()),
            ),
        )
        .await?;

        let mut keys = Vec::with_capacity(entries.len());
        for entry in entries {
            let key = IndexKey::decode(&entry)?;
            if key.recipient() != recipient {
                return Err(StorageError::CorruptIndexEntry {
                    entry,
                    reason: format!("returned for recipient {recipient:?}"),
                }
                .into());
            }
            keys.push(key);
        }

        tracing::debug!(
            set_key = %self.set_key,
            recipient,
            start,
            end,
            count = keys.len(),
            "Index range query"
        );
        Ok(keys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MockBackend;
    use postbox_core::PostboxError;

    fn index() -> (CompositeIndex<MockBackend>, Arc<MockBackend>) {
        let backend = Arc::new(MockBackend::new());
        (CompositeIndex::new(Arc::clone(&backend), "idx"), backend)
    }

    fn id(raw: u64) -> MessageId {
        MessageId::new(raw).unwrap()
    }

    fn ids(keys: &[IndexKey]) -> Vec<u64> {
        keys.iter().map(|k| k.message_id().get()).collect()
    }

    #[tokio::test]
    async fn test_window_includes_start_and_excludes_end() {
        let (index, _) = index();
        index.insert("r", 99, id(1)).await.unwrap();
        index.insert("r", 100, id(2)).await.unwrap();
        index.insert("r", 150, id(3)).await.unwrap();
        index.insert("r", 200, id(4)).await.unwrap();

        let keys = index.range_query("r", 100, 200).await.unwrap();
        assert_eq!(ids(&keys), vec![2, 3]);
    }

    #[tokio::test]
    async fn test_results_order_by_time_then_id() {
        let (index, _) = index();
        index.insert("r", 120, id(10)).await.unwrap();
        index.insert("r", 110, id(11)).await.unwrap();
        index.insert("r", 120, id(9)).await.unwrap();

        let keys = index.range_query("r", 100, 200).await.unwrap();
        assert_eq!(ids(&keys), vec![11, 9, 10]);
    }

    #[tokio::test]
    async fn test_recipient_prefixes_do_not_leak() {
        let (index, _) = index();
        index.insert("+155512345", 150, id(1)).await.unwrap();
        index.insert("+15551234567", 150, id(2)).await.unwrap();
        index.insert("+1555123456", 150, id(3)).await.unwrap();

        let keys = index.range_query("+155512345", 100, 200).await.unwrap();
        assert_eq!(ids(&keys), vec![1]);
        let keys = index.range_query("+15551234567", 100, 200).await.unwrap();
        assert_eq!(ids(&keys), vec![2]);
    }

    #[tokio::test]
    async fn test_duplicate_insert_keeps_one_entry() {
        let (index, backend) = index();
        index.insert("r", 150, id(1)).await.unwrap();
        index.insert("r", 150, id(1)).await.unwrap();
        assert_eq!(backend.members("idx").unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_empty_and_inverted_windows() {
        let (index, _) = index();
        index.insert("r", 150, id(1)).await.unwrap();
        assert!(index.range_query("r", 150, 150).await.unwrap().is_empty());
        assert!(index.range_query("r", 200, 100).await.unwrap().is_empty());
        assert!(index.range_query("other", 0, 1000).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_invalid_recipient_never_reaches_backend() {
        let (index, backend) = index();
        let err = index.range_query("a:b", 0, 10).await.unwrap_err();
        assert!(matches!(err, PostboxError::Validation(_)));
        let err = index.insert("", 0, id(1)).await.unwrap_err();
        assert!(matches!(err, PostboxError::Validation(_)));
        assert_eq!(backend.operation_count(), 0);
    }

    #[tokio::test]
    async fn test_foreign_entry_in_range_is_corrupt() {
        let (index, backend) = index();
        backend
            .ordered_set_add("idx", "r:09223372036854775908:bogus")
            .await
            .unwrap();

        let err = index.range_query("r", 0, 1000).await.unwrap_err();
        assert!(matches!(
            err,
            PostboxError::Storage(StorageError::CorruptIndexEntry { .. })
        ));
    }

    #[tokio::test]
    async fn test_timeout_reports_unavailable() {
        let (index, backend) = index();
        let index = index.with_timeout(Some(Duration::from_millis(10)));
        backend.set_latency(Duration::from_millis(500));

        let err = index.range_query("r", 0, 10).await.unwrap_err();
        match err {
            PostboxError::Storage(e) => assert!(e.is_unavailable()),
            other => panic!("expected storage error, got {other:?}"),
        }
    }
}
