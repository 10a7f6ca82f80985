//! In-memory backend for tests and embedding.

use std::collections::{BTreeSet, HashMap};
use std::ops::Bound;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use async_trait::async_trait;
use postbox_core::{RecordFields, StorageError};

use super::traits::{is_empty_lex_range, OrderedKvBackend, WriteOp};

#[derive(Debug, Default)]
struct MockState {
    sets: HashMap<String, BTreeSet<String>>,
    records: HashMap<String, RecordFields>,
    counters: HashMap<String, u64>,
}

impl MockState {
    fn apply(&mut self, op: &WriteOp) {
        match op {
            WriteOp::RecordPut { key, fields } => {
                self.records.insert(key.clone(), fields.clone());
            }
            WriteOp::OrderedSetAdd { set_key, member } => {
                self.sets
                    .entry(set_key.clone())
                    .or_default()
                    .insert(member.clone());
            }
        }
    }
}

/// In-memory mock backend.
///
/// All state sits behind one lock, so counter increments and batches are
/// atomic. The test hooks simulate an outage, slow calls and lost records.
#[derive(Debug, Default)]
pub struct MockBackend {
    state: RwLock<MockState>,
    unavailable: AtomicBool,
    latency_ms: AtomicU64,
    operations: AtomicU64,
}

impl MockBackend {
    /// Create a new empty mock backend.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent call fail with `BackendUnavailable`.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Delay every subsequent call by `latency`.
    pub fn set_latency(&self, latency: Duration) {
        let millis = u64::try_from(latency.as_millis()).unwrap_or(u64::MAX);
        self.latency_ms.store(millis, Ordering::SeqCst);
    }

    /// Number of backend calls made so far, including failed ones.
    pub fn operation_count(&self) -> u64 {
        self.operations.load(Ordering::SeqCst)
    }

    /// Drop a record behind the store's back. Returns whether it existed.
    pub fn remove_record(&self, key: &str) -> Result<bool, StorageError> {
        Ok(self.write()?.records.remove(key).is_some())
    }

    /// Number of stored records.
    pub fn record_count(&self) -> Result<usize, StorageError> {
        Ok(self.read()?.records.len())
    }

    /// All members of an ordered set, in order.
    pub fn members(&self, set_key: &str) -> Result<Vec<String>, StorageError> {
        Ok(self
            .read()?
            .sets
            .get(set_key)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default())
    }

    async fn enter(&self, operation: &str) -> Result<(), StorageError> {
        self.operations.fetch_add(1, Ordering::SeqCst);

        let latency = self.latency_ms.load(Ordering::SeqCst);
        if latency > 0 {
            tokio::time::sleep(Duration::from_millis(latency)).await;
        }

        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StorageError::unavailable(operation, "mock backend is offline"));
        }
        Ok(())
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, MockState>, StorageError> {
        self.state.read().map_err(|_| StorageError::LockPoisoned)
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, MockState>, StorageError> {
        self.state.write().map_err(|_| StorageError::LockPoisoned)
    }
}

#[async_trait]
impl OrderedKvBackend for MockBackend {
    async fn atomic_increment(&self, counter_key: &str) -> Result<u64, StorageError> {
        self.enter("atomic_increment").await?;
        let mut state = self.write()?;
        let counter = state.counters.entry(counter_key.to_string()).or_insert(0);
        *counter = counter.checked_add(1).ok_or_else(|| StorageError::InvalidSequenceValue {
            counter_key: counter_key.to_string(),
            value: u64::MAX,
        })?;
        Ok(*counter)
    }

    async fn ordered_set_add(&self, set_key: &str, member: &str) -> Result<bool, StorageError> {
        self.enter("ordered_set_add").await?;
        Ok(self
            .write()?
            .sets
            .entry(set_key.to_string())
            .or_default()
            .insert(member.to_string()))
    }

    async fn ordered_set_range_by_lex(
        &self,
        set_key: &str,
        lower: Bound<&str>,
        upper: Bound<&str>,
    ) -> Result<Vec<String>, StorageError> {
        self.enter("ordered_set_range_by_lex").await?;
        if is_empty_lex_range(lower, upper) {
            return Ok(Vec::new());
        }

        let state = self.read()?;
        Ok(state
            .sets
            .get(set_key)
            .map(|set| set.range::<str, _>((lower, upper)).cloned().collect())
            .unwrap_or_default())
    }

    async fn record_put(&self, key: &str, fields: &RecordFields) -> Result<(), StorageError> {
        self.enter("record_put").await?;
        self.write()?.records.insert(key.to_string(), fields.clone());
        Ok(())
    }

    async fn record_get(&self, key: &str) -> Result<Option<RecordFields>, StorageError> {
        self.enter("record_get").await?;
        Ok(self.read()?.records.get(key).cloned())
    }

    async fn apply_batch(&self, ops: &[WriteOp]) -> Result<(), StorageError> {
        self.enter("apply_batch").await?;
        let mut state = self.write()?;
        for op in ops {
            state.apply(op);
        }
        Ok(())
    }
}
