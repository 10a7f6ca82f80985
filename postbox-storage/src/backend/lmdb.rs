//! LMDB-backed ordered key-value backend.
//!
//! Uses the heed crate (Rust bindings for LMDB). LMDB keeps keys in byte
//! order, which is exactly the lexicographic order the composite index needs,
//! so range queries are native cursor scans.
//!
//! # Layout
//!
//! Three named databases inside one environment:
//! - `sets`: key `{set_key}\0{member}`, empty value
//! - `records`: key is the record key, value is the JSON-encoded field map
//! - `counters`: key is the counter key, value is a big-endian `u64`
//!
//! Set keys may not contain NUL, so the NUL separator keeps each set's members
//! in one contiguous key range.
//!
//! # Thread Safety
//!
//! LMDB serializes write transactions. Counter increments and batches each
//! run inside a single write transaction, which makes them atomic.

use std::ops::Bound;

use async_trait::async_trait;
use heed::types::{Bytes, Str, Unit};
use heed::{Database, Env, EnvOpenOptions, RwTxn};
use postbox_core::{LmdbConfig, RecordFields, StorageError};

use super::traits::{is_empty_lex_range, OrderedKvBackend, WriteOp};

/// Separator between a set key and its member.
const SET_SEPARATOR: char = '\0';
/// One past [`SET_SEPARATOR`]; bounds the end of a set's key range.
const SET_END: char = '\u{1}';

/// Error type for LMDB backend operations.
#[derive(Debug, thiserror::Error)]
pub enum LmdbBackendError {
    /// Failed to open or create the LMDB environment.
    #[error("Failed to open LMDB environment: {0}")]
    EnvOpen(String),

    /// Failed to open a database within the environment.
    #[error("Failed to open database: {0}")]
    DbOpen(String),

    /// Transaction error.
    #[error("Transaction error: {0}")]
    Transaction(String),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Stored bytes could not be decoded.
    #[error("Corrupt value at {key}: {reason}")]
    Corrupt { key: String, reason: String },

    /// A set key contained the reserved separator.
    #[error("Invalid set key {0:?}: set keys may not contain NUL")]
    InvalidSetKey(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convert LmdbBackendError to StorageError.
impl From<LmdbBackendError> for StorageError {
    fn from(e: LmdbBackendError) -> Self {
        match e {
            LmdbBackendError::EnvOpen(_) | LmdbBackendError::Io(_) => {
                StorageError::unavailable("lmdb", e.to_string())
            }
            LmdbBackendError::Corrupt { key, reason } => StorageError::CorruptRecord { key, reason },
            other => StorageError::TransactionFailed {
                reason: other.to_string(),
            },
        }
    }
}

/// LMDB-backed implementation of [`OrderedKvBackend`].
///
/// # Example
///
/// ```ignore
/// use postbox_core::LmdbConfig;
/// use postbox_storage::LmdbBackend;
///
/// let backend = LmdbBackend::open(&LmdbConfig::new("/tmp/postbox"))?;
/// let id = backend.atomic_increment("max_message_id").await?;
/// ```
pub struct LmdbBackend {
    env: Env,
    sets: Database<Str, Unit>,
    records: Database<Str, Bytes>,
    counters: Database<Str, Bytes>,
}

impl LmdbBackend {
    /// Open or create an LMDB backend.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The configuration is invalid
    /// - The directory cannot be created
    /// - LMDB environment cannot be opened
    /// - A database cannot be created
    pub fn open(config: &LmdbConfig) -> Result<Self, LmdbBackendError> {
        config
            .validate()
            .map_err(|e| LmdbBackendError::EnvOpen(e.to_string()))?;

        std::fs::create_dir_all(&config.path)?;

        let env = unsafe {
            EnvOpenOptions::new()
                .map_size(config.map_size_mb * 1024 * 1024)
                .max_dbs(3)
                .open(&config.path)
        }
        .map_err(|e| LmdbBackendError::EnvOpen(e.to_string()))?;

        let mut wtxn = env
            .write_txn()
            .map_err(|e| LmdbBackendError::Transaction(e.to_string()))?;

        let sets: Database<Str, Unit> = env
            .create_database(&mut wtxn, Some("sets"))
            .map_err(|e| LmdbBackendError::DbOpen(e.to_string()))?;
        let records: Database<Str, Bytes> = env
            .create_database(&mut wtxn, Some("records"))
            .map_err(|e| LmdbBackendError::DbOpen(e.to_string()))?;
        let counters: Database<Str, Bytes> = env
            .create_database(&mut wtxn, Some("counters"))
            .map_err(|e| LmdbBackendError::DbOpen(e.to_string()))?;

        wtxn.commit()
            .map_err(|e| LmdbBackendError::Transaction(e.to_string()))?;

        Ok(Self {
            env,
            sets,
            records,
            counters,
        })
    }

    fn member_key(set_key: &str, member: &str) -> Result<String, LmdbBackendError> {
        Ok(format!("{}{member}", Self::set_prefix(set_key)?))
    }

    fn set_prefix(set_key: &str) -> Result<String, LmdbBackendError> {
        if set_key.contains(SET_SEPARATOR) {
            return Err(LmdbBackendError::InvalidSetKey(set_key.to_string()));
        }
        Ok(format!("{set_key}{SET_SEPARATOR}"))
    }

    fn add_member(
        &self,
        wtxn: &mut RwTxn,
        set_key: &str,
        member: &str,
    ) -> Result<bool, LmdbBackendError> {
        let key = Self::member_key(set_key, member)?;
        let existed = self
            .sets
            .get(wtxn, &key)
            .map_err(|e| LmdbBackendError::Transaction(e.to_string()))?
            .is_some();
        if !existed {
            self.sets
                .put(wtxn, &key, &())
                .map_err(|e| LmdbBackendError::Transaction(e.to_string()))?;
        }
        Ok(!existed)
    }

    fn put_record(
        &self,
        wtxn: &mut RwTxn,
        key: &str,
        fields: &RecordFields,
    ) -> Result<(), LmdbBackendError> {
        let bytes =
            serde_json::to_vec(fields).map_err(|e| LmdbBackendError::Serialization(e.to_string()))?;
        self.records
            .put(wtxn, key, &bytes)
            .map_err(|e| LmdbBackendError::Transaction(e.to_string()))
    }

    fn with_write_txn<T, F>(&self, f: F) -> Result<T, LmdbBackendError>
    where
        F: FnOnce(&mut RwTxn) -> Result<T, LmdbBackendError>,
    {
        let mut wtxn = self
            .env
            .write_txn()
            .map_err(|e| LmdbBackendError::Transaction(e.to_string()))?;
        let value = f(&mut wtxn)?;
        wtxn.commit()
            .map_err(|e| LmdbBackendError::Transaction(e.to_string()))?;
        Ok(value)
    }

    fn increment(&self, counter_key: &str) -> Result<u64, LmdbBackendError> {
        self.with_write_txn(|wtxn| {
            let current = match self
                .counters
                .get(wtxn, counter_key)
                .map_err(|e| LmdbBackendError::Transaction(e.to_string()))?
            {
                None => 0,
                Some(bytes) => {
                    let raw: [u8; 8] = bytes.try_into().map_err(|_| LmdbBackendError::Corrupt {
                        key: counter_key.to_string(),
                        reason: format!("counter holds {} bytes, expected 8", bytes.len()),
                    })?;
                    u64::from_be_bytes(raw)
                }
            };

            let next = current.checked_add(1).ok_or_else(|| LmdbBackendError::Corrupt {
                key: counter_key.to_string(),
                reason: "counter overflow".to_string(),
            })?;
            self.counters
                .put(wtxn, counter_key, &next.to_be_bytes())
                .map_err(|e| LmdbBackendError::Transaction(e.to_string()))?;
            Ok(next)
        })
    }

    fn range(
        &self,
        set_key: &str,
        lower: Bound<&str>,
        upper: Bound<&str>,
    ) -> Result<Vec<String>, LmdbBackendError> {
        let prefix = Self::set_prefix(set_key)?;
        let to_key = |member: &str| format!("{prefix}{member}");

        let lower_key = match lower {
            Bound::Included(m) => Bound::Included(to_key(m)),
            Bound::Excluded(m) => Bound::Excluded(to_key(m)),
            Bound::Unbounded => Bound::Included(prefix.clone()),
        };
        let upper_key = match upper {
            Bound::Included(m) => Bound::Included(to_key(m)),
            Bound::Excluded(m) => Bound::Excluded(to_key(m)),
            Bound::Unbounded => Bound::Excluded(format!("{set_key}{SET_END}")),
        };

        let bounds = (as_str_bound(&lower_key), as_str_bound(&upper_key));
        if is_empty_lex_range(bounds.0, bounds.1) {
            return Ok(Vec::new());
        }

        let rtxn = self
            .env
            .read_txn()
            .map_err(|e| LmdbBackendError::Transaction(e.to_string()))?;
        let iter = self
            .sets
            .range(&rtxn, &bounds)
            .map_err(|e| LmdbBackendError::Transaction(e.to_string()))?;

        let mut members = Vec::new();
        for item in iter {
            let (key, ()) = item.map_err(|e| LmdbBackendError::Transaction(e.to_string()))?;
            match key.strip_prefix(prefix.as_str()) {
                Some(member) => members.push(member.to_string()),
                None => {
                    return Err(LmdbBackendError::Corrupt {
                        key: key.to_string(),
                        reason: format!("key escaped the range of set {set_key:?}"),
                    })
                }
            }
        }
        Ok(members)
    }

    fn get_record(&self, key: &str) -> Result<Option<RecordFields>, LmdbBackendError> {
        let rtxn = self
            .env
            .read_txn()
            .map_err(|e| LmdbBackendError::Transaction(e.to_string()))?;

        match self
            .records
            .get(&rtxn, key)
            .map_err(|e| LmdbBackendError::Transaction(e.to_string()))?
        {
            None => Ok(None),
            Some(bytes) => serde_json::from_slice(bytes)
                .map(Some)
                .map_err(|e| LmdbBackendError::Corrupt {
                    key: key.to_string(),
                    reason: e.to_string(),
                }),
        }
    }
}

fn as_str_bound(bound: &Bound<String>) -> Bound<&str> {
    match bound {
        Bound::Included(s) => Bound::Included(s.as_str()),
        Bound::Excluded(s) => Bound::Excluded(s.as_str()),
        Bound::Unbounded => Bound::Unbounded,
    }
}

#[async_trait]
impl OrderedKvBackend for LmdbBackend {
    async fn atomic_increment(&self, counter_key: &str) -> Result<u64, StorageError> {
        Ok(self.increment(counter_key)?)
    }

    async fn ordered_set_add(&self, set_key: &str, member: &str) -> Result<bool, StorageError> {
        Ok(self.with_write_txn(|wtxn| self.add_member(wtxn, set_key, member))?)
    }

    async fn ordered_set_range_by_lex(
        &self,
        set_key: &str,
        lower: Bound<&str>,
        upper: Bound<&str>,
    ) -> Result<Vec<String>, StorageError> {
        Ok(self.range(set_key, lower, upper)?)
    }

    async fn record_put(&self, key: &str, fields: &RecordFields) -> Result<(), StorageError> {
        Ok(self.with_write_txn(|wtxn| self.put_record(wtxn, key, fields))?)
    }

    async fn record_get(&self, key: &str) -> Result<Option<RecordFields>, StorageError> {
        Ok(self.get_record(key)?)
    }

    async fn apply_batch(&self, ops: &[WriteOp]) -> Result<(), StorageError> {
        self.with_write_txn(|wtxn| {
            for op in ops {
                match op {
                    WriteOp::RecordPut { key, fields } => self.put_record(wtxn, key, fields)?,
                    WriteOp::OrderedSetAdd { set_key, member } => {
                        self.add_member(wtxn, set_key, member)?;
                    }
                }
            }
            Ok(())
        })?;
        Ok(())
    }
}
