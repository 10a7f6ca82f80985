//! Message store: identity, records and the day listing.
//!
//! `create` allocates an id from the backend counter, writes the record and
//! adds a composite index entry. `list` turns a calendar day into a window of
//! epoch seconds, range-queries the index and hydrates the records.

use std::sync::Arc;

use chrono::{FixedOffset, NaiveDate, TimeZone, Utc};
use postbox_core::{
    parse_day, require_text, validate_send_time, ConsistencyAnomaly, Message, MessageId,
    PostboxResult, StorageError, StoreConfig, Timestamp, UnixSeconds, ValidationError,
};

use crate::backend::{OrderedKvBackend, WriteOp};
use crate::deadline::with_deadline;
use crate::index::{validate_recipient, CompositeIndex, IndexKey};

const SECONDS_PER_DAY: i64 = 86_400;

/// A calendar day as epoch seconds in the reference timezone.
///
/// `start` is midnight; `end` is the following midnight. Messages sent at
/// `start` belong to the day, messages sent at `end` belong to the next one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DayWindow {
    pub start: UnixSeconds,
    pub end: UnixSeconds,
}

impl DayWindow {
    pub fn contains(&self, timestamp: UnixSeconds) -> bool {
        self.start <= timestamp && timestamp < self.end
    }
}

/// Messages for one recipient and day, plus anything that looked wrong.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DayListing {
    pub messages: Vec<Message>,
    pub anomalies: Vec<ConsistencyAnomaly>,
}

/// Message store over an ordered key-value backend.
///
/// Stateless apart from configuration; any number of tasks may call it
/// concurrently. Id uniqueness rests on the backend's atomic increment.
pub struct MessageStore<B: OrderedKvBackend> {
    backend: Arc<B>,
    index: CompositeIndex<B>,
    config: StoreConfig,
    reference_offset: FixedOffset,
}

impl<B: OrderedKvBackend> Clone for MessageStore<B> {
    fn clone(&self) -> Self {
        Self {
            backend: Arc::clone(&self.backend),
            index: self.index.clone(),
            config: self.config.clone(),
            reference_offset: self.reference_offset,
        }
    }
}

impl<B: OrderedKvBackend> MessageStore<B> {
    /// Create a store owning `backend`.
    pub fn new(backend: B, config: StoreConfig) -> PostboxResult<Self> {
        Self::with_shared_backend(Arc::new(backend), config)
    }

    /// Create a store over a backend shared with other components.
    pub fn with_shared_backend(backend: Arc<B>, config: StoreConfig) -> PostboxResult<Self> {
        config.validate()?;
        let reference_offset = config.reference_offset()?;
        let index = CompositeIndex::new(Arc::clone(&backend), config.index_set_key.clone())
            .with_timeout(config.backend_timeout);

        Ok(Self {
            backend,
            index,
            config,
            reference_offset,
        })
    }

    pub fn backend(&self) -> &Arc<B> {
        &self.backend
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Store a new message and index it under its recipient and send time.
    ///
    /// Input is validated before anything is written. With `atomic_writes`
    /// the record and index entry go to the backend as one batch; otherwise
    /// the record is written first, so a failure in between leaves an
    /// unindexed record rather than an index entry without a record.
    pub async fn create(
        &self,
        sender: &str,
        recipient: &str,
        body: &str,
        sent_at: Timestamp,
    ) -> PostboxResult<Message> {
        require_text("sender", sender)?;
        require_text("recipient", recipient)?;
        let index_recipient = self.index_recipient(recipient)?;
        validate_send_time(&sent_at)?;

        let id = self.next_id().await?;
        let message = Message {
            id,
            sender: sender.to_string(),
            recipient: recipient.to_string(),
            body: body.to_string(),
            sent_at,
        };
        let key = IndexKey::new(index_recipient, message.sent_at_unix(), id)?;
        let record_key = self.config.record_key(id);
        let record = message.to_record();

        if self.config.atomic_writes {
            let ops = [
                WriteOp::RecordPut {
                    key: record_key.clone(),
                    fields: record,
                },
                self.index.entry_op(&key),
            ];
            with_deadline(
                self.config.backend_timeout,
                "apply_batch",
                self.backend.apply_batch(&ops),
            )
            .await?;
        } else {
            with_deadline(
                self.config.backend_timeout,
                "record_put",
                self.backend.record_put(&record_key, &record),
            )
            .await?;
            self.index.insert_key(&key).await?;
        }

        tracing::debug!(
            message_id = %id,
            record_key = %record_key,
            recipient = %message.recipient,
            sent_at = message.sent_at_unix(),
            "Message created"
        );
        Ok(message)
    }

    /// Like [`create`](Self::create), sent now in the reference timezone.
    pub async fn create_now(
        &self,
        sender: &str,
        recipient: &str,
        body: &str,
    ) -> PostboxResult<Message> {
        let now = Utc::now().with_timezone(&self.reference_offset);
        self.create(sender, recipient, body, now).await
    }

    /// Fetch one message by id.
    pub async fn get(&self, id: MessageId) -> PostboxResult<Option<Message>> {
        let record_key = self.config.record_key(id);
        let record = with_deadline(
            self.config.backend_timeout,
            "record_get",
            self.backend.record_get(&record_key),
        )
        .await?;

        match record {
            None => Ok(None),
            Some(fields) => Ok(Some(Message::from_record(id, &record_key, &fields)?)),
        }
    }

    /// Messages sent to `recipient` during `day`, ascending by send time
    /// then id.
    ///
    /// Index entries whose record is missing are skipped; use
    /// [`list_detailed`](Self::list_detailed) to see them.
    pub async fn list(&self, recipient: &str, day: NaiveDate) -> PostboxResult<Vec<Message>> {
        Ok(self.list_detailed(recipient, day).await?.messages)
    }

    /// [`list`](Self::list) taking the day as `yyyy-mm-dd` text.
    pub async fn list_on(&self, recipient: &str, day: &str) -> PostboxResult<Vec<Message>> {
        require_text("recipient", recipient)?;
        let day = parse_day(day)?;
        self.list(recipient, day).await
    }

    /// Messages for `recipient` during `day`, with any consistency anomalies
    /// found while hydrating them.
    pub async fn list_detailed(&self, recipient: &str, day: NaiveDate) -> PostboxResult<DayListing> {
        require_text("recipient", recipient)?;
        let index_recipient = self.index_recipient(recipient)?;
        let window = self.day_window(day)?;

        let keys = self
            .index
            .range_query(index_recipient, window.start, window.end)
            .await?;

        let mut listing = DayListing {
            messages: Vec::with_capacity(keys.len()),
            anomalies: Vec::new(),
        };
        for key in keys {
            match self.get(key.message_id()).await? {
                Some(message) => listing.messages.push(message),
                None => {
                    let index_entry = key.encode();
                    tracing::warn!(
                        message_id = %key.message_id(),
                        index_entry = %index_entry,
                        "Index references a missing message record; skipping"
                    );
                    let anomaly = ConsistencyAnomaly::MissingRecord {
                        message_id: key.message_id(),
                        record_key: self.config.record_key(key.message_id()),
                        index_entry,
                    };
                    listing.anomalies.push(anomaly);
                }
            }
        }

        tracing::debug!(
            recipient,
            %day,
            window_start = window.start,
            window_end = window.end,
            count = listing.messages.len(),
            anomalies = listing.anomalies.len(),
            "Listed messages"
        );
        Ok(listing)
    }

    /// Midnight-to-midnight window for `day` in the reference timezone.
    pub fn day_window(&self, day: NaiveDate) -> Result<DayWindow, ValidationError> {
        let out_of_range = || ValidationError::InvalidValue {
            field: "day".to_string(),
            reason: format!("{day} is outside the supported range"),
        };

        let midnight = day.and_hms_opt(0, 0, 0).ok_or_else(out_of_range)?;
        let start = self
            .reference_offset
            .from_local_datetime(&midnight)
            .single()
            .ok_or_else(out_of_range)?
            .timestamp();

        Ok(DayWindow {
            start,
            end: start + SECONDS_PER_DAY,
        })
    }

    /// The recipient as it appears in index entries.
    fn index_recipient<'a>(&self, recipient: &'a str) -> Result<&'a str, ValidationError> {
        let stripped = match self.config.strip_recipient_prefix.as_deref() {
            Some(prefix) => recipient.strip_prefix(prefix).unwrap_or(recipient),
            None => recipient,
        };
        validate_recipient(stripped)?;
        Ok(stripped)
    }

    async fn next_id(&self) -> Result<MessageId, StorageError> {
        let raw = with_deadline(
            self.config.backend_timeout,
            "atomic_increment",
            self.backend.atomic_increment(&self.config.counter_key),
        )
        .await?;

        MessageId::new(raw).ok_or_else(|| StorageError::InvalidSequenceValue {
            counter_key: self.config.counter_key.clone(),
            value: raw,
        })
    }
}
