//! Postbox Test Utilities
//!
//! Shared test infrastructure for the Postbox workspace:
//! - Proptest generators for message inputs
//! - Fixtures for stores, send times and days
//! - Custom assertions for Postbox results
//! - Tracing setup for tests

// Re-export the mock backend from its source crate
pub use postbox_storage::{MessageStore, MockBackend};

// Re-export core types for convenience
pub use postbox_core::{
    Message, MessageId, PostboxError, PostboxResult, StorageError, StoreConfig, Timestamp,
    ValidationError,
};

use tracing_subscriber::EnvFilter;

/// Install a fmt subscriber that writes through the test harness.
///
/// Honors `RUST_LOG`; defaults to debug output from the storage crate.
/// Safe to call from every test, only the first call installs anything.
pub fn init_test_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("postbox_storage=debug,warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .try_init();
}

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    //! Proptest strategies for message inputs.

    use super::*;
    use chrono::{DateTime, FixedOffset, NaiveDate};
    use proptest::prelude::*;

    /// Earliest generated send time, 2000-01-01T00:00:00Z.
    const MIN_SECS: i64 = 946_684_800;
    /// Latest generated send time, 2040-01-01T00:00:00Z.
    const MAX_SECS: i64 = 2_208_988_800;

    /// Generate a phone-number-like recipient, optionally `+`-prefixed.
    pub fn arb_recipient() -> impl Strategy<Value = String> {
        "[+]?[0-9]{6,15}"
    }

    /// Generate a sender.
    pub fn arb_sender() -> impl Strategy<Value = String> {
        "[+]?[0-9]{6,15}"
    }

    /// Generate a message body, possibly empty.
    pub fn arb_body() -> impl Strategy<Value = String> {
        "\\PC{0,64}"
    }

    /// Generate a UTC offset in seconds, in quarter hours between -12:00 and
    /// +14:00.
    pub fn arb_utc_offset_secs() -> impl Strategy<Value = i32> {
        (-48i32..=56).prop_map(|quarters| quarters * 900)
    }

    /// Generate a send time between 2000 and 2040 with an arbitrary offset.
    pub fn arb_send_time() -> impl Strategy<Value = Timestamp> {
        (MIN_SECS..MAX_SECS, arb_utc_offset_secs()).prop_filter_map(
            "representable send time",
            |(secs, offset)| {
                let offset = FixedOffset::east_opt(offset)?;
                Some(DateTime::from_timestamp(secs, 0)?.with_timezone(&offset))
            },
        )
    }

    /// Generate a calendar day between 2000 and 2039.
    pub fn arb_day() -> impl Strategy<Value = NaiveDate> {
        (0i64..(365 * 40)).prop_filter_map("representable day", |days| {
            NaiveDate::from_ymd_opt(2000, 1, 1)?.checked_add_signed(chrono::Duration::days(days))
        })
    }
}

// ============================================================================
// TEST FIXTURES
// ============================================================================

pub mod fixtures {
    //! Pre-built test fixtures for common testing scenarios.

    use super::*;
    use chrono::{DateTime, NaiveDate};
    use postbox_core::{parse_day, parse_send_time};
    use postbox_storage::{LmdbBackend, OrderedKvBackend};
    use std::path::Path;

    /// Default store configuration, days cut in UTC.
    pub fn test_config() -> StoreConfig {
        StoreConfig::default()
    }

    /// Store over a fresh in-memory backend.
    pub fn mock_store() -> MessageStore<MockBackend> {
        mock_store_with(test_config())
    }

    /// Store over a fresh in-memory backend with the given configuration.
    pub fn mock_store_with(config: StoreConfig) -> MessageStore<MockBackend> {
        MessageStore::new(MockBackend::new(), config).expect("test config should be valid")
    }

    /// Store over an LMDB environment in `dir`.
    pub fn lmdb_store(dir: &Path) -> MessageStore<LmdbBackend> {
        let backend = LmdbBackend::open(&postbox_core::LmdbConfig {
            path: dir.to_path_buf(),
            map_size_mb: 16,
        })
        .expect("LMDB environment should open");
        MessageStore::new(backend, test_config()).expect("test config should be valid")
    }

    /// Parse an RFC 3339 send time.
    pub fn send_time(text: &str) -> Timestamp {
        parse_send_time(text).expect("fixture send time should parse")
    }

    /// Parse a `yyyy-mm-dd` day.
    pub fn day(text: &str) -> NaiveDate {
        parse_day(text).expect("fixture day should parse")
    }

    /// A send time at epoch second `secs`, in UTC.
    pub fn utc_at(secs: i64) -> Timestamp {
        DateTime::from_timestamp(secs, 0)
            .expect("fixture timestamp should be representable")
            .fixed_offset()
    }

    /// Create a message from a fixed sender, failing the test on error.
    pub async fn create_at<B: OrderedKvBackend>(
        store: &MessageStore<B>,
        recipient: &str,
        body: &str,
        sent_at: &str,
    ) -> Message {
        store
            .create("+19997776666", recipient, body, send_time(sent_at))
            .await
            .expect("fixture message should be created")
    }
}

// ============================================================================
// CUSTOM ASSERTIONS
// ============================================================================

pub mod assertions {
    //! Custom assertion functions for Postbox results.

    use super::*;

    /// Assert that a PostboxResult is a Validation error on `field`.
    #[track_caller]
    pub fn assert_validation_error<T: std::fmt::Debug>(result: &PostboxResult<T>, field: &str) {
        match result {
            Err(PostboxError::Validation(e)) => {
                assert_eq!(e.field(), field, "Wrong field in validation error: {e}");
            }
            other => panic!("Expected Validation error on {field}, got: {:?}", other),
        }
    }

    /// Assert that a PostboxResult is a BackendUnavailable storage error.
    #[track_caller]
    pub fn assert_unavailable<T: std::fmt::Debug>(result: &PostboxResult<T>) {
        match result {
            Err(PostboxError::Storage(e)) if e.is_unavailable() => {}
            other => panic!("Expected BackendUnavailable, got: {:?}", other),
        }
    }

    /// Assert that a PostboxResult is a Config error.
    #[track_caller]
    pub fn assert_config_error<T: std::fmt::Debug>(result: &PostboxResult<T>) {
        match result {
            Err(PostboxError::Config(_)) => {}
            other => panic!("Expected Config error, got: {:?}", other),
        }
    }

    /// Assert the bodies of `messages`, in order.
    #[track_caller]
    pub fn assert_bodies(messages: &[Message], expected: &[&str]) {
        let bodies: Vec<&str> = messages.iter().map(|m| m.body.as_str()).collect();
        assert_eq!(bodies, expected, "Unexpected message bodies");
    }

    /// Assert that `messages` ascend by send second, then id.
    #[track_caller]
    pub fn assert_listing_order(messages: &[Message]) {
        for pair in messages.windows(2) {
            let a = (pair[0].sent_at_unix(), pair[0].id);
            let b = (pair[1].sent_at_unix(), pair[1].id);
            assert!(a < b, "Listing out of order: {:?} before {:?}", a, b);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::assertions::*;
    use super::fixtures::*;

    #[tokio::test]
    async fn test_fixture_store_round_trips_one_message() {
        super::init_test_tracing();
        let store = mock_store();
        let message = create_at(&store, "+15551234567", "hi", "2024-03-01T15:00:00Z").await;

        let listed = store.list("+15551234567", day("2024-03-01")).await.unwrap();
        assert_bodies(&listed, &["hi"]);
        assert_eq!(listed[0].id, message.id);
    }

    #[test]
    fn test_utc_at_matches_parsed_time() {
        assert_eq!(utc_at(1_709_305_200), send_time("2024-03-01T15:00:00Z"));
    }

    #[test]
    fn test_tracing_init_is_repeatable() {
        super::init_test_tracing();
        super::init_test_tracing();
    }
}
