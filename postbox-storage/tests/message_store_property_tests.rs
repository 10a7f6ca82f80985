//! Property-Based Tests for the Message Store
//!
//! For any recipient, send time and body:
//! - the message is listed on the calendar day of its send time, and only
//!   on that day
//! - listings come back ascending by send time, then id
//! - recipients that are prefixes of one another never see each other's
//!   messages

use chrono::{Duration, Utc};
use postbox_storage::MessageStore;
use postbox_test_utils::fixtures::mock_store;
use postbox_test_utils::generators::*;
use postbox_test_utils::MockBackend;
use proptest::prelude::*;

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()
        .unwrap()
}

fn store() -> MessageStore<MockBackend> {
    mock_store()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    /// A created message is listed on its UTC day and absent from the
    /// neighbouring days.
    #[test]
    fn prop_message_listed_on_its_day_only(
        sender in arb_sender(),
        recipient in arb_recipient(),
        body in arb_body(),
        sent_at in arb_send_time(),
    ) {
        let rt = runtime();
        rt.block_on(async {
            let store = store();
            let message = store.create(&sender, &recipient, &body, sent_at).await.unwrap();
            prop_assert_eq!(&message.body, &body);
            prop_assert_eq!(message.sent_at, sent_at);

            let day = sent_at.with_timezone(&Utc).date_naive();
            let listed = store.list(&recipient, day).await.unwrap();
            prop_assert_eq!(listed, vec![message]);

            for other in [day - Duration::days(1), day + Duration::days(1)] {
                prop_assert!(store.list(&recipient, other).await.unwrap().is_empty());
            }
            Ok(())
        })?;
    }

    /// Every message sent during a day comes back once, ordered by send
    /// second then id.
    #[test]
    fn prop_listing_is_complete_and_ordered(
        recipient in arb_recipient(),
        day in arb_day(),
        offsets in prop::collection::vec(0i64..86_400, 1..20),
    ) {
        let rt = runtime();
        rt.block_on(async {
            let store = store();
            let window = store.day_window(day).unwrap();

            let mut expected = Vec::new();
            for (i, offset) in offsets.iter().enumerate() {
                let sent_at = postbox_test_utils::fixtures::utc_at(window.start + offset);
                let message = store
                    .create("A", &recipient, &format!("m{i}"), sent_at)
                    .await
                    .unwrap();
                expected.push(message);
            }
            expected.sort_by_key(|m| (m.sent_at_unix(), m.id));

            let listed = store.list(&recipient, day).await.unwrap();
            prop_assert_eq!(listed, expected);
            Ok(())
        })?;
    }

    /// A recipient and any extension of it stay isolated.
    #[test]
    fn prop_prefix_recipients_are_isolated(
        recipient in arb_recipient(),
        suffix in "[0-9]{1,4}",
        sent_at in arb_send_time(),
    ) {
        let rt = runtime();
        rt.block_on(async {
            let store = store();
            let longer = format!("{recipient}{suffix}");
            let short_msg = store.create("A", &recipient, "short", sent_at).await.unwrap();
            let long_msg = store.create("A", &longer, "long", sent_at).await.unwrap();

            let day = sent_at.with_timezone(&Utc).date_naive();
            prop_assert_eq!(store.list(&recipient, day).await.unwrap(), vec![short_msg]);
            prop_assert_eq!(store.list(&longer, day).await.unwrap(), vec![long_msg]);
            Ok(())
        })?;
    }

    /// Ids keep increasing no matter how send times are ordered.
    #[test]
    fn prop_ids_increase_in_creation_order(
        times in prop::collection::vec(arb_send_time(), 2..10),
    ) {
        let rt = runtime();
        rt.block_on(async {
            let store = store();
            let mut last = None;
            for sent_at in times {
                let message = store.create("A", "R1", "x", sent_at).await.unwrap();
                if let Some(prev) = last {
                    prop_assert!(message.id > prev);
                }
                last = Some(message.id);
            }
            Ok(())
        })?;
    }
}
