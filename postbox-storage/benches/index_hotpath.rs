use chrono::DateTime;
use criterion::{criterion_group, criterion_main, Criterion};
use postbox_core::{parse_day, MessageId, StoreConfig};
use postbox_storage::{IndexKey, MessageStore, MockBackend};
use std::hint::black_box;

const RECIPIENTS: usize = 50;
const MESSAGES_PER_RECIPIENT: i64 = 200;
/// 2024-03-01T00:00:00Z
const DAY_START: i64 = 1_709_251_200;

fn bench_key_codec(c: &mut Criterion) {
    let id = MessageId::new(123_456).expect("positive id");
    let key = IndexKey::new("+15551234567", DAY_START + 3_600, id).expect("valid key");
    let encoded = key.encode();

    c.bench_function("index/key_encode", |b| {
        b.iter(|| black_box(black_box(&key).encode()));
    });
    c.bench_function("index/key_decode", |b| {
        b.iter(|| black_box(IndexKey::decode(black_box(&encoded)).expect("decode key")));
    });
}

fn bench_day_listing(c: &mut Criterion) {
    let rt = tokio::runtime::Builder::new_current_thread()
        .build()
        .expect("build runtime");
    let store = MessageStore::new(MockBackend::new(), StoreConfig::default()).expect("build store");

    rt.block_on(async {
        for r in 0..RECIPIENTS {
            let recipient = format!("+1555{r:07}");
            for i in 0..MESSAGES_PER_RECIPIENT {
                // Spread over three days so the query has neighbours to skip.
                let secs = DAY_START - 86_400 + i * (3 * 86_400 / MESSAGES_PER_RECIPIENT);
                let sent_at = DateTime::from_timestamp(secs, 0)
                    .expect("valid timestamp")
                    .fixed_offset();
                store
                    .create("+19997776666", &recipient, "benchmark body", sent_at)
                    .await
                    .expect("create message");
            }
        }
    });

    let day = parse_day("2024-03-01").expect("valid day");
    c.bench_function("store/list_one_day", |b| {
        b.iter(|| {
            let listed = rt
                .block_on(store.list(black_box("+15550000025"), day))
                .expect("list messages");
            black_box(listed.len());
        });
    });
}

criterion_group!(benches, bench_key_codec, bench_day_listing);
criterion_main!(benches);
