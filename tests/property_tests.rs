//! Property-based tests for the metric invariants
//!
//! - gauges are last-write-wins for any sequence of saves
//! - counters sum their deltas regardless of delivery order
//! - the wire record round-trips through JSON for any valid content
//! - the compression pairing is lossless for arbitrary payloads

use std::sync::Arc;

use futures::executor::block_on;
use metrion::service::MetricService;
use metrion::storage::MemoryStorage;
use metrion::transport::crypto;
use metrion::{MetricKind, MetricRecord};
use proptest::prelude::*;

fn service() -> MetricService {
    MetricService::new(Arc::new(MemoryStorage::new()))
}

proptest! {
    #[test]
    fn prop_gauge_last_write_wins(values in prop::collection::vec(-1e12f64..1e12, 1..20)) {
        let service = service();
        block_on(async {
            for value in &values {
                service.save(&MetricRecord::gauge("g", *value)).await.unwrap();
            }
            let stored = service.retrieve("g", MetricKind::Gauge).await.unwrap();
            assert_eq!(stored.value, values.last().copied());
        });
    }
}

proptest! {
    #[test]
    fn prop_counter_sums_in_any_order(
        mut deltas in prop::collection::vec(-1_000_000i64..1_000_000, 1..20),
        seed in any::<u64>(),
    ) {
        // Shuffle deterministically from the seed; the sum must not care
        let mut state = seed;
        for i in (1..deltas.len()).rev() {
            state = state.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
            deltas.swap(i, (state % (i as u64 + 1)) as usize);
        }

        let expected: i64 = deltas.iter().sum();
        let service = service();
        block_on(async {
            for delta in &deltas {
                service.save(&MetricRecord::counter("c", *delta)).await.unwrap();
            }
            let stored = service.retrieve("c", MetricKind::Counter).await.unwrap();
            assert_eq!(stored.delta, Some(expected));
        });
    }
}

fn arb_record() -> impl Strategy<Value = MetricRecord> {
    let id = "[a-zA-Z][a-zA-Z0-9_]{0,30}";
    prop_oneof![
        (id, any::<i64>()).prop_map(|(id, delta)| MetricRecord::counter(id, delta)),
        (id, -1e300f64..1e300).prop_map(|(id, value)| MetricRecord::gauge(id, value)),
    ]
}

proptest! {
    #[test]
    fn prop_record_json_round_trip(record in arb_record()) {
        let encoded = serde_json::to_vec(&record).unwrap();
        let decoded: MetricRecord = serde_json::from_slice(&encoded).unwrap();
        assert_eq!(decoded, record);
    }
}

proptest! {
    #[test]
    fn prop_compression_is_lossless(payload in prop::collection::vec(any::<u8>(), 0..4096)) {
        let compressed = crypto::compress(&payload).unwrap();
        assert_eq!(crypto::decompress(&compressed).unwrap(), payload);
    }
}

proptest! {
    #[test]
    fn prop_signature_verifies_only_the_original_body(
        body in prop::collection::vec(any::<u8>(), 1..512),
        mut tampered in prop::collection::vec(any::<u8>(), 1..512),
        key in "[a-zA-Z0-9]{1,32}",
    ) {
        let signature = crypto::sign(&body, &key);
        assert!(crypto::verify(&body, &key, &signature));

        if tampered == body {
            tampered.push(0);
        }
        assert!(!crypto::verify(&tampered, &key, &signature));
    }
}
