// Copyright 2022 Twitter, Inc.
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

use rustcommon_hdrhistogram::codec;
use rustcommon_hdrhistogram::{ConcurrentHistogram, Histogram, Recorder};
use std::sync::Arc;
use std::thread;

#[test]
fn scenario_1_five_significant_digits_total_count_and_top_percentile() {
    let mut h: Histogram<i64> = Histogram::new(1, 3_600_000_000, 3).unwrap();
    for v in [1_u64, 100, 10_000, 1_000_000, 3_600_000_000] {
        h.record_value(v).unwrap();
    }
    assert_eq!(h.total_count(), 5);
    let expected_top = h.geometry().next_non_equivalent_value(3_600_000_000) - 1;
    assert_eq!(h.value_at_percentile(100.0).unwrap(), expected_top);
}

#[test]
fn scenario_2_expected_interval_backfill_on_empty_histogram() {
    let mut h: Histogram<i64> = Histogram::new(1, 3_600_000_000, 3).unwrap();
    h.record_value_with_expected_interval(100_000, 10_000).unwrap();
    assert_eq!(h.total_count(), 10);
    for v in (10_000..=100_000).step_by(10_000) {
        assert_eq!(h.count_at_value(v).unwrap(), 1);
    }
}

#[test]
fn scenario_3_encode_decode_round_trip_is_value_equal() {
    let mut h: Histogram<i64> = Histogram::new(1, 3_600_000_000, 3).unwrap();
    for v in [1_u64, 100, 10_000, 1_000_000, 3_600_000_000] {
        h.record_value(v).unwrap();
    }
    let bytes = codec::encode(&h);
    let decoded = codec::decode(&bytes).unwrap();
    assert_eq!(decoded.total_count(), h.total_count());
    for v in [1_u64, 100, 10_000, 1_000_000, 3_600_000_000] {
        assert_eq!(decoded.count_at_value(v).unwrap(), h.count_at_value(v).unwrap());
    }
}

#[test]
fn scenario_4_add_merges_two_histograms_counter_by_counter() {
    let mut a: Histogram<i64> = Histogram::new(1, 100_000, 3).unwrap();
    a.record_value_with_count(1, 3).unwrap();
    a.record_value_with_count(10, 5).unwrap();

    let mut b: Histogram<i64> = Histogram::new(1, 100_000, 3).unwrap();
    b.record_value_with_count(10, 2).unwrap();
    b.record_value_with_count(100, 4).unwrap();

    a.add(&b).unwrap();
    assert_eq!(a.count_at_value(1).unwrap(), 3);
    assert_eq!(a.count_at_value(10).unwrap(), 7);
    assert_eq!(a.count_at_value(100).unwrap(), 4);
    assert_eq!(a.total_count(), 12);
}

#[test]
fn scenario_5_eight_threads_recording_concurrently() {
    let h = Arc::new(ConcurrentHistogram::new(1, 1_u64 << 62, 3).unwrap());
    let mut handles = Vec::new();
    for _ in 0..8 {
        let h2 = Arc::clone(&h);
        handles.push(thread::spawn(move || {
            for v in 0..1_000_000_u64 {
                h2.record_value(v).unwrap();
            }
        }));
    }
    for handle in handles {
        handle.join().unwrap();
    }
    assert_eq!(h.total_count(), 8_000_000);

    let mut snapshot: Histogram<i64> = Histogram::new(1, 1_u64 << 62, 3).unwrap();
    h.copy_counts_into(&mut snapshot).unwrap();
    assert_eq!(snapshot.count_at_value(0).unwrap(), 8);
}

/// Two producer threads record through a single `Recorder`, while a
/// sampler thread calls `sample()` ten times and then once more after the
/// producers finish. Every recorded value belongs to exactly one of the
/// eleven snapshots, so their total counts sum to `2 * 1000`.
#[test]
fn scenario_6_recorder_partitions_the_stream_across_concurrent_producers() {
    let recorder: Arc<Recorder<i64>> = Arc::new(Recorder::new(1, 100_000, 3).unwrap());

    let mut producers = Vec::new();
    for _ in 0..2 {
        let r = Arc::clone(&recorder);
        producers.push(thread::spawn(move || {
            for _ in 0..1000 {
                r.record_value(42).unwrap();
            }
        }));
    }

    let mut snapshots = Vec::new();
    for _ in 0..10 {
        snapshots.push(recorder.sample().unwrap());
    }

    for producer in producers {
        producer.join().unwrap();
    }
    snapshots.push(recorder.sample().unwrap());

    assert_eq!(snapshots.len(), 11);
    let total: i64 = snapshots.iter().map(|s| s.total_count()).sum();
    assert_eq!(total, 2000);
}
