// Copyright 2022 Twitter, Inc.
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

use rustcommon_hdrhistogram::logstream::{LogReader, LogWriter};
use rustcommon_hdrhistogram::Histogram;

#[test]
fn p7_log_round_trip_preserves_order_timestamps_and_tags() {
    let mut buf: Vec<u8> = Vec::new();
    {
        let mut writer = LogWriter::begin(&mut buf, 1_700_000_000.0, "2023-11-14T22:13:20Z").unwrap();

        let mut first: Histogram<i64> = Histogram::new(1, 100_000, 3).unwrap();
        first.set_tag("read");
        first.record_value(10).unwrap();
        writer.write_interval_histogram(0.0, 1.0, &first).unwrap();

        let mut second: Histogram<i64> = Histogram::new(1, 100_000, 3).unwrap();
        second.set_tag("write");
        second.record_value_with_count(200, 3).unwrap();
        writer.write_interval_histogram(1.0, 1.0, &second).unwrap();

        let mut third: Histogram<i64> = Histogram::new(1, 100_000, 3).unwrap();
        third.record_value(5).unwrap();
        writer.write_interval_histogram(2.0, 1.0, &third).unwrap();

        writer.flush().unwrap();
    }

    let reader = LogReader::new(buf.as_slice());
    let records: Vec<_> = reader.map(|r| r.unwrap()).collect();

    assert_eq!(records.len(), 3);
    assert_eq!(records[0].tag.as_deref(), Some("read"));
    assert_eq!(records[0].start_timestamp, 0.0);
    assert_eq!(records[0].histogram.total_count(), 1);

    assert_eq!(records[1].tag.as_deref(), Some("write"));
    assert_eq!(records[1].start_timestamp, 1.0);
    assert_eq!(records[1].histogram.total_count(), 3);

    assert_eq!(records[2].tag, None);
    assert_eq!(records[2].start_timestamp, 2.0);
    assert_eq!(records[2].histogram.total_count(), 1);
}
