// Copyright 2020 Twitter, Inc.
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

//! `Recorder` is the façade most callers reach for: wrap a
//! [`ConcurrentHistogram`] and call `sample()` on whatever cadence the
//! caller likes to get the exact, non-overlapping interval of samples
//! recorded since the previous call (`spec.md` §4.6).

use crate::concurrent::ConcurrentHistogram;
use crate::counter::Counter;
use crate::error::Error;
use crate::histogram::Histogram;
use std::marker::PhantomData;

/// Wraps a [`ConcurrentHistogram`] and partitions its recording stream
/// into disjoint, contiguous intervals.
pub struct Recorder<C: Counter> {
    histogram: ConcurrentHistogram,
    _marker: PhantomData<C>,
}

impl<C: Counter> Recorder<C> {
    pub fn new(lowest: u64, highest: u64, significant_digits: u8) -> Result<Self, Error> {
        Ok(Recorder {
            histogram: ConcurrentHistogram::new(lowest, highest, significant_digits)?,
            _marker: PhantomData,
        })
    }

    /// Record a single value. Wait-free, safe from any number of threads.
    #[inline]
    pub fn record_value(&self, value: u64) -> Result<(), Error> {
        self.histogram.record_value(value)
    }

    #[inline]
    pub fn record_value_with_count(&self, value: u64, count: u64) -> Result<(), Error> {
        self.histogram.record_value_with_count(value, count)
    }

    /// Returns a freshly-allocated histogram containing exactly the
    /// samples recorded since the last call to `sample` (or since
    /// construction for the first call). Safe to call concurrently with
    /// any number of writers; not safe to call from more than one reader
    /// thread at a time.
    pub fn sample(&self) -> Result<Histogram<C>, Error> {
        let mut interval = Histogram::new(
            self.histogram.geometry().lowest_trackable_value(),
            self.histogram.geometry().highest_trackable_value(),
            self.histogram.geometry().significant_digits(),
        )?;
        self.histogram.interval_histogram_into(&mut interval)?;
        Ok(interval)
    }

    /// Same as `sample`, but reuses `dest` instead of allocating a new
    /// histogram — `dest` is reset first.
    pub fn sample_into(&self, dest: &mut Histogram<C>) -> Result<(), Error> {
        dest.reset();
        self.histogram.interval_histogram_into(dest)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn samples_partition_the_recording_stream_exactly() {
        let recorder: Recorder<i64> = Recorder::new(1, 100_000, 3).unwrap();
        for v in 1..=50_u64 {
            recorder.record_value(v).unwrap();
        }
        let first = recorder.sample().unwrap();
        assert_eq!(first.total_count(), 50);

        for v in 1..=30_u64 {
            recorder.record_value(v).unwrap();
        }
        let second = recorder.sample().unwrap();
        assert_eq!(second.total_count(), 30);

        let third = recorder.sample().unwrap();
        assert_eq!(third.total_count(), 0);
    }

    #[test]
    fn sample_into_reuses_destination() {
        let recorder: Recorder<i64> = Recorder::new(1, 100_000, 3).unwrap();
        recorder.record_value(10).unwrap();
        let mut dest: Histogram<i64> = Histogram::new(1, 100_000, 3).unwrap();
        recorder.sample_into(&mut dest).unwrap();
        assert_eq!(dest.total_count(), 1);

        recorder.record_value(20).unwrap();
        recorder.sample_into(&mut dest).unwrap();
        assert_eq!(dest.total_count(), 1);
        assert_eq!(dest.count_at_value(20).unwrap(), 1);
    }
}
