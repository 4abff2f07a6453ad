// Copyright 2020 Twitter, Inc.
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

//! A histogram that accepts recordings from unbounded concurrent writers
//! without any writer ever blocking, by keeping two counts arrays and
//! using the [`WriterReaderPhaser`](crate::phaser::WriterReaderPhaser) to
//! know when the array not currently receiving writes has fully drained
//! (`spec.md` §4.5).

use crate::counter::Counter;
use crate::error::Error;
use crate::geometry::Geometry;
use crate::histogram::Histogram;
use crate::phaser::WriterReaderPhaser;
use crate::storage::AtomicCounts;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};

/// Lock-free multi-writer histogram. `record_value` never blocks and never
/// contends with other writers beyond a single atomic add. Snapshotting
/// (`copy_counts_into`, `add`, `subtract`, `reset`) is reader-exclusive and
/// intended for a single collecting thread.
pub struct ConcurrentHistogram {
    geometry: Geometry,
    counts: [AtomicCounts; 2],
    /// Rotates which index of a `counts_array_length`-sized ring the
    /// geometry's raw index maps to, so a full-array rescale (e.g. after
    /// `shift_values_left`/`right`) costs one atomic store instead of a
    /// rewrite of every cell.
    normalizing_offset: AtomicI64,
    phaser: WriterReaderPhaser,
    min_value: AtomicU64,
    max_value: AtomicU64,
}

impl ConcurrentHistogram {
    pub fn new(lowest: u64, highest: u64, significant_digits: u8) -> Result<Self, Error> {
        let geometry = Geometry::new(lowest, highest, significant_digits)?;
        let len = geometry.counts_array_length();
        Ok(ConcurrentHistogram {
            geometry,
            counts: [AtomicCounts::new(len), AtomicCounts::new(len)],
            normalizing_offset: AtomicI64::new(0),
            phaser: WriterReaderPhaser::new(),
            min_value: AtomicU64::new(u64::MAX),
            max_value: AtomicU64::new(0),
        })
    }

    pub fn geometry(&self) -> &Geometry {
        &self.geometry
    }

    fn normalize(&self, base_index: usize, offset: i64, len: usize) -> usize {
        if offset == 0 {
            return base_index;
        }
        let len = len as i64;
        let mut normalized = base_index as i64 - offset;
        if normalized < 0 {
            normalized += len;
        } else if normalized >= len {
            normalized -= len;
        }
        normalized as usize
    }

    fn denormalize(&self, slot: usize, offset: i64, len: usize) -> usize {
        if offset == 0 {
            return slot;
        }
        let len = len as i64;
        let mut base = slot as i64 + offset;
        if base >= len {
            base -= len;
        } else if base < 0 {
            base += len;
        }
        base as usize
    }

    #[inline]
    pub fn record_value(&self, value: u64) -> Result<(), Error> {
        self.record_value_with_count(value, 1)
    }

    /// Wait-free: one `checked_index_for` (pure arithmetic), one phaser
    /// enter/exit pair, one atomic add.
    pub fn record_value_with_count(&self, value: u64, count: u64) -> Result<(), Error> {
        let base_index = self.geometry.checked_index_for(value)?;
        let token = self.phaser.writer_enter();
        let array = if token < 0 { &self.counts[1] } else { &self.counts[0] };
        let offset = self.normalizing_offset.load(Ordering::Acquire);
        let slot = self.normalize(base_index, offset, array.length());
        array.record(slot, count as i64, Ordering::Relaxed);
        self.phaser.writer_exit(token);
        self.update_min_max(value);
        Ok(())
    }

    fn update_min_max(&self, value: u64) {
        if value != 0 {
            self.min_value.fetch_min(value, Ordering::Relaxed);
        }
        self.max_value.fetch_max(value, Ordering::Relaxed);
    }

    pub fn total_count(&self) -> i64 {
        self.counts[0].total_count(Ordering::Relaxed) + self.counts[1].total_count(Ordering::Relaxed)
    }

    pub fn min(&self) -> u64 {
        if self.total_count() == 0 {
            return 0;
        }
        let m = self.min_value.load(Ordering::Relaxed);
        self.geometry.lowest_equivalent_value(m)
    }

    pub fn max(&self) -> u64 {
        if self.total_count() == 0 {
            return 0;
        }
        let m = self.max_value.load(Ordering::Relaxed);
        self.geometry.highest_equivalent_value(m)
    }

    /// Always `false`: the underlying cells are `u64` and a single
    /// histogram cannot realistically accumulate `2^64` samples.
    pub fn has_overflowed(&self) -> bool {
        false
    }

    /// Flips the phaser (draining whichever array writers are not
    /// currently targeting), folds its counts into `dest`, merges them
    /// into the newly-active array so no sample is lost, and clears the
    /// drained array so it is ready to serve as the inactive buffer again.
    pub fn copy_counts_into<C: Counter>(&self, dest: &mut Histogram<C>) -> Result<(), Error> {
        let guard = self.phaser.reader_lock();
        let next_is_even = self.phaser.flip_phase(&guard);
        let drained_idx = if next_is_even { 1 } else { 0 };
        let active_idx = 1 - drained_idx;

        let offset = self.normalizing_offset.load(Ordering::Acquire);
        let len = self.geometry.counts_array_length();
        let drained = &self.counts[drained_idx];

        for slot in 0..len {
            let count = drained.get(slot, Ordering::Relaxed);
            if count == 0 {
                continue;
            }
            let base_index = self.denormalize(slot, offset, len);
            let value = self.geometry.value_from_index(base_index);
            dest.record_value_with_count(value, count as u64)?;
            self.counts[active_idx].record(slot, count, Ordering::Relaxed);
        }
        drained.clear(Ordering::Relaxed);
        drop(guard);
        Ok(())
    }

    /// Like `copy_counts_into`, but destructive: the drained array's counts
    /// are *not* folded back into the active array. Each call returns
    /// exactly the samples recorded since the previous call (or since
    /// construction), with no overlap — the partition
    /// [`Recorder`](crate::recorder::Recorder) relies on.
    pub fn interval_histogram_into<C: Counter>(&self, dest: &mut Histogram<C>) -> Result<(), Error> {
        let guard = self.phaser.reader_lock();
        let next_is_even = self.phaser.flip_phase(&guard);
        let drained_idx = if next_is_even { 1 } else { 0 };

        let offset = self.normalizing_offset.load(Ordering::Acquire);
        let len = self.geometry.counts_array_length();
        let drained = &self.counts[drained_idx];

        for slot in 0..len {
            let count = drained.get(slot, Ordering::Relaxed);
            if count == 0 {
                continue;
            }
            let base_index = self.denormalize(slot, offset, len);
            let value = self.geometry.value_from_index(base_index);
            dest.record_value_with_count(value, count as u64)?;
        }
        drained.clear(Ordering::Relaxed);
        drop(guard);
        Ok(())
    }

    /// Replays every recorded sample of `other` through the normal
    /// wait-free recording path.
    pub fn add<C: Counter>(&self, other: &Histogram<C>) -> Result<(), Error> {
        if other.geometry().highest_trackable_value() > self.geometry.highest_trackable_value() {
            return Err(Error::GeometryMismatch);
        }
        for (value, count) in other.recorded_values() {
            let median = other.geometry().median_equivalent_value(value);
            self.record_value_with_count(median, count as u64)?;
        }
        Ok(())
    }

    /// Best-effort under the reader lock: concurrent with in-flight writers
    /// to the currently-active array, this can still observe a transient
    /// undercount. A full validation pass over every entry in `other` runs
    /// first, against the values actually read; only if every entry clears
    /// does a second pass apply the subtractions, so a failing call leaves
    /// the active array entirely unchanged (`spec.md` §4.3/§7 atomicity).
    pub fn subtract<C: Counter>(&self, other: &Histogram<C>) -> Result<(), Error> {
        if other.geometry().highest_trackable_value() > self.geometry.highest_trackable_value() {
            return Err(Error::GeometryMismatch);
        }
        let guard = self.phaser.reader_lock();
        let active_idx = if self.phaser.is_odd_phase() { 1 } else { 0 };
        let offset = self.normalizing_offset.load(Ordering::Acquire);
        let len = self.geometry.counts_array_length();

        let mut slots = Vec::new();
        for (value, count) in other.recorded_values() {
            let base_index = match self.geometry.checked_index_for(value) {
                Ok(i) => i,
                Err(e) => {
                    drop(guard);
                    return Err(e);
                }
            };
            let slot = self.normalize(base_index, offset, len);
            let current = self.counts[active_idx].get(slot, Ordering::Relaxed);
            if current < count {
                drop(guard);
                return Err(Error::Underflow);
            }
            slots.push((slot, count));
        }
        for (slot, count) in slots {
            self.counts[active_idx].record(slot, -count, Ordering::Relaxed);
        }
        drop(guard);
        Ok(())
    }

    /// Drains and clears both arrays, and resets the normalizing offset and
    /// min/max trackers.
    pub fn reset(&self) {
        let guard = self.phaser.reader_lock();
        for _ in 0..2 {
            let next_is_even = self.phaser.flip_phase(&guard);
            let drained_idx = if next_is_even { 1 } else { 0 };
            self.counts[drained_idx].clear(Ordering::Relaxed);
        }
        self.normalizing_offset.store(0, Ordering::Release);
        self.min_value.store(u64::MAX, Ordering::Relaxed);
        self.max_value.store(0, Ordering::Relaxed);
        drop(guard);
    }

    /// Rescales every already-recorded value by `2^bit_shift_amount` by
    /// moving the normalizing offset rather than rewriting the array.
    pub fn shift_values_left(&self, bit_shift_amount: u32) {
        if bit_shift_amount == 0 {
            return;
        }
        let guard = self.phaser.reader_lock();
        let len = self.geometry.counts_array_length() as i64;
        let shift = bit_shift_amount as i64 * self.geometry.sub_bucket_half_count() as i64;
        let offset = self.normalizing_offset.load(Ordering::Acquire);
        let shifted = ((offset - shift) % len + len) % len;
        self.normalizing_offset.store(shifted, Ordering::Release);
        drop(guard);
    }

    pub fn shift_values_right(&self, bit_shift_amount: u32) {
        if bit_shift_amount == 0 {
            return;
        }
        let guard = self.phaser.reader_lock();
        let len = self.geometry.counts_array_length() as i64;
        let shift = bit_shift_amount as i64 * self.geometry.sub_bucket_half_count() as i64;
        let offset = self.normalizing_offset.load(Ordering::Acquire);
        let shifted = (offset + shift) % len;
        self.normalizing_offset.store(shifted, Ordering::Release);
        drop(guard);
    }
}
