// Copyright 2020 Twitter, Inc.
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

//! The single-writer histogram core: recording, merging, and quantile
//! queries over a fixed-memory counts array (`spec.md` §4.3).

use crate::counter::Counter;
use crate::error::Error;
use crate::geometry::Geometry;
use crate::storage::Counts;

/// A fixed-memory histogram over non-negative integers in
/// `[0, highest_trackable_value]`, with counts stored as `C`.
///
/// Not `Sync`-for-mutation: a single owner records into it. See
/// [`crate::concurrent::ConcurrentHistogram`] for the multi-writer variant.
#[derive(Debug, Clone)]
pub struct Histogram<C: Counter> {
    geometry: Geometry,
    counts: Counts<C>,
    min_value: Option<u64>,
    max_value: Option<u64>,
    start_time: u64,
    end_time: u64,
    tag: Option<String>,
    instance_id: Option<u64>,
}

impl<C: Counter> Histogram<C> {
    pub fn new(lowest: u64, highest: u64, significant_digits: u8) -> Result<Self, Error> {
        let geometry = Geometry::new(lowest, highest, significant_digits)?;
        let counts = Counts::new(geometry.counts_array_length());
        Ok(Histogram {
            geometry,
            counts,
            min_value: None,
            max_value: None,
            start_time: 0,
            end_time: 0,
            tag: None,
            instance_id: None,
        })
    }

    pub fn new_with_max(highest: u64, significant_digits: u8) -> Result<Self, Error> {
        Self::new(1, highest, significant_digits)
    }

    pub fn new_with_bounds(lowest: u64, highest: u64, significant_digits: u8) -> Result<Self, Error> {
        Self::new(lowest, highest, significant_digits)
    }

    pub fn builder() -> HistogramBuilder {
        HistogramBuilder::default()
    }

    pub fn geometry(&self) -> &Geometry {
        &self.geometry
    }

    pub fn tag(&self) -> Option<&str> {
        self.tag.as_deref()
    }

    pub fn set_tag(&mut self, tag: impl Into<String>) {
        self.tag = Some(tag.into());
    }

    pub fn instance_id(&self) -> Option<u64> {
        self.instance_id
    }

    pub fn set_instance_id(&mut self, id: u64) {
        self.instance_id = Some(id);
    }

    pub fn start_time(&self) -> u64 {
        self.start_time
    }

    pub fn set_start_time(&mut self, t: u64) {
        self.start_time = t;
    }

    pub fn end_time(&self) -> u64 {
        self.end_time
    }

    pub fn set_end_time(&mut self, t: u64) {
        self.end_time = t;
    }

    #[inline]
    pub fn record_value(&mut self, value: u64) -> Result<(), Error> {
        self.record_value_with_count(value, 1)
    }

    pub fn record_value_with_count(&mut self, value: u64, count: u64) -> Result<(), Error> {
        let index = self.geometry.checked_index_for(value)?;
        self.counts.add(index, count as i64)?;
        self.update_min_max(value);
        Ok(())
    }

    /// Records `value`, then backfills the samples a perfectly periodic
    /// sampler would have produced every `expected_interval` up to `value`
    /// (coordinated-omission correction; `spec.md` §4.3).
    pub fn record_value_with_expected_interval(
        &mut self,
        value: u64,
        expected_interval: u64,
    ) -> Result<(), Error> {
        self.record_single_value_with_expected_interval(value, 1, expected_interval)
    }

    fn record_single_value_with_expected_interval(
        &mut self,
        value: u64,
        count: u64,
        expected_interval: u64,
    ) -> Result<(), Error> {
        self.record_value_with_count(value, count)?;
        if expected_interval == 0 {
            return Ok(());
        }
        let mut missing = value as i128 - expected_interval as i128;
        while missing >= expected_interval as i128 {
            self.record_value_with_count(missing as u64, count)?;
            missing -= expected_interval as i128;
        }
        Ok(())
    }

    fn update_min_max(&mut self, value: u64) {
        if value != 0 {
            self.min_value = Some(self.min_value.map_or(value, |m| m.min(value)));
        }
        self.max_value = Some(self.max_value.map_or(value, |m| m.max(value)));
    }

    /// Adds every recorded sample of `other` into `self`. Fails with
    /// `Error::GeometryMismatch` if `other`'s trackable range exceeds
    /// `self`'s (`spec.md` §4.3).
    pub fn add<O: Counter>(&mut self, other: &Histogram<O>) -> Result<(), Error> {
        if other.geometry.highest_trackable_value() > self.geometry.highest_trackable_value() {
            return Err(Error::GeometryMismatch);
        }
        for (value, count) in other.recorded_values() {
            let median = other.geometry.median_equivalent_value(value);
            self.record_value_with_count(median, count as u64)?;
        }
        Ok(())
    }

    /// Removes every recorded sample of `other` from `self`. Fails with
    /// `Error::Underflow` if any counter would go negative; unlike a naive
    /// incremental loop, no counter is mutated unless every entry in
    /// `other` passes the underflow check first, so a failed call leaves
    /// `self` entirely unchanged (`spec.md` §4.3/§7 atomicity).
    pub fn subtract<O: Counter>(&mut self, other: &Histogram<O>) -> Result<(), Error> {
        if other.geometry.highest_trackable_value() > self.geometry.highest_trackable_value() {
            return Err(Error::GeometryMismatch);
        }
        let mut indices = Vec::new();
        for (value, count) in other.recorded_values() {
            let index = self.geometry.checked_index_for(value)?;
            if self.counts.get(index) < count {
                return Err(Error::Underflow);
            }
            indices.push((index, count));
        }
        for (index, count) in indices {
            self.counts.subtract(index, count)?;
        }
        Ok(())
    }

    pub fn reset(&mut self) {
        self.counts.clear();
        self.min_value = None;
        self.max_value = None;
        self.start_time = 0;
        self.end_time = 0;
    }

    /// Produces a fresh histogram with the same geometry whose samples are
    /// `self`'s samples, each re-expanded through
    /// `record_value_with_expected_interval` (`spec.md` §4.3).
    pub fn copy_corrected_for_coordinated_omission(
        &self,
        expected_interval: u64,
    ) -> Result<Self, Error> {
        let mut out = Histogram {
            geometry: self.geometry,
            counts: Counts::new(self.geometry.counts_array_length()),
            min_value: None,
            max_value: None,
            start_time: self.start_time,
            end_time: self.end_time,
            tag: self.tag.clone(),
            instance_id: self.instance_id,
        };
        for (value, count) in self.recorded_values() {
            out.record_single_value_with_expected_interval(value, count as u64, expected_interval)?;
        }
        Ok(out)
    }

    /// Iterates `(value, count)` pairs for every non-zero counts-array
    /// cell, in increasing index order.
    pub fn recorded_values(&self) -> impl Iterator<Item = (u64, i64)> + '_ {
        (0..self.counts.length()).filter_map(move |i| {
            let c = self.counts.get(i);
            if c == 0 {
                None
            } else {
                Some((self.geometry.value_from_index(i), c))
            }
        })
    }

    /// Raw counts-array access by index, for the codec and iteration
    /// modules — bypasses the value round-trip `count_at_value` does.
    pub fn count_at_index(&self, index: usize) -> i64 {
        self.counts.get(index)
    }

    pub fn count_at_value(&self, value: u64) -> Result<i64, Error> {
        Ok(self.counts.get(self.geometry.checked_index_for(value)?))
    }

    pub fn count_between_values(&self, low: u64, high: u64) -> Result<i64, Error> {
        let lo_idx = self.geometry.checked_index_for(low)?;
        let hi_idx = self.geometry.checked_index_for(high)?;
        if hi_idx < lo_idx {
            return Err(Error::ArgumentInvalid("low must be <= high"));
        }
        Ok((lo_idx..=hi_idx).map(|i| self.counts.get(i)).sum())
    }

    pub fn total_count(&self) -> i64 {
        self.counts.total_count()
    }

    pub fn min(&self) -> u64 {
        self.min_value
            .map(|v| self.geometry.lowest_equivalent_value(v))
            .unwrap_or(0)
    }

    pub fn max(&self) -> u64 {
        self.max_value
            .map(|v| self.geometry.highest_equivalent_value(v))
            .unwrap_or(0)
    }

    /// Single-writer histograms surface overflow immediately through
    /// `Result`; this exists for API parity with
    /// `ConcurrentHistogram::has_overflowed`, and always returns `false`.
    pub fn has_overflowed(&self) -> bool {
        false
    }

    pub fn mean(&self) -> Result<f64, Error> {
        let total = self.counts.total_count();
        if total == 0 {
            return Err(Error::Empty);
        }
        let mut sum = 0.0_f64;
        for (value, count) in self.recorded_values() {
            sum += self.geometry.median_equivalent_value(value) as f64 * count as f64;
        }
        Ok(sum / total as f64)
    }

    pub fn stddev(&self) -> Result<f64, Error> {
        let total = self.counts.total_count();
        if total == 0 {
            return Err(Error::Empty);
        }
        let mean = self.mean()?;
        let mut sum_sq = 0.0_f64;
        for (value, count) in self.recorded_values() {
            let v = self.geometry.median_equivalent_value(value) as f64;
            let dev = v - mean;
            sum_sq += dev * dev * count as f64;
        }
        Ok((sum_sq / total as f64).sqrt())
    }

    /// Value below which `percentile` percent of recorded samples fall,
    /// using the reference family's ceil-based count target and a linear
    /// scan of the counts array (`spec.md` §4.3).
    pub fn value_at_percentile(&self, percentile: f64) -> Result<u64, Error> {
        if !(0.0..=100.0).contains(&percentile) || percentile.is_nan() {
            return Err(Error::InvalidPercentile);
        }
        let total = self.counts.total_count();
        if total == 0 {
            return Err(Error::Empty);
        }
        let requested = percentile.min(100.0);
        let count_at_percentile = ((requested / 100.0) * total as f64).ceil() as i64;
        let count_at_percentile = count_at_percentile.max(1);

        let mut running = 0_i64;
        for i in 0..self.counts.length() {
            running += self.counts.get(i);
            if running >= count_at_percentile {
                let value_at_index = self.geometry.value_from_index(i);
                return Ok(if percentile == 0.0 {
                    self.geometry.lowest_equivalent_value(value_at_index)
                } else {
                    self.geometry.highest_equivalent_value(value_at_index)
                });
            }
        }
        Ok(self
            .geometry
            .highest_equivalent_value(self.geometry.highest_trackable_value()))
    }
}

/// Builds a [`Histogram`] from the configuration options `spec.md` §6
/// recognizes at construction: trackable range, significant digits, and an
/// optional tag/instance id.
#[derive(Debug, Clone)]
pub struct HistogramBuilder {
    lowest: u64,
    highest: u64,
    significant_digits: u8,
    tag: Option<String>,
    instance_id: Option<u64>,
}

impl Default for HistogramBuilder {
    fn default() -> Self {
        HistogramBuilder {
            lowest: 1,
            highest: 3_600_000_000,
            significant_digits: 3,
            tag: None,
            instance_id: None,
        }
    }
}

impl HistogramBuilder {
    pub fn lowest(mut self, lowest: u64) -> Self {
        self.lowest = lowest;
        self
    }

    pub fn highest(mut self, highest: u64) -> Self {
        self.highest = highest;
        self
    }

    pub fn significant_digits(mut self, digits: u8) -> Self {
        self.significant_digits = digits;
        self
    }

    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = Some(tag.into());
        self
    }

    pub fn instance_id(mut self, id: u64) -> Self {
        self.instance_id = Some(id);
        self
    }

    pub fn build<C: Counter>(self) -> Result<Histogram<C>, Error> {
        let mut h = Histogram::new(self.lowest, self.highest, self.significant_digits)?;
        h.tag = self.tag;
        h.instance_id = self.instance_id;
        Ok(h)
    }
}
