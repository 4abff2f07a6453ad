// Copyright 2020 Twitter, Inc.
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

//! Iteration strategies over a recorded [`Histogram`]: a single
//! [`HistogramIterator`] driven by an [`IterationStrategy`] sum type, rather
//! than a class hierarchy per strategy (`spec.md` §4.9, §9 Design Notes).

use crate::counter::Counter;
use crate::histogram::Histogram;

/// Which values a [`HistogramIterator`] stops at.
#[derive(Debug, Clone, Copy)]
pub enum IterationStrategy {
    /// Every counts-array slot, recorded or not.
    AllValues,
    /// Only slots with a non-zero count.
    RecordedValues,
    /// A step at every multiple of `value_units_per_bucket`, covering the
    /// full recorded range.
    LinearBucket { value_units_per_bucket: u64 },
    /// A step at `value_units_first_bucket`, `value_units_first_bucket *
    /// log_base`, `* log_base^2`, ... until the recorded range is covered.
    LogarithmicBucket {
        value_units_first_bucket: u64,
        log_base: f64,
    },
    /// A step at a sequence of percentiles that doubles resolution every
    /// `ticks_per_half_distance` steps as it approaches 100%.
    Percentile { ticks_per_half_distance: u32 },
}

/// One emitted step of iteration (`spec.md` §4.9).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IterationValue {
    pub value_iterated_to: u64,
    pub value_iterated_from: u64,
    pub count_at_value_iterated_to: i64,
    pub count_added_in_this_iteration_step: i64,
    pub total_count_to_this_value: i64,
    pub total_value_to_this_value: u128,
    pub percentile: f64,
    pub percentile_level_iterated_to: f64,
}

/// Drives one pass over a histogram's counts array per an
/// [`IterationStrategy`]. Borrows the histogram for the iterator's lifetime;
/// does not mutate it.
pub struct HistogramIterator<'h, C: Counter> {
    histogram: &'h Histogram<C>,
    strategy: IterationStrategy,

    end_index: usize,
    array_total_count: i64,

    current_index: usize,
    index_consumed: bool,

    total_count_to_current_index: i64,
    total_count_to_prev_index: i64,
    total_value_to_current_index: u128,
    prev_value_iterated_to: u64,

    // Linear/Logarithmic bucket state.
    next_boundary: u64,

    // Percentile state.
    percentile_level_to_iterate_to: f64,
    reached_top: bool,
}

impl<'h, C: Counter> HistogramIterator<'h, C> {
    pub(crate) fn new(histogram: &'h Histogram<C>, strategy: IterationStrategy) -> Self {
        let end_index = histogram.geometry().counts_array_length();
        let next_boundary = match strategy {
            IterationStrategy::LinearBucket {
                value_units_per_bucket,
            } => value_units_per_bucket.max(1),
            IterationStrategy::LogarithmicBucket {
                value_units_first_bucket,
                ..
            } => value_units_first_bucket.max(1),
            _ => 0,
        };
        HistogramIterator {
            histogram,
            strategy,
            end_index,
            array_total_count: histogram.total_count(),
            current_index: 0,
            index_consumed: false,
            total_count_to_current_index: 0,
            total_count_to_prev_index: 0,
            total_value_to_current_index: 0,
            prev_value_iterated_to: 0,
            next_boundary,
            percentile_level_to_iterate_to: 0.0,
            reached_top: false,
        }
    }

    fn consume_current_index(&mut self) -> i64 {
        if self.index_consumed {
            return self.histogram.count_at_index(self.current_index);
        }
        let geometry = self.histogram.geometry();
        let count = self.histogram.count_at_index(self.current_index);
        let value_at_index = geometry.value_from_index(self.current_index);
        self.total_count_to_current_index += count;
        self.total_value_to_current_index +=
            (count.max(0) as u128) * geometry.median_equivalent_value(value_at_index) as u128;
        self.index_consumed = true;
        count
    }

    fn build(&mut self, value_iterated_to: u64, percentile_level_iterated_to: f64) -> IterationValue {
        let value_iterated_from = self.prev_value_iterated_to;
        let percentile = if self.array_total_count > 0 {
            100.0 * self.total_count_to_current_index as f64 / self.array_total_count as f64
        } else {
            0.0
        };
        let result = IterationValue {
            value_iterated_to,
            value_iterated_from,
            count_at_value_iterated_to: self.histogram.count_at_index(self.current_index.min(self.end_index.saturating_sub(1))),
            count_added_in_this_iteration_step: self.total_count_to_current_index
                - self.total_count_to_prev_index,
            total_count_to_this_value: self.total_count_to_current_index,
            total_value_to_this_value: self.total_value_to_current_index,
            percentile,
            percentile_level_iterated_to,
        };
        self.prev_value_iterated_to = value_iterated_to;
        self.total_count_to_prev_index = self.total_count_to_current_index;
        result
    }

    fn advance_all(&mut self) -> Option<IterationValue> {
        if self.current_index >= self.end_index {
            return None;
        }
        self.consume_current_index();
        let geometry = self.histogram.geometry();
        let value_at_index = geometry.value_from_index(self.current_index);
        let value_iterated_to = geometry.highest_equivalent_value(value_at_index);
        let percentile_level = if self.array_total_count > 0 {
            100.0 * self.total_count_to_current_index as f64 / self.array_total_count as f64
        } else {
            0.0
        };
        let result = self.build(value_iterated_to, percentile_level);
        self.current_index += 1;
        self.index_consumed = false;
        Some(result)
    }

    fn advance_recorded(&mut self) -> Option<IterationValue> {
        let geometry = self.histogram.geometry();
        while self.current_index < self.end_index {
            let count = self.histogram.count_at_index(self.current_index);
            if count == 0 {
                let value_at_index = geometry.value_from_index(self.current_index);
                self.prev_value_iterated_to = geometry.highest_equivalent_value(value_at_index);
                self.current_index += 1;
                continue;
            }
            self.consume_current_index();
            let value_at_index = geometry.value_from_index(self.current_index);
            let value_iterated_to = geometry.highest_equivalent_value(value_at_index);
            let percentile_level = if self.array_total_count > 0 {
                100.0 * self.total_count_to_current_index as f64 / self.array_total_count as f64
            } else {
                0.0
            };
            let result = self.build(value_iterated_to, percentile_level);
            self.current_index += 1;
            self.index_consumed = false;
            return Some(result);
        }
        None
    }

    /// Shared body for `LinearBucket`/`LogarithmicBucket`: accumulate counts
    /// index by index until the current index's equivalent range crosses
    /// `self.next_boundary`, then emit a step there. A single wide bucket can
    /// straddle several boundaries in a row, in which case the same index is
    /// revisited (without double-counting) until it no longer covers the next
    /// boundary too.
    fn advance_bucketed(&mut self, next_step: impl Fn(u64) -> u64) -> Option<IterationValue> {
        loop {
            if self.current_index >= self.end_index {
                return None;
            }
            let geometry = self.histogram.geometry();
            let value_at_index = geometry.value_from_index(self.current_index);
            let highest_here = geometry.highest_equivalent_value(value_at_index);
            let boundary_lowest_equiv = geometry.lowest_equivalent_value(self.next_boundary);

            if highest_here < boundary_lowest_equiv {
                self.consume_current_index();
                self.current_index += 1;
                self.index_consumed = false;
                continue;
            }

            self.consume_current_index();
            let boundary = self.next_boundary;
            let percentile_level = if self.array_total_count > 0 {
                100.0 * self.total_count_to_current_index as f64 / self.array_total_count as f64
            } else {
                0.0
            };
            let result = self.build(boundary, percentile_level);
            self.next_boundary = next_step(self.next_boundary);

            if highest_here < geometry.lowest_equivalent_value(self.next_boundary) {
                self.current_index += 1;
                self.index_consumed = false;
            }
            return Some(result);
        }
    }

    fn advance_linear(&mut self, step: u64) -> Option<IterationValue> {
        self.advance_bucketed(move |boundary| boundary + step)
    }

    fn advance_logarithmic(&mut self, log_base: f64) -> Option<IterationValue> {
        self.advance_bucketed(move |boundary| {
            let next = (boundary as f64 * log_base).ceil() as u64;
            next.max(boundary + 1)
        })
    }

    fn next_percentile_level(&mut self, ticks_per_half_distance: u32) {
        if self.percentile_level_to_iterate_to >= 100.0 {
            return;
        }
        let p = self.percentile_level_to_iterate_to;
        let ratio = 2.0 * ticks_per_half_distance as f64 / (100.0 - p);
        let exponent = ratio.log2().ceil();
        self.percentile_level_to_iterate_to = (100.0 - 100.0 / 2f64.powf(exponent)).min(100.0);
    }

    fn advance_percentile(&mut self, ticks_per_half_distance: u32) -> Option<IterationValue> {
        if self.array_total_count == 0 {
            return None;
        }
        loop {
            if self.current_index >= self.end_index {
                if !self.reached_top {
                    self.reached_top = true;
                    let geometry = self.histogram.geometry();
                    let last_index = self.end_index - 1;
                    let value = geometry.highest_equivalent_value(geometry.value_from_index(last_index));
                    return Some(self.build(value, 100.0));
                }
                return None;
            }

            let count = self.consume_current_index();
            let current_percentile =
                100.0 * self.total_count_to_current_index as f64 / self.array_total_count as f64;

            if count != 0 && current_percentile >= self.percentile_level_to_iterate_to {
                let geometry = self.histogram.geometry();
                let value_at_index = geometry.value_from_index(self.current_index);
                let value_iterated_to = geometry.highest_equivalent_value(value_at_index);
                let level = self.percentile_level_to_iterate_to;
                let result = self.build(value_iterated_to, level);
                self.next_percentile_level(ticks_per_half_distance);
                self.current_index += 1;
                self.index_consumed = false;
                if self.current_index >= self.end_index {
                    self.reached_top = true;
                }
                return Some(result);
            }
            self.current_index += 1;
            self.index_consumed = false;
        }
    }
}

impl<'h, C: Counter> Iterator for HistogramIterator<'h, C> {
    type Item = IterationValue;

    fn next(&mut self) -> Option<IterationValue> {
        match self.strategy {
            IterationStrategy::AllValues => self.advance_all(),
            IterationStrategy::RecordedValues => self.advance_recorded(),
            IterationStrategy::LinearBucket {
                value_units_per_bucket,
            } => self.advance_linear(value_units_per_bucket),
            IterationStrategy::LogarithmicBucket { log_base, .. } => {
                self.advance_logarithmic(log_base)
            }
            IterationStrategy::Percentile {
                ticks_per_half_distance,
            } => self.advance_percentile(ticks_per_half_distance),
        }
    }
}

impl<C: Counter> Histogram<C> {
    /// Every counts-array slot, recorded or not, in index order.
    pub fn iter_all(&self) -> HistogramIterator<'_, C> {
        HistogramIterator::new(self, IterationStrategy::AllValues)
    }

    /// Only the slots with a non-zero count.
    pub fn iter_recorded(&self) -> HistogramIterator<'_, C> {
        HistogramIterator::new(self, IterationStrategy::RecordedValues)
    }

    /// A step at every multiple of `value_units_per_bucket`.
    pub fn iter_linear(&self, value_units_per_bucket: u64) -> HistogramIterator<'_, C> {
        HistogramIterator::new(
            self,
            IterationStrategy::LinearBucket {
                value_units_per_bucket,
            },
        )
    }

    /// A step at `value_units_first_bucket * log_base^k` for increasing `k`.
    pub fn iter_logarithmic(
        &self,
        value_units_first_bucket: u64,
        log_base: f64,
    ) -> HistogramIterator<'_, C> {
        HistogramIterator::new(
            self,
            IterationStrategy::LogarithmicBucket {
                value_units_first_bucket,
                log_base,
            },
        )
    }

    /// A step at a percentile sequence that doubles resolution every
    /// `ticks_per_half_distance` steps as it approaches 100%.
    pub fn iter_percentiles(&self, ticks_per_half_distance: u32) -> HistogramIterator<'_, C> {
        HistogramIterator::new(
            self,
            IterationStrategy::Percentile {
                ticks_per_half_distance,
            },
        )
    }
}
