// Copyright 2020 Twitter, Inc.
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

//! Pure bucket/sub-bucket encoding. `Geometry` derives every constant from
//! `(lowest, highest, significant_digits)` once at construction and then
//! maps values to counts-array indices and back with no hidden state.

use crate::bits::leading_zeros_64;
use crate::error::Error;

/// Immutable geometry for one histogram configuration. Two histograms built
/// from the same `(lowest, highest, significant_digits)` always produce
/// identical indices for identical values (`spec.md` §4.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Geometry {
    lowest: u64,
    highest: u64,
    significant_digits: u8,

    unit_magnitude: u32,
    sub_bucket_half_count_magnitude: u32,
    sub_bucket_count: u64,
    sub_bucket_half_count: u64,
    sub_bucket_mask: u64,
    bucket_index_offset: i64,
    bucket_count: u32,
    counts_array_length: usize,
}

impl Geometry {
    /// Derive geometry from the three configuration parameters in
    /// `spec.md` §3. Returns `Error::ArgumentInvalid` if the bounds there
    /// are violated, or if the combination cannot be represented (mirrors
    /// the reference family's `CannotRepresentSigFigBeyondLow`).
    pub fn new(lowest: u64, highest: u64, significant_digits: u8) -> Result<Self, Error> {
        if lowest < 1 {
            log::warn!("rejecting histogram geometry: lowest_trackable_value {lowest} < 1");
            return Err(Error::ArgumentInvalid("lowest_trackable_value must be >= 1"));
        }
        if highest < 2 * lowest {
            log::warn!(
                "rejecting histogram geometry: highest_trackable_value {highest} < 2 * lowest_trackable_value {lowest}"
            );
            return Err(Error::ArgumentInvalid(
                "highest_trackable_value must be >= 2 * lowest_trackable_value",
            ));
        }
        if significant_digits > 5 {
            log::warn!(
                "rejecting histogram geometry: significant_digits {significant_digits} > 5"
            );
            return Err(Error::ArgumentInvalid(
                "significant_value_digits must be in [0, 5]",
            ));
        }

        let unit_magnitude = 63 - leading_zeros_64(lowest);

        let target = 2 * 10_u64.pow(significant_digits as u32);
        let mut sub_bucket_count_magnitude = 0_u32;
        while (1_u64 << sub_bucket_count_magnitude) < target {
            sub_bucket_count_magnitude += 1;
        }

        let sub_bucket_half_count_magnitude = sub_bucket_count_magnitude.max(2) - 1;
        let sub_bucket_count = 1_u64 << (sub_bucket_half_count_magnitude + 1);
        let sub_bucket_half_count = sub_bucket_count / 2;

        let sub_bucket_mask = (sub_bucket_count - 1)
            .checked_shl(unit_magnitude)
            .ok_or(Error::ArgumentInvalid(
                "lowest_trackable_value is too large for the requested precision",
            ))?;

        let bucket_index_offset =
            64_i64 - unit_magnitude as i64 - (sub_bucket_half_count_magnitude as i64 + 1);
        if bucket_index_offset < 0 {
            return Err(Error::ArgumentInvalid(
                "cannot represent this many significant digits at this lowest_trackable_value",
            ));
        }

        // smallest b >= 1 such that sub_bucket_mask << (b - 1) >= highest
        let mut bucket_count = 1_u32;
        let mut reach = sub_bucket_mask as u128;
        while reach < highest as u128 {
            reach <<= 1;
            bucket_count += 1;
        }

        let counts_array_length = (bucket_count as usize + 1) * sub_bucket_half_count as usize;

        Ok(Geometry {
            lowest,
            highest,
            significant_digits,
            unit_magnitude,
            sub_bucket_half_count_magnitude,
            sub_bucket_count,
            sub_bucket_half_count,
            sub_bucket_mask,
            bucket_index_offset,
            bucket_count,
            counts_array_length,
        })
    }

    pub fn lowest_trackable_value(&self) -> u64 {
        self.lowest
    }

    pub fn highest_trackable_value(&self) -> u64 {
        self.highest
    }

    pub fn significant_digits(&self) -> u8 {
        self.significant_digits
    }

    pub fn unit_magnitude(&self) -> u32 {
        self.unit_magnitude
    }

    pub fn sub_bucket_count(&self) -> u64 {
        self.sub_bucket_count
    }

    pub fn sub_bucket_half_count(&self) -> u64 {
        self.sub_bucket_half_count
    }

    pub fn sub_bucket_mask(&self) -> u64 {
        self.sub_bucket_mask
    }

    pub fn bucket_count(&self) -> u32 {
        self.bucket_count
    }

    pub fn counts_array_length(&self) -> usize {
        self.counts_array_length
    }

    /// `bucketIndexOffset − leadingZeros(v | subBucketMask)`. Never
    /// negative: ORing in `sub_bucket_mask` guarantees
    /// `leading_zeros(v | mask) <= leading_zeros(mask) == bucket_index_offset`.
    #[inline]
    pub fn bucket_index(&self, value: u64) -> u32 {
        (self.bucket_index_offset - leading_zeros_64(value | self.sub_bucket_mask) as i64) as u32
    }

    #[inline]
    pub fn sub_bucket_index(&self, value: u64, bucket_index: u32) -> u64 {
        value >> (bucket_index + self.unit_magnitude)
    }

    /// Map `(bucket_index, sub_bucket_index)` to a flat counts-array index.
    #[inline]
    pub fn counts_index(&self, bucket_index: u32, sub_bucket_index: u64) -> usize {
        let bucket_base_index =
            ((bucket_index as u64 + 1) << self.sub_bucket_half_count_magnitude) as i64;
        (bucket_base_index + sub_bucket_index as i64 - self.sub_bucket_half_count as i64) as usize
    }

    /// Index for a value already known to be within range; combines
    /// `bucket_index`, `sub_bucket_index`, and `counts_index`.
    #[inline]
    pub fn index_for(&self, value: u64) -> usize {
        let b = self.bucket_index(value);
        let s = self.sub_bucket_index(value, b);
        self.counts_index(b, s)
    }

    /// `index_for`, but validated against `highest_trackable_value` and the
    /// counts-array length (`spec.md` invariant I1).
    pub fn checked_index_for(&self, value: u64) -> Result<usize, Error> {
        if value > self.highest {
            return Err(Error::ValueOutOfRange);
        }
        let index = self.index_for(value);
        if index >= self.counts_array_length {
            return Err(Error::ValueOutOfRange);
        }
        Ok(index)
    }

    /// Inverse of `counts_index`: recovers the lowest value that maps to
    /// counts-array index `i`.
    pub fn value_from_index(&self, index: usize) -> u64 {
        let mut bucket_index = (index >> self.sub_bucket_half_count_magnitude) as i64 - 1;
        let mut sub_bucket_index =
            (index as u64 & (self.sub_bucket_half_count - 1)) + self.sub_bucket_half_count;
        if bucket_index < 0 {
            sub_bucket_index -= self.sub_bucket_half_count;
            bucket_index = 0;
        }
        sub_bucket_index << (bucket_index as u32 + self.unit_magnitude)
    }

    /// Width of the bin that `value` falls into (`spec.md` invariant I2).
    ///
    /// The reference family special-cases `sub_bucket_index >= sub_bucket_count`
    /// (reached right at the edge of the top bucket, where naive bucket-index
    /// truncation undercounts by one bit of resolution); derived here from
    /// first principles rather than copied verbatim (`spec.md` §9 open
    /// question).
    pub fn size_of_equivalent_value_range(&self, value: u64) -> u64 {
        let bucket_index = self.bucket_index(value);
        let sub_bucket_index = self.sub_bucket_index(value, bucket_index);
        let widened = if sub_bucket_index >= self.sub_bucket_count {
            1
        } else {
            0
        };
        1_u64 << (self.unit_magnitude + bucket_index + widened)
    }

    pub fn lowest_equivalent_value(&self, value: u64) -> u64 {
        let bucket_index = self.bucket_index(value);
        let sub_bucket_index = self.sub_bucket_index(value, bucket_index);
        sub_bucket_index << (bucket_index + self.unit_magnitude)
    }

    pub fn next_non_equivalent_value(&self, value: u64) -> u64 {
        self.lowest_equivalent_value(value) + self.size_of_equivalent_value_range(value)
    }

    pub fn highest_equivalent_value(&self, value: u64) -> u64 {
        self.next_non_equivalent_value(value) - 1
    }

    pub fn values_are_equivalent(&self, a: u64, b: u64) -> bool {
        self.lowest_equivalent_value(a) == self.lowest_equivalent_value(b)
    }

    /// The median (mid-point) equivalent value, used when merging counters
    /// recorded under a different geometry (`spec.md` §4.3 `Add`).
    pub fn median_equivalent_value(&self, value: u64) -> u64 {
        self.lowest_equivalent_value(value) + (self.size_of_equivalent_value_range(value) >> 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn geom(lowest: u64, highest: u64, digits: u8) -> Geometry {
        Geometry::new(lowest, highest, digits).unwrap()
    }

    #[test]
    fn unit_magnitude_0_index_calculations() {
        let g = geom(1, 1_u64 << 32, 3);
        assert_eq!(g.sub_bucket_count(), 2048);
        assert_eq!(g.unit_magnitude(), 0);
        assert_eq!(g.bucket_count(), 23);

        assert_eq!(g.bucket_index(3), 0);
        assert_eq!(g.sub_bucket_index(3, 0), 3);

        assert_eq!(g.bucket_index(1024 + 3), 0);
        assert_eq!(g.sub_bucket_index(1024 + 3, 0), 1024 + 3);

        assert_eq!(g.bucket_index(2048 + 3 * 2), 1);
        assert_eq!(g.sub_bucket_index(2048 + 3 * 2, 1), 1024 + 3);
    }

    #[test]
    fn unit_magnitude_4_index_calculations() {
        let g = geom(1_u64 << 12, 1_u64 << 32, 3);
        assert_eq!(g.sub_bucket_count(), 2048);
        assert_eq!(g.unit_magnitude(), 12);
        assert_eq!(g.bucket_count(), 11);

        let unit = 1_u64 << 12;
        assert_eq!(g.bucket_index(3), 0);
        assert_eq!(g.sub_bucket_index(3, 0), 0);
        assert_eq!(g.bucket_index(3 * unit), 0);
        assert_eq!(g.sub_bucket_index(3 * unit, 0), 3);
    }

    #[test]
    fn init_fields_smallest_possible_array() {
        let g = geom(1, 2, 0);
        assert_eq!(g.sub_bucket_count(), 2);
        assert_eq!(g.sub_bucket_half_count(), 1);
        assert_eq!(g.bucket_count(), 2);
        assert_eq!(g.counts_array_length(), 3);
        assert_eq!(g.sub_bucket_mask(), 1);
        assert_eq!(g.unit_magnitude(), 0);
    }

    #[test]
    fn init_fields_max_value_max_precision() {
        let g = geom(1, u64::MAX, 5);
        assert_eq!(g.sub_bucket_count(), 1 << 18);
        assert_eq!(g.sub_bucket_half_count(), 1 << 17);
        assert_eq!(g.bucket_count(), 47);
    }

    #[test]
    fn unit_magnitude_53_sub_bucket_magnitude_11_is_invalid() {
        assert!(Geometry::new(1_u64 << 53, 1_u64 << 63, 3).is_err());
    }

    #[test]
    fn bucket_for_smallest_value_in_first_bucket() {
        let g = geom(1, 100_000, 3);
        assert_eq!(g.bucket_index(0), 0);
    }

    #[test]
    fn bucket_for_biggest_value_in_first_bucket() {
        let g = geom(1, 100_000, 3);
        assert_eq!(g.bucket_index(2047), 0);
    }

    #[test]
    fn bucket_for_smallest_value_in_second_bucket() {
        let g = geom(1, 100_000, 3);
        assert_eq!(g.bucket_index(2048), 1);
    }

    #[test]
    fn index_for_below_smallest_clamps_to_zero() {
        let g = geom(1024, 100_000, 3);
        assert_eq!(g.bucket_index(0), 0);
        assert_eq!(g.bucket_index(1), 0);
        assert_eq!(g.bucket_index(1023), 0);
    }

    #[test]
    fn index_for_way_past_largest_value_exceeds_length() {
        let g = geom(1, 100_000, 3);
        assert_eq!(g.counts_array_length(), 8 * 1024);
        assert_eq!(g.index_for(1 << 40), 1024 * (30 + 1));
    }

    #[test]
    fn round_trip_p1() {
        let g = geom(1, 3_600_000_000, 3);
        for v in [1_u64, 100, 10_000, 1_000_000, 3_600_000_000] {
            let lo = g.lowest_equivalent_value(v);
            let next = g.next_non_equivalent_value(v);
            assert!(lo <= v && v < next, "v={v} lo={lo} next={next}");
            let idx = g.index_for(v);
            assert_eq!(g.value_from_index(idx), lo);
        }
    }

    #[test]
    fn relative_error_bound_p2() {
        for digits in 0..=5 {
            let g = geom(1, 1_u64 << 40, digits);
            let expected_max_error = 2.0 * 10f64.powi(-(digits as i32));
            for v in [10_u64, 1_000, 100_000, 10_000_000] {
                let range = g.size_of_equivalent_value_range(v);
                let relative = range as f64 / v as f64;
                assert!(
                    relative <= expected_max_error * 1.01,
                    "digits={digits} v={v} relative={relative} bound={expected_max_error}"
                );
            }
        }
    }

    #[test]
    fn size_of_equivalent_value_range_at_top_edge_regression() {
        // Exercises the sub_bucket_index >= sub_bucket_count widening at the
        // boundary of the top bucket.
        let g = geom(1, 3_600_000_000, 3);
        let top = g.highest_trackable_value();
        let range = g.size_of_equivalent_value_range(top);
        assert!(range > 0);
        assert_eq!(g.next_non_equivalent_value(top) - 1, g.highest_equivalent_value(top));
    }

    #[test]
    fn value_zero_is_accepted_and_routes_to_bucket_zero() {
        let g = geom(1, 100_000, 3);
        assert_eq!(g.bucket_index(0), 0);
        assert_eq!(g.checked_index_for(0).unwrap(), 0);
    }
}
