// Copyright 2020 Twitter, Inc.
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

//! Pluggable counter storage widths. `Counter` is implemented for the
//! signed fixed-width integers the histogram core stores counts in;
//! `AtomicCounter` is the single atomic realization used by the concurrent
//! histogram's dual counts arrays.

use crate::error::Error;
use std::sync::atomic::{AtomicU64, Ordering};

/// A single-writer counter cell. Implementors detect overflow rather than
/// wrapping or saturating silently (`spec.md` §4.2).
pub trait Counter: Copy + Default + PartialEq + PartialOrd + 'static {
    /// Zero value for a fresh cell.
    const ZERO: Self;

    /// Add `delta` (always non-negative) to `self`, failing rather than
    /// wrapping if the result would exceed the type's representable range.
    fn checked_add(self, delta: i64) -> Result<Self, Error>;

    /// Subtract `delta` (always non-negative), failing if the result would
    /// go negative.
    fn checked_sub(self, delta: i64) -> Result<Self, Error>;

    fn to_i64(self) -> i64;

    fn from_i64(v: i64) -> Self;
}

macro_rules! impl_counter_signed {
    ($t:ty) => {
        impl Counter for $t {
            const ZERO: Self = 0;

            #[inline]
            fn checked_add(self, delta: i64) -> Result<Self, Error> {
                let sum = self as i64 + delta;
                if sum > <$t>::MAX as i64 {
                    return Err(Error::CounterOverflow);
                }
                Ok(sum as $t)
            }

            #[inline]
            fn checked_sub(self, delta: i64) -> Result<Self, Error> {
                let diff = self as i64 - delta;
                if diff < 0 {
                    return Err(Error::Underflow);
                }
                Ok(diff as $t)
            }

            #[inline]
            fn to_i64(self) -> i64 {
                self as i64
            }

            #[inline]
            fn from_i64(v: i64) -> Self {
                v as $t
            }
        }
    };
}

impl_counter_signed!(i16);
impl_counter_signed!(i32);
impl_counter_signed!(i64);

/// A single-writer-many-readers atomic counter cell, backed by `AtomicU64`
/// and used only by the concurrent histogram. Counts never go negative in
/// the concurrent path (subtraction happens only on the reader-owned
/// inactive array under the phaser lock), so `u64` storage is sufficient.
pub trait AtomicCounter {
    fn new_atomic(v: i64) -> Self;
    fn load(&self, order: Ordering) -> i64;
    fn fetch_add(&self, delta: i64, order: Ordering) -> i64;
    fn store(&self, v: i64, order: Ordering);
}

impl AtomicCounter for AtomicU64 {
    #[inline]
    fn new_atomic(v: i64) -> Self {
        AtomicU64::new(v as u64)
    }

    #[inline]
    fn load(&self, order: Ordering) -> i64 {
        AtomicU64::load(self, order) as i64
    }

    #[inline]
    fn fetch_add(&self, delta: i64, order: Ordering) -> i64 {
        AtomicU64::fetch_add(self, delta as u64, order) as i64
    }

    #[inline]
    fn store(&self, v: i64, order: Ordering) {
        AtomicU64::store(self, v as u64, order)
    }
}
