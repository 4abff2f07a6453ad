// Copyright 2020 Twitter, Inc.
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

//! Counts-array storage built on top of the `Counter`/`AtomicCounter`
//! traits: a plain single-writer array (`Counts`) and an atomic array
//! (`AtomicCounts`) used by the concurrent histogram.

use crate::counter::{AtomicCounter, Counter};
use crate::error::Error;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};

/// Single-writer counts array plus a running total, as described by
/// `spec.md` §4.2.
#[derive(Debug, Clone)]
pub struct Counts<C: Counter> {
    cells: Vec<C>,
    total_count: i64,
}

impl<C: Counter> Counts<C> {
    pub fn new(length: usize) -> Self {
        Counts {
            cells: vec![C::ZERO; length],
            total_count: 0,
        }
    }

    #[inline]
    pub fn length(&self) -> usize {
        self.cells.len()
    }

    #[inline]
    pub fn get(&self, index: usize) -> i64 {
        self.cells[index].to_i64()
    }

    pub fn set(&mut self, index: usize, value: i64) {
        let previous = self.cells[index].to_i64();
        self.cells[index] = C::from_i64(value);
        self.total_count += value - previous;
    }

    pub fn add(&mut self, index: usize, delta: i64) -> Result<(), Error> {
        let updated = self.cells[index].checked_add(delta)?;
        self.cells[index] = updated;
        self.total_count += delta;
        Ok(())
    }

    pub fn subtract(&mut self, index: usize, delta: i64) -> Result<(), Error> {
        let updated = self.cells[index].checked_sub(delta)?;
        self.cells[index] = updated;
        self.total_count -= delta;
        Ok(())
    }

    #[inline]
    pub fn increment(&mut self, index: usize) -> Result<(), Error> {
        self.add(index, 1)
    }

    pub fn clear(&mut self) {
        for cell in self.cells.iter_mut() {
            *cell = C::ZERO;
        }
        self.total_count = 0;
    }

    #[inline]
    pub fn total_count(&self) -> i64 {
        self.total_count
    }

    pub fn iter(&self) -> impl Iterator<Item = i64> + '_ {
        self.cells.iter().map(|c| c.to_i64())
    }
}

/// Atomic counts array backing `ConcurrentHistogram`'s active/inactive
/// pair (`spec.md` §4.5), built on the same `AtomicCounter` capability
/// surface (`get`/`set`/`record`/`clear`/`length`) as `Counts<C>` is built
/// on `Counter` — the atomic realization of `spec.md` §4.2's "one
/// operation surface, four realizations." Recording is a single
/// `fetch_add`; the total is tracked separately so readers don't need to
/// sum the whole array.
#[derive(Debug)]
pub struct AtomicCounts {
    cells: Vec<AtomicU64>,
    total_count: AtomicI64,
}

impl AtomicCounts {
    pub fn new(length: usize) -> Self {
        AtomicCounts {
            cells: (0..length).map(|_| AtomicCounter::new_atomic(0)).collect(),
            total_count: AtomicI64::new(0),
        }
    }

    #[inline]
    pub fn length(&self) -> usize {
        self.cells.len()
    }

    #[inline]
    pub fn get(&self, index: usize, order: Ordering) -> i64 {
        AtomicCounter::load(&self.cells[index], order)
    }

    #[inline]
    pub fn set(&self, index: usize, value: i64, order: Ordering) {
        AtomicCounter::store(&self.cells[index], value, order);
    }

    /// Wait-free recording path: a single atomic add, no locks. Used by
    /// writers between `writer_enter`/`writer_exit`.
    #[inline]
    pub fn record(&self, index: usize, delta: i64, order: Ordering) {
        AtomicCounter::fetch_add(&self.cells[index], delta, order);
        self.total_count.fetch_add(delta, order);
    }

    #[inline]
    pub fn total_count(&self, order: Ordering) -> i64 {
        self.total_count.load(order)
    }

    pub fn add_total(&self, delta: i64, order: Ordering) {
        self.total_count.fetch_add(delta, order);
    }

    /// Clears every cell. Only safe to call on an array no writer holds a
    /// reference into (the inactive array, post-flip).
    pub fn clear(&self, order: Ordering) {
        for cell in self.cells.iter() {
            AtomicCounter::store(cell, 0, order);
        }
        self.total_count.store(0, order);
    }

    pub fn iter(&self, order: Ordering) -> impl Iterator<Item = i64> + '_ {
        self.cells.iter().map(move |c| AtomicCounter::load(c, order))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_add_and_total() {
        let mut c: Counts<i64> = Counts::new(4);
        c.add(1, 3).unwrap();
        c.add(2, 5).unwrap();
        assert_eq!(c.get(1), 3);
        assert_eq!(c.total_count(), 8);
    }

    #[test]
    fn counts_subtract_underflow() {
        let mut c: Counts<i64> = Counts::new(4);
        c.add(0, 2).unwrap();
        assert!(c.subtract(0, 3).is_err());
    }

    #[test]
    fn counts_clear_resets_total() {
        let mut c: Counts<i32> = Counts::new(4);
        c.add(0, 2).unwrap();
        c.clear();
        assert_eq!(c.total_count(), 0);
        assert_eq!(c.get(0), 0);
    }

    #[test]
    fn atomic_counts_record_accumulates() {
        let a = AtomicCounts::new(4);
        a.record(0, 1, Ordering::Relaxed);
        a.record(0, 2, Ordering::Relaxed);
        assert_eq!(a.get(0, Ordering::Relaxed), 3);
        assert_eq!(a.total_count(Ordering::Relaxed), 3);
    }
}
