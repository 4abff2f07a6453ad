// Copyright 2020 Twitter, Inc.
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

//! A writer-reader phaser: lets unbounded concurrent writers record without
//! ever blocking, while a single reader can still observe a consistent
//! snapshot by swapping phases and waiting only for writers already
//! in-flight at the moment of the swap (`spec.md` §4.4).

use parking_lot::{Mutex, MutexGuard};
use std::sync::atomic::{AtomicI64, Ordering};

/// The phase bit is carried in the sign of `start_epoch`: non-negative
/// values are the even phase, and the odd phase counts up from `i64::MIN`.
/// This lets one atomic double as both an entry counter and a phase flag.
pub struct WriterReaderPhaser {
    start_epoch: AtomicI64,
    even_end_epoch: AtomicI64,
    odd_end_epoch: AtomicI64,
    reader_lock: Mutex<()>,
}

impl Default for WriterReaderPhaser {
    fn default() -> Self {
        Self::new()
    }
}

impl WriterReaderPhaser {
    pub fn new() -> Self {
        WriterReaderPhaser {
            start_epoch: AtomicI64::new(0),
            even_end_epoch: AtomicI64::new(0),
            odd_end_epoch: AtomicI64::new(i64::MIN),
            reader_lock: Mutex::new(()),
        }
    }

    /// Wait-free. Returns a token that `writer_exit` must be called with.
    #[inline]
    pub fn writer_enter(&self) -> i64 {
        self.start_epoch.fetch_add(1, Ordering::SeqCst)
    }

    #[inline]
    pub fn writer_exit(&self, entered_value: i64) {
        if entered_value < 0 {
            self.odd_end_epoch.fetch_add(1, Ordering::SeqCst);
        } else {
            self.even_end_epoch.fetch_add(1, Ordering::SeqCst);
        }
    }

    /// Excludes other readers. `flip_phase` requires the returned guard.
    pub fn reader_lock(&self) -> MutexGuard<'_, ()> {
        self.reader_lock.lock()
    }

    /// `true` if the phase currently accepting writers is the odd phase.
    /// Lets a reader determine which of a pair of buffers is presently
    /// active without performing a flip.
    pub fn is_odd_phase(&self) -> bool {
        self.start_epoch.load(Ordering::SeqCst) < 0
    }

    /// Swaps the active phase and spin-waits until every writer that
    /// entered the outgoing phase has exited it. The caller must hold the
    /// guard returned by `reader_lock` for the duration of the call.
    /// Returns `true` if the phase that is now active (post-flip) is even
    /// — equivalently, the phase just vacated was odd.
    pub fn flip_phase(&self, _reader_guard: &MutexGuard<'_, ()>) -> bool {
        let next_phase_is_even = self.start_epoch.load(Ordering::SeqCst) < 0;

        // Seed the incoming phase's end-epoch counter before any writer can
        // possibly enter it, so the next flip's drain check has a clean
        // baseline to compare against.
        if next_phase_is_even {
            self.even_end_epoch.store(0, Ordering::SeqCst);
        } else {
            self.odd_end_epoch.store(i64::MIN, Ordering::SeqCst);
        }

        let initial_start_value = if next_phase_is_even { 0 } else { i64::MIN };
        let previous_start_value = self.start_epoch.swap(initial_start_value, Ordering::SeqCst);

        let mut spins: u64 = 0;
        loop {
            let outgoing_end_epoch = if next_phase_is_even {
                self.odd_end_epoch.load(Ordering::SeqCst)
            } else {
                self.even_end_epoch.load(Ordering::SeqCst)
            };
            if outgoing_end_epoch == previous_start_value {
                break;
            }
            spins += 1;
            if spins % 100_000 == 0 {
                log::debug!("flip_phase still draining writers after {} spins", spins);
            }
            std::thread::yield_now();
        }

        next_phase_is_even
    }

    pub fn reader_unlock(&self, guard: MutexGuard<'_, ()>) {
        drop(guard);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn single_writer_enter_exit_then_flip_does_not_hang() {
        let phaser = WriterReaderPhaser::new();
        let token = phaser.writer_enter();
        phaser.writer_exit(token);
        let guard = phaser.reader_lock();
        phaser.flip_phase(&guard);
        phaser.flip_phase(&guard);
        drop(guard);
    }

    #[test]
    fn flip_phase_waits_for_in_flight_writer() {
        let phaser = Arc::new(WriterReaderPhaser::new());
        let token = phaser.writer_enter();

        let phaser2 = Arc::clone(&phaser);
        let handle = thread::spawn(move || {
            thread::sleep(std::time::Duration::from_millis(20));
            phaser2.writer_exit(token);
        });

        let guard = phaser.reader_lock();
        phaser.flip_phase(&guard);
        drop(guard);
        handle.join().unwrap();
    }

    #[test]
    fn many_writers_drain_correctly_across_repeated_flips() {
        let phaser = Arc::new(WriterReaderPhaser::new());
        for _ in 0..5 {
            let mut handles = Vec::new();
            for _ in 0..8 {
                let p = Arc::clone(&phaser);
                handles.push(thread::spawn(move || {
                    let token = p.writer_enter();
                    p.writer_exit(token);
                }));
            }
            for h in handles {
                h.join().unwrap();
            }
            let guard = phaser.reader_lock();
            phaser.flip_phase(&guard);
            drop(guard);
        }
    }
}
