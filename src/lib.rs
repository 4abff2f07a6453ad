// Copyright 2020 Twitter, Inc.
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

//! Fixed-memory HDR-style histograms: bounded relative-error recording of
//! non-negative integer samples, accurate quantile queries, and a lock-free
//! concurrent variant with consistent snapshotting.
//!
//! - [`Histogram`] is the single-writer core. Pick a counter width ([`i16`],
//!   [`i32`], [`i64`]) for the trade-off between memory and maximum count per
//!   bucket.
//! - [`ConcurrentHistogram`] accepts recordings from unbounded concurrent
//!   writers without any writer ever blocking.
//! - [`Recorder`] wraps a [`ConcurrentHistogram`] and hands out non-
//!   overlapping interval snapshots on whatever cadence a consumer likes.
//! - [`codec`] and [`logstream`] round-trip histograms across processes.

mod bits;
pub mod codec;
mod concurrent;
mod counter;
mod error;
mod geometry;
mod histogram;
mod iteration;
pub mod logstream;
mod phaser;
mod recorder;
mod storage;

pub use concurrent::ConcurrentHistogram;
pub use counter::Counter;
pub use error::Error;
pub use geometry::Geometry;
pub use histogram::{Histogram, HistogramBuilder};
pub use iteration::{HistogramIterator, IterationStrategy, IterationValue};
pub use phaser::WriterReaderPhaser;
pub use recorder::Recorder;
