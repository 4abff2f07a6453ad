// Copyright 2020 Twitter, Inc.
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

use thiserror::Error;

/// Possible errors returned by operations on a histogram.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// The recorded value is negative or exceeds the histogram's configured
    /// `highest_trackable_value`.
    #[error("value out of range")]
    ValueOutOfRange,
    /// A fixed-width counter would have exceeded its positive range.
    #[error("counter overflow")]
    CounterOverflow,
    /// `Add`/`Subtract` was given a source histogram whose trackable range
    /// exceeds this histogram's.
    #[error("source histogram range exceeds destination range")]
    GeometryMismatch,
    /// `Subtract` would have produced a negative counter.
    #[error("subtraction would underflow a counter")]
    Underflow,
    /// The binary or log-stream payload is malformed: bad cookie, truncated
    /// data, or a varint stream inconsistent with the declared geometry.
    #[error("corrupt encoded histogram: {0}")]
    CodecCorrupt(&'static str),
    /// A construction parameter violated the bounds documented for it.
    #[error("invalid construction argument: {0}")]
    ArgumentInvalid(&'static str),
    /// The histogram contains no recorded samples.
    #[error("histogram contains no samples")]
    Empty,
    /// The requested percentile was outside `[0.0, 100.0]`.
    #[error("invalid percentile")]
    InvalidPercentile,
}
