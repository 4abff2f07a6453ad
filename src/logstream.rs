// Copyright 2020 Twitter, Inc.
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

//! The text log-stream format: one line per recorded interval, carrying a
//! base64-encoded compressed V2 payload (`spec.md` §4.8). A clock is
//! explicitly out of scope for this crate (`spec.md` §1); callers supply
//! both the numeric epoch and any human-readable timestamp text themselves.

use crate::codec;
use crate::counter::Counter;
use crate::error::Error;
use crate::histogram::Histogram;
use std::io::{self, BufRead, Write};

const COLUMN_HEADER: &str =
    "\"StartTimestamp\",\"Interval_Length\",\"Interval_Max\",\"Interval_Compressed_Histogram\"";

/// Appends interval histograms to a log stream, per `spec.md` §4.8.
pub struct LogWriter<W: Write> {
    sink: W,
}

impl<W: Write> LogWriter<W> {
    /// Writes the mandatory `#[StartTime: ...]` header comment and the
    /// column header line. `start_time_epoch_seconds` and `start_time_iso8601`
    /// are caller-supplied since this crate does not call a clock itself.
    pub fn begin(
        mut sink: W,
        start_time_epoch_seconds: f64,
        start_time_iso8601: &str,
    ) -> io::Result<Self> {
        writeln!(
            sink,
            "#[StartTime: {:.3} (seconds since epoch), {}]",
            start_time_epoch_seconds, start_time_iso8601
        )?;
        writeln!(sink, "{}", COLUMN_HEADER)?;
        Ok(LogWriter { sink })
    }

    /// Writes an additional free-form `#`-prefixed comment line, e.g. a
    /// `#[BaseTime: ...]` header. Must be called before the first
    /// `write_interval_histogram` to stay ahead of the column header in a
    /// freshly-opened stream; tolerated anywhere by readers regardless.
    pub fn write_comment(&mut self, comment: &str) -> io::Result<()> {
        writeln!(self.sink, "#{}", comment)
    }

    /// Appends one interval record: `start`/`length` are caller-tracked
    /// interval bounds in the same units as `start_time_epoch_seconds`;
    /// `histogram` is compressed and base64-encoded into the record.
    pub fn write_interval_histogram<C: Counter>(
        &mut self,
        start: f64,
        length: f64,
        histogram: &Histogram<C>,
    ) -> io::Result<()> {
        let compressed = codec::compress(histogram);
        let encoded = base64::encode(&compressed);
        let max = histogram.max();
        match histogram.tag() {
            Some(tag) => writeln!(self.sink, "Tag={},{:.3},{:.3},{},{}", tag, start, length, max, encoded),
            None => writeln!(self.sink, "{:.3},{:.3},{},{}", start, length, max, encoded),
        }
    }

    /// Flushes the underlying sink.
    pub fn flush(&mut self) -> io::Result<()> {
        self.sink.flush()
    }

    pub fn into_inner(self) -> W {
        self.sink
    }
}

/// One decoded record from a log stream.
pub struct LogRecord {
    pub tag: Option<String>,
    pub start_timestamp: f64,
    pub interval_length: f64,
    pub interval_max: f64,
    pub histogram: Histogram<i64>,
}

/// A lazy, restartable reader over a log stream's records, in file order.
/// Header comments are tolerated in any order before the column line;
/// unrecognized `#`-prefixed lines are ignored.
pub struct LogReader<R: BufRead> {
    lines: io::Lines<R>,
    seen_column_header: bool,
}

impl<R: BufRead> LogReader<R> {
    pub fn new(source: R) -> Self {
        LogReader {
            lines: source.lines(),
            seen_column_header: false,
        }
    }

    fn parse_record(line: &str) -> Result<LogRecord, Error> {
        let (tag, rest) = if let Some(stripped) = line.strip_prefix("Tag=") {
            let (tag, rest) = stripped
                .split_once(',')
                .ok_or(Error::CodecCorrupt("log record missing fields after tag"))?;
            (Some(tag.to_string()), rest)
        } else {
            (None, line)
        };

        let mut fields = rest.splitn(4, ',');
        let start_timestamp: f64 = fields
            .next()
            .ok_or(Error::CodecCorrupt("log record missing start timestamp"))?
            .parse()
            .map_err(|_| Error::CodecCorrupt("log record start timestamp not numeric"))?;
        let interval_length: f64 = fields
            .next()
            .ok_or(Error::CodecCorrupt("log record missing interval length"))?
            .parse()
            .map_err(|_| Error::CodecCorrupt("log record interval length not numeric"))?;
        let interval_max: f64 = fields
            .next()
            .ok_or(Error::CodecCorrupt("log record missing interval max"))?
            .parse()
            .map_err(|_| Error::CodecCorrupt("log record interval max not numeric"))?;
        let payload_b64 = fields
            .next()
            .ok_or(Error::CodecCorrupt("log record missing payload"))?;

        let compressed = base64::decode(payload_b64.trim())
            .map_err(|_| Error::CodecCorrupt("log record payload not valid base64"))?;
        let mut histogram = codec::decompress(&compressed)?;
        if let Some(tag) = &tag {
            histogram.set_tag(tag.clone());
        }

        Ok(LogRecord {
            tag,
            start_timestamp,
            interval_length,
            interval_max,
            histogram,
        })
    }
}

impl<R: BufRead> Iterator for LogReader<R> {
    type Item = Result<LogRecord, Error>;

    fn next(&mut self) -> Option<Result<LogRecord, Error>> {
        loop {
            let line = match self.lines.next()? {
                Ok(line) => line,
                Err(e) => return Some(Err(Error::CodecCorrupt(leak_io_error_context(e)))),
            };
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }
            if !self.seen_column_header && trimmed == COLUMN_HEADER {
                self.seen_column_header = true;
                continue;
            }
            return Some(Self::parse_record(trimmed));
        }
    }
}

/// `Error::CodecCorrupt` carries a `&'static str`; I/O errors on the
/// underlying reader are rare enough on an in-memory/file log stream that we
/// collapse them to a fixed message rather than widen the error type.
fn leak_io_error_context(_e: io::Error) -> &'static str {
    "log stream read error"
}
