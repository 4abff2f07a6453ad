// Copyright 2020 Twitter, Inc.
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

use crate::bits::{varint_read, varint_write, zigzag_decode, zigzag_encode};
use crate::counter::Counter;
use crate::error::Error;
use crate::histogram::Histogram;
use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use flate2::read::DeflateDecoder;
use flate2::write::DeflateEncoder;
use flate2::Compression;
use std::io::{Read, Write};

/// Cookie for an uncompressed V2 payload.
pub const V2_COOKIE: u32 = 0x1c84_9303;
/// Cookie for a `deflate`-wrapped V2 payload.
pub const V2_COMPRESSED_COOKIE: u32 = 0x1c84_9304;

const HEADER_LEN: usize = 4 + 4 + 4 + 4 + 8 + 8 + 8;

/// Serializes `histogram` into the uncompressed V2 wire format.
pub fn encode<C: Counter>(histogram: &Histogram<C>) -> Vec<u8> {
    let mut out = Vec::new();
    encode_into(histogram, &mut out);
    out
}

/// Like `encode`, but appends to an existing buffer instead of allocating.
pub fn encode_into<C: Counter>(histogram: &Histogram<C>, out: &mut Vec<u8>) {
    let geometry = histogram.geometry();
    let counts_buf = encode_counts(histogram);

    out.write_u32::<BigEndian>(V2_COOKIE)
        .expect("writing to Vec<u8> cannot fail");
    out.write_u32::<BigEndian>(counts_buf.len() as u32)
        .expect("writing to Vec<u8> cannot fail");
    out.write_u32::<BigEndian>(0) // normalizing offset; always 0 for a plain Histogram
        .expect("writing to Vec<u8> cannot fail");
    out.write_u32::<BigEndian>(geometry.significant_digits() as u32)
        .expect("writing to Vec<u8> cannot fail");
    out.write_u64::<BigEndian>(geometry.lowest_trackable_value())
        .expect("writing to Vec<u8> cannot fail");
    out.write_u64::<BigEndian>(geometry.highest_trackable_value())
        .expect("writing to Vec<u8> cannot fail");
    out.write_f64::<BigEndian>(1.0) // integer-to-double conversion ratio
        .expect("writing to Vec<u8> cannot fail");
    out.extend_from_slice(&counts_buf);
}

fn encode_counts<C: Counter>(histogram: &Histogram<C>) -> Vec<u8> {
    let len = histogram.geometry().counts_array_length();
    let mut buf = Vec::with_capacity(len);
    let mut scratch = [0_u8; 9];
    let mut index = 0_usize;
    while index < len {
        let count = histogram.count_at_index(index);
        if count == 0 {
            let mut zero_run = 1_i64;
            index += 1;
            while index < len && histogram.count_at_index(index) == 0 {
                zero_run += 1;
                index += 1;
            }
            let n = varint_write(zigzag_encode(-zero_run), &mut scratch);
            buf.extend_from_slice(&scratch[..n]);
        } else {
            let n = varint_write(zigzag_encode(count), &mut scratch);
            buf.extend_from_slice(&scratch[..n]);
            index += 1;
        }
    }
    buf
}

/// Parses a V2 payload produced by `encode`, reconstructing a fresh
/// `i64`-backed histogram (the wire format does not preserve the original
/// counter width).
pub fn decode(buf: &[u8]) -> Result<Histogram<i64>, Error> {
    if buf.len() < HEADER_LEN {
        return Err(Error::CodecCorrupt("truncated header"));
    }
    let mut cursor = buf;
    let cookie = read_u32(&mut cursor)?;
    if cookie != V2_COOKIE {
        log::warn!("rejecting V2 payload: cookie {cookie:#010x} != {V2_COOKIE:#010x}");
        return Err(Error::CodecCorrupt("unrecognized cookie"));
    }
    let payload_length = read_u32(&mut cursor)? as usize;
    let normalizing_offset = read_u32(&mut cursor)? as usize;
    let significant_digits = read_u32(&mut cursor)? as u8;
    let lowest = read_u64(&mut cursor)?;
    let highest = read_u64(&mut cursor)?;
    let _ratio = cursor
        .read_f64::<BigEndian>()
        .map_err(|_| Error::CodecCorrupt("truncated header"))?;

    if cursor.len() < payload_length {
        return Err(Error::CodecCorrupt("truncated counts payload"));
    }

    let mut histogram: Histogram<i64> = Histogram::new(lowest, highest, significant_digits)?;
    decode_counts(&cursor[..payload_length], &mut histogram, normalizing_offset)?;
    Ok(histogram)
}

fn decode_counts(
    payload: &[u8],
    dest: &mut Histogram<i64>,
    normalizing_offset: usize,
) -> Result<(), Error> {
    let len = dest.geometry().counts_array_length();
    let mut cursor = payload;
    let mut index = 0_usize;
    while index < len {
        let (zz, consumed) =
            varint_read(cursor).ok_or(Error::CodecCorrupt("truncated counts stream"))?;
        cursor = &cursor[consumed..];
        let n = zigzag_decode(zz);
        if n < 0 {
            index += (-n) as usize;
        } else if n > 0 {
            let base_index = if normalizing_offset == 0 {
                index
            } else {
                (index + normalizing_offset) % len
            };
            let value = dest.geometry().value_from_index(base_index);
            dest.record_value_with_count(value, n as u64)?;
            index += 1;
        } else {
            index += 1;
        }
    }
    Ok(())
}

fn read_u32(cursor: &mut &[u8]) -> Result<u32, Error> {
    cursor
        .read_u32::<BigEndian>()
        .map_err(|_| Error::CodecCorrupt("truncated header"))
}

fn read_u64(cursor: &mut &[u8]) -> Result<u64, Error> {
    cursor
        .read_u64::<BigEndian>()
        .map_err(|_| Error::CodecCorrupt("truncated header"))
}

/// Encodes `histogram` as V2, then wraps the result in `deflate`, prefixed
/// with the compressed cookie and the compressed length.
pub fn compress<C: Counter>(histogram: &Histogram<C>) -> Vec<u8> {
    let raw = encode(histogram);
    let mut encoder = DeflateEncoder::new(Vec::new(), Compression::default());
    encoder
        .write_all(&raw)
        .expect("writing to Vec<u8> cannot fail");
    let deflated = encoder.finish().expect("in-memory deflate cannot fail");

    let mut out = Vec::with_capacity(8 + deflated.len());
    out.write_u32::<BigEndian>(V2_COMPRESSED_COOKIE)
        .expect("writing to Vec<u8> cannot fail");
    out.write_u32::<BigEndian>(deflated.len() as u32)
        .expect("writing to Vec<u8> cannot fail");
    out.extend_from_slice(&deflated);
    out
}

/// Inverse of `compress`.
pub fn decompress(buf: &[u8]) -> Result<Histogram<i64>, Error> {
    if buf.len() < 8 {
        return Err(Error::CodecCorrupt("truncated compressed header"));
    }
    let mut cursor = buf;
    let cookie = read_u32(&mut cursor)?;
    if cookie != V2_COMPRESSED_COOKIE {
        log::warn!(
            "rejecting compressed V2 payload: cookie {cookie:#010x} != {V2_COMPRESSED_COOKIE:#010x}"
        );
        return Err(Error::CodecCorrupt("unrecognized compressed cookie"));
    }
    let compressed_length = read_u32(&mut cursor)? as usize;
    if cursor.len() < compressed_length {
        return Err(Error::CodecCorrupt("truncated compressed payload"));
    }

    let mut decoder = DeflateDecoder::new(&cursor[..compressed_length]);
    let mut raw = Vec::new();
    decoder
        .read_to_end(&mut raw)
        .map_err(|_| Error::CodecCorrupt("malformed deflate stream"))?;
    decode(&raw)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_sparse_histogram() {
        let mut h: Histogram<i64> = Histogram::new(1, 3_600_000_000, 3).unwrap();
        for v in [1_u64, 100, 10_000, 1_000_000, 3_600_000_000] {
            h.record_value(v).unwrap();
        }
        let bytes = encode(&h);
        let decoded = decode(&bytes).unwrap();
        assert_eq!(decoded.total_count(), h.total_count());
        for v in [1_u64, 100, 10_000, 1_000_000, 3_600_000_000] {
            assert_eq!(
                decoded.count_at_value(v).unwrap(),
                h.count_at_value(v).unwrap()
            );
        }
    }

    #[test]
    fn decode_rejects_bad_cookie() {
        let bytes = vec![0_u8; HEADER_LEN];
        assert!(matches!(decode(&bytes), Err(Error::CodecCorrupt(_))));
    }

    #[test]
    fn decode_rejects_truncated_header() {
        assert!(matches!(decode(&[0_u8; 3]), Err(Error::CodecCorrupt(_))));
    }

    #[test]
    fn compressed_round_trip() {
        let mut h: Histogram<i32> = Histogram::new(1, 100_000, 3).unwrap();
        for v in 1..=200_u64 {
            h.record_value(v).unwrap();
        }
        let bytes = compress(&h);
        let decoded = decompress(&bytes).unwrap();
        assert_eq!(decoded.total_count(), h.total_count());
    }

    #[test]
    fn compressed_is_smaller_for_sparse_data() {
        let mut h: Histogram<i64> = Histogram::new(1, u32::MAX as u64, 3).unwrap();
        h.record_value(1).unwrap();
        let raw = encode(&h);
        let compressed = compress(&h);
        assert!(compressed.len() < raw.len());
    }
}
