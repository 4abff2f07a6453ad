// Copyright 2020 Twitter, Inc.
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

//! The V2 binary wire format: a fixed big-endian header followed by a
//! zig-zag LEB128 counts stream with run-length-coalesced zero gaps
//! (`spec.md` §4.7/§6), plus a `deflate`-compressed wrapper around it.

mod v2;

pub use v2::{compress, decode, decompress, encode, encode_into, V2_COMPRESSED_COOKIE, V2_COOKIE};
