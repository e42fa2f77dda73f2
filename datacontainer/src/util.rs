// Licensed to the Apache Software Foundation (ASF) under one
// or more contributor license agreements.  See the NOTICE file
// distributed with this work for additional information
// regarding copyright ownership.  The ASF licenses this file
// to you under the Apache License, Version 2.0 (the
// "License"); you may not use this file except in compliance
// with the License.  You may obtain a copy of the License at
//
//   http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing,
// software distributed under the License is distributed on an
// "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied.  See the License for the
// specific language governing permissions and limitations
// under the License.

//! Low level encoding helpers shared by the container file reader and writer.

use crate::{DcResult, error::Details};
use std::{
    io::{Read, Write},
    sync::{
        Once,
        atomic::{AtomicUsize, Ordering},
    },
};

/// Maximum number of bytes that can be allocated when decoding a container
/// file. This is a protection against ill-formed data, whose length field
/// might be interpreted as enormous.
/// See [`max_allocation_bytes`] to change this limit.
pub const DEFAULT_MAX_ALLOCATION_BYTES: usize = 512 * 1024 * 1024;
static MAX_ALLOCATION_BYTES: AtomicUsize = AtomicUsize::new(DEFAULT_MAX_ALLOCATION_BYTES);
static MAX_ALLOCATION_BYTES_ONCE: Once = Once::new();

/// Set a new maximum number of bytes that can be allocated when decoding data.
/// Once called, the limit cannot be changed.
///
/// **NOTE** This function must be called before decoding **any** data. The
/// limit is set either when calling this method, or when decoding for the first
/// time.
pub fn max_allocation_bytes(num_bytes: usize) -> usize {
    MAX_ALLOCATION_BYTES_ONCE.call_once(|| {
        MAX_ALLOCATION_BYTES.store(num_bytes, Ordering::Release);
    });
    MAX_ALLOCATION_BYTES.load(Ordering::Acquire)
}

pub fn safe_len(len: usize) -> DcResult<usize> {
    let max_bytes = max_allocation_bytes(DEFAULT_MAX_ALLOCATION_BYTES);

    if len <= max_bytes {
        Ok(len)
    } else {
        Err(Details::MemoryAllocation {
            desired: len,
            maximum: max_bytes,
        }
        .into())
    }
}

pub(crate) fn zig_i64<W: Write>(n: i64, writer: W) -> DcResult<usize> {
    encode_variable(((n << 1) ^ (n >> 63)) as u64, writer)
}

pub(crate) fn zag_i64<R: Read>(reader: &mut R) -> DcResult<i64> {
    let z = decode_variable(reader)?;
    Ok(if z & 0x1 == 0 {
        (z >> 1) as i64
    } else {
        !(z >> 1) as i64
    })
}

fn encode_variable<W: Write>(mut z: u64, mut writer: W) -> DcResult<usize> {
    let mut buffer = [0u8; 10];
    let mut i: usize = 0;
    loop {
        if z <= 0x7F {
            buffer[i] = (z & 0x7F) as u8;
            i += 1;
            break;
        } else {
            buffer[i] = (0x80 | (z & 0x7F)) as u8;
            i += 1;
            z >>= 7;
        }
    }
    writer
        .write_all(&buffer[..i])
        .map_err(Details::WriteBytes)?;
    Ok(i)
}

fn decode_variable<R: Read>(reader: &mut R) -> DcResult<u64> {
    let mut i = 0u64;
    let mut buf = [0u8; 1];

    let mut j = 0;
    loop {
        if j > 9 {
            // if j * 7 > 64
            return Err(Details::IntegerOverflow.into());
        }
        read_exact(reader, &mut buf[..])?;
        i |= (u64::from(buf[0] & 0x7F)) << (j * 7);
        if (buf[0] >> 7) == 0 {
            break;
        } else {
            j += 1;
        }
    }

    Ok(i)
}

/// Read exactly `buf.len()` bytes, reporting a short read as a truncated file.
pub(crate) fn read_exact<R: Read>(reader: &mut R, buf: &mut [u8]) -> DcResult<()> {
    reader.read_exact(buf).map_err(|e| {
        if e.kind() == std::io::ErrorKind::UnexpectedEof {
            Details::Truncated(e).into()
        } else {
            Details::ReadBytes(e).into()
        }
    })
}

pub(crate) fn write_all<W: Write>(writer: &mut W, bytes: &[u8]) -> DcResult<usize> {
    writer.write_all(bytes).map_err(Details::WriteBytes)?;
    Ok(bytes.len())
}

pub(crate) fn write_long<W: Write>(n: i64, writer: &mut W) -> DcResult<usize> {
    zig_i64(n, writer)
}

pub(crate) fn read_long<R: Read>(reader: &mut R) -> DcResult<i64> {
    zag_i64(reader)
}

/// Read a non-negative length, rejecting anything above the allocation limit.
pub(crate) fn read_len<R: Read>(reader: &mut R) -> DcResult<usize> {
    let len = read_long(reader)?;
    let len = usize::try_from(len).map_err(|_| Details::InvalidLength(len))?;
    safe_len(len)
}

pub(crate) fn write_bytes<W: Write>(bytes: &[u8], writer: &mut W) -> DcResult<usize> {
    Ok(write_long(bytes.len() as i64, writer)? + write_all(writer, bytes)?)
}

pub(crate) fn read_bytes<R: Read>(reader: &mut R) -> DcResult<Vec<u8>> {
    let len = read_len(reader)?;
    let mut buf = vec![0u8; len];
    read_exact(reader, &mut buf)?;
    Ok(buf)
}

pub(crate) fn write_string<W: Write>(s: &str, writer: &mut W) -> DcResult<usize> {
    write_bytes(s.as_bytes(), writer)
}

pub(crate) fn read_string<R: Read>(reader: &mut R) -> DcResult<String> {
    String::from_utf8(read_bytes(reader)?).map_err(|e| Details::ConvertToUtf8(e).into())
}

pub(crate) fn read_u8<R: Read>(reader: &mut R) -> DcResult<u8> {
    let mut buf = [0u8; 1];
    read_exact(reader, &mut buf)?;
    Ok(buf[0])
}
