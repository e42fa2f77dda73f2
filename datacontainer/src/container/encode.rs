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

//! Binary encoding of container files.
//!
//! Integers and lengths are zig-zag varints, floats little-endian IEEE-754 and strings
//! length-prefixed UTF-8. Every payload is compressed with the file codec and followed by the
//! big-endian CRC32 of its uncompressed bytes, then by the file sync marker.

use super::ContainerFile;
use crate::{
    Codec, DcResult,
    block::{ColumnData, Header, Payload},
    error::Details,
    types::{Array, HeaderValue},
    util::{write_all, write_bytes, write_long, write_string},
};
use std::io::Write;

pub(crate) const MAGIC: &[u8; 4] = b"DCF\x01";

pub(crate) const HEADER_BOOLEAN: u8 = 0;
pub(crate) const HEADER_INT: u8 = 1;
pub(crate) const HEADER_FLOAT: u8 = 2;
pub(crate) const HEADER_STRING: u8 = 3;
pub(crate) const HEADER_LIST: u8 = 4;

/// Deepest nesting of header lists that is written or read.
pub(crate) const MAX_HEADER_DEPTH: usize = 8;

pub(crate) const PAYLOAD_NONE: u8 = 0;
pub(crate) const PAYLOAD_IMAGE: u8 = 1;
pub(crate) const PAYLOAD_TABLE: u8 = 2;

pub(crate) const COLUMN_ARRAY: u8 = 0;
pub(crate) const COLUMN_RECORD_REF: u8 = 1;

/// Encode a whole container file, returning the number of bytes written.
pub(crate) fn encode_container<W: Write>(
    file: &ContainerFile,
    codec: Codec,
    marker: &[u8; 16],
    writer: &mut W,
) -> DcResult<usize> {
    let mut n = write_all(writer, MAGIC)?;
    let codec_name: &'static str = codec.into();
    n += write_string(codec_name, writer)?;
    n += write_all(writer, marker)?;
    n += encode_header(file.primary(), writer)?;
    n += write_long(file.blocks().len() as i64, writer)?;

    for block in file.blocks() {
        n += write_string(&block.name, writer)?;
        n += encode_header(&block.header, writer)?;
        match &block.payload {
            None => n += write_all(writer, &[PAYLOAD_NONE])?,
            Some(payload) => {
                let (tag, mut bytes) = match payload {
                    Payload::Image(array) => {
                        let mut bytes = Vec::with_capacity(array.as_bytes().len() + 16);
                        encode_array(array, &mut bytes)?;
                        (PAYLOAD_IMAGE, bytes)
                    }
                    Payload::Table(columns) => {
                        let mut bytes = Vec::new();
                        write_long(columns.len() as i64, &mut bytes)?;
                        for column in columns {
                            write_string(&column.name, &mut bytes)?;
                            match &column.data {
                                ColumnData::Array(array) => {
                                    write_all(&mut bytes, &[COLUMN_ARRAY])?;
                                    encode_array(array, &mut bytes)?;
                                }
                                ColumnData::RecordRef(name) => {
                                    write_all(&mut bytes, &[COLUMN_RECORD_REF])?;
                                    write_string(name, &mut bytes)?;
                                }
                            }
                        }
                        (PAYLOAD_TABLE, bytes)
                    }
                };
                let checksum = crc32fast::hash(&bytes);
                codec.compress(&mut bytes)?;
                n += write_all(writer, &[tag])?;
                n += write_bytes(&bytes, writer)?;
                n += write_all(writer, &checksum.to_be_bytes())?;
            }
        }
        n += write_all(writer, marker)?;
    }
    Ok(n)
}

pub(crate) fn encode_header<W: Write>(header: &Header, writer: &mut W) -> DcResult<usize> {
    let mut n = write_long(header.len() as i64, writer)?;
    for (key, value) in header.iter() {
        n += write_string(key, writer)?;
        n += encode_header_value(value, writer, 0)?;
    }
    Ok(n)
}

fn encode_header_value<W: Write>(
    value: &HeaderValue,
    writer: &mut W,
    depth: usize,
) -> DcResult<usize> {
    match value {
        HeaderValue::Boolean(b) => write_all(writer, &[HEADER_BOOLEAN, u8::from(*b)]),
        HeaderValue::Int(i) => Ok(write_all(writer, &[HEADER_INT])? + write_long(*i, writer)?),
        HeaderValue::Float(x) => {
            Ok(write_all(writer, &[HEADER_FLOAT])? + write_all(writer, &x.to_le_bytes())?)
        }
        HeaderValue::String(s) => Ok(write_all(writer, &[HEADER_STRING])? + write_string(s, writer)?),
        HeaderValue::List(items) => {
            if depth >= MAX_HEADER_DEPTH {
                return Err(Details::HeaderNesting(MAX_HEADER_DEPTH).into());
            }
            let mut n = write_all(writer, &[HEADER_LIST])?;
            n += write_long(items.len() as i64, writer)?;
            for item in items {
                n += encode_header_value(item, writer, depth + 1)?;
            }
            Ok(n)
        }
    }
}

fn encode_array<W: Write>(array: &Array, writer: &mut W) -> DcResult<usize> {
    let dtype: &'static str = array.dtype().into();
    let mut n = write_string(dtype, writer)?;
    n += write_long(array.shape().len() as i64, writer)?;
    for &dim in array.shape() {
        n += write_long(dim as i64, writer)?;
    }
    n += write_bytes(array.as_bytes(), writer)?;
    Ok(n)
}
