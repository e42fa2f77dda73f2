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

//! Binary decoding of container files, the inverse of [`encode`](super::encode).

use super::{
    ContainerFile,
    encode::{
        COLUMN_ARRAY, COLUMN_RECORD_REF, HEADER_BOOLEAN, HEADER_FLOAT, HEADER_INT, HEADER_LIST,
        HEADER_STRING, MAGIC, MAX_HEADER_DEPTH, PAYLOAD_IMAGE, PAYLOAD_NONE, PAYLOAD_TABLE,
    },
};
use crate::{
    Codec, DcResult,
    block::{Block, Column, ColumnData, Header, Payload},
    error::Details,
    types::{Array, DType, HeaderValue},
    util::{read_bytes, read_exact, read_len, read_long, read_string, read_u8},
};
use log::debug;
use std::{io::Read, str::FromStr};

pub(crate) fn decode_container<R: Read>(reader: &mut R) -> DcResult<ContainerFile> {
    let mut magic = [0u8; 4];
    read_exact(reader, &mut magic)?;
    if &magic != MAGIC {
        return Err(Details::HeaderMagic.into());
    }

    let codec_name = read_string(reader)?;
    let codec =
        Codec::from_str(&codec_name).map_err(|_| Details::CodecNotSupported(codec_name.clone()))?;

    let mut marker = [0u8; 16];
    read_exact(reader, &mut marker)?;

    let primary = decode_header(reader)?;
    let count = read_len(reader)?;
    debug!("Decoding {count} blocks compressed with {codec_name}");

    let mut blocks = Vec::with_capacity(count.min(1024));
    for _ in 0..count {
        let name = read_string(reader)?;
        let header = decode_header(reader)?;
        let payload = match read_u8(reader)? {
            PAYLOAD_NONE => None,
            tag @ (PAYLOAD_IMAGE | PAYLOAD_TABLE) => {
                let mut bytes = read_bytes(reader)?;
                let mut crc = [0u8; 4];
                read_exact(reader, &mut crc)?;
                codec.decompress(&mut bytes)?;
                let expected = u32::from_be_bytes(crc);
                let actual = crc32fast::hash(&bytes);
                if expected != actual {
                    return Err(Details::Checksum {
                        block: name,
                        expected,
                        actual,
                    }
                    .into());
                }
                let mut slice = bytes.as_slice();
                Some(if tag == PAYLOAD_IMAGE {
                    Payload::Image(decode_array(&mut slice)?)
                } else {
                    Payload::Table(decode_columns(&mut slice)?)
                })
            }
            tag => {
                return Err(Details::InvalidTag {
                    what: "payload",
                    tag,
                }
                .into());
            }
        };

        let mut block_marker = [0u8; 16];
        read_exact(reader, &mut block_marker)?;
        if block_marker != marker {
            return Err(Details::GetBlockMarker.into());
        }
        blocks.push(Block {
            name,
            header,
            payload,
        });
    }

    ContainerFile::new(primary, blocks)
}

pub(crate) fn decode_header<R: Read>(reader: &mut R) -> DcResult<Header> {
    let len = read_len(reader)?;
    let mut header = Header::new();
    for _ in 0..len {
        let key = read_string(reader)?;
        let value = decode_header_value(reader, 0)?;
        header.insert(key, value);
    }
    Ok(header)
}

fn decode_header_value<R: Read>(reader: &mut R, depth: usize) -> DcResult<HeaderValue> {
    Ok(match read_u8(reader)? {
        HEADER_BOOLEAN => HeaderValue::Boolean(read_u8(reader)? != 0),
        HEADER_INT => HeaderValue::Int(read_long(reader)?),
        HEADER_FLOAT => {
            let mut buf = [0u8; 8];
            read_exact(reader, &mut buf)?;
            HeaderValue::Float(f64::from_le_bytes(buf))
        }
        HEADER_STRING => HeaderValue::String(read_string(reader)?),
        HEADER_LIST => {
            if depth >= MAX_HEADER_DEPTH {
                return Err(Details::HeaderNesting(MAX_HEADER_DEPTH).into());
            }
            let len = read_len(reader)?;
            let mut items = Vec::with_capacity(len.min(1024));
            for _ in 0..len {
                items.push(decode_header_value(reader, depth + 1)?);
            }
            HeaderValue::List(items)
        }
        tag => {
            return Err(Details::InvalidTag {
                what: "header value",
                tag,
            }
            .into());
        }
    })
}

fn decode_array<R: Read>(reader: &mut R) -> DcResult<Array> {
    let dtype = read_string(reader)?;
    let dtype = DType::from_str(&dtype).map_err(|_| Details::DType(dtype.clone()))?;
    let ndim = read_len(reader)?;
    let mut shape = Vec::with_capacity(ndim.min(32));
    for _ in 0..ndim {
        shape.push(read_len(reader)?);
    }
    let data = read_bytes(reader)?;
    Array::new(dtype, shape, data)
}

fn decode_columns<R: Read>(reader: &mut R) -> DcResult<Vec<Column>> {
    let len = read_len(reader)?;
    let mut columns = Vec::with_capacity(len.min(1024));
    for _ in 0..len {
        let name = read_string(reader)?;
        let data = match read_u8(reader)? {
            COLUMN_ARRAY => ColumnData::Array(decode_array(reader)?),
            COLUMN_RECORD_REF => ColumnData::RecordRef(read_string(reader)?),
            tag => return Err(Details::InvalidTag { what: "column", tag }.into()),
        };
        columns.push(Column { name, data });
    }
    Ok(columns)
}
