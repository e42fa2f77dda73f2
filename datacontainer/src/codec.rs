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

//! Compression codecs applied to block payloads.

use crate::{DcResult, error::Details};
use strum_macros::{EnumIter, EnumString, IntoStaticStr};

/// Settings for the `Deflate` codec.
#[derive(Clone, Copy, Eq, PartialEq, Debug)]
pub struct DeflateSettings {
    compression_level: miniz_oxide::deflate::CompressionLevel,
}

impl DeflateSettings {
    pub fn new(compression_level: miniz_oxide::deflate::CompressionLevel) -> Self {
        DeflateSettings { compression_level }
    }

    fn compression_level(&self) -> u8 {
        self.compression_level as u8
    }
}

impl Default for DeflateSettings {
    /// Default compression level is `miniz_oxide::deflate::CompressionLevel::DefaultCompression`.
    fn default() -> Self {
        Self::new(miniz_oxide::deflate::CompressionLevel::DefaultCompression)
    }
}

/// The compression codec used for block payloads.
///
/// The codec name is recorded once per file, so every payload of a file uses the same codec.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, EnumIter, EnumString, IntoStaticStr)]
#[strum(serialize_all = "kebab_case")]
pub enum Codec {
    /// Payloads are stored uncompressed.
    #[default]
    Null,
    /// Payloads are compressed with raw deflate (RFC 1951).
    Deflate(DeflateSettings),
    #[cfg(feature = "snappy")]
    /// Payloads are compressed with [Snappy](http://google.github.io/snappy/), followed by the
    /// 4-byte, big-endian CRC32 checksum of the uncompressed payload.
    Snappy,
    #[cfg(feature = "zstandard")]
    /// Payloads are compressed with [Zstandard](https://facebook.github.io/zstd/).
    Zstandard(zstandard::ZstandardSettings),
}

impl Codec {
    /// Compress a stream of bytes in-place.
    pub fn compress(self, stream: &mut Vec<u8>) -> DcResult<()> {
        match self {
            Codec::Null => (),
            Codec::Deflate(settings) => {
                *stream =
                    miniz_oxide::deflate::compress_to_vec(stream, settings.compression_level());
            }
            #[cfg(feature = "snappy")]
            Codec::Snappy => {
                let mut encoded: Vec<u8> = vec![0; snap::raw::max_compress_len(stream.len())];
                let compressed_size = snap::raw::Encoder::new()
                    .compress(&stream[..], &mut encoded[..])
                    .map_err(Details::SnappyCompress)?;

                let checksum = crc32fast::hash(&stream[..]).to_be_bytes();
                encoded.truncate(compressed_size + checksum.len());
                encoded[compressed_size..].copy_from_slice(&checksum);

                *stream = encoded;
            }
            #[cfg(feature = "zstandard")]
            Codec::Zstandard(settings) => {
                *stream = zstd::encode_all(&stream[..], settings.compression_level as i32)
                    .map_err(Details::ZstdCompress)?;
            }
        };

        Ok(())
    }

    /// Decompress a stream of bytes in-place.
    pub fn decompress(self, stream: &mut Vec<u8>) -> DcResult<()> {
        *stream = match self {
            Codec::Null => return Ok(()),
            Codec::Deflate(_settings) => {
                miniz_oxide::inflate::decompress_to_vec(stream).map_err(|e| {
                    use miniz_oxide::inflate::TINFLStatus::*;
                    use std::io::{Error, ErrorKind};
                    let err = match e.status {
                        FailedCannotMakeProgress | NeedsMoreInput => {
                            Error::from(ErrorKind::UnexpectedEof)
                        }
                        Adler32Mismatch | Failed => Error::from(ErrorKind::InvalidData),
                        status => Error::other(format!("unexpected inflate status {status:?}")),
                    };
                    Details::DeflateDecompress(err)
                })?
            }
            #[cfg(feature = "snappy")]
            Codec::Snappy => {
                if stream.len() < 4 {
                    return Err(Details::SnappyCrc32 {
                        expected: 0,
                        actual: 0,
                    }
                    .into());
                }
                let (body, checksum) = stream.split_at(stream.len() - 4);
                let decompressed_size =
                    snap::raw::decompress_len(body).map_err(Details::GetSnappyDecompressLen)?;
                let mut decoded = vec![0; decompressed_size];
                snap::raw::Decoder::new()
                    .decompress(body, &mut decoded[..])
                    .map_err(Details::SnappyDecompress)?;

                let mut last_four: [u8; 4] = [0; 4];
                last_four.copy_from_slice(checksum);
                let expected = u32::from_be_bytes(last_four);
                let actual = crc32fast::hash(&decoded);

                if expected != actual {
                    return Err(Details::SnappyCrc32 { expected, actual }.into());
                }
                decoded
            }
            #[cfg(feature = "zstandard")]
            Codec::Zstandard(_settings) => {
                zstd::decode_all(&stream[..]).map_err(Details::ZstdDecompress)?
            }
        };
        Ok(())
    }
}

#[cfg(feature = "zstandard")]
pub mod zstandard {
    #[derive(Clone, Copy, Eq, PartialEq, Debug)]
    pub struct ZstandardSettings {
        pub compression_level: u8,
    }

    impl ZstandardSettings {
        pub fn new(compression_level: u8) -> Self {
            Self { compression_level }
        }
    }

    impl Default for ZstandardSettings {
        fn default() -> Self {
            Self::new(0)
        }
    }
}
