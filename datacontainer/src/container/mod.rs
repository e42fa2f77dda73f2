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

//! Multi-block container files.
//!
//! A container file holds one primary header followed by an ordered list of uniquely named
//! [`Block`]s. Files are written atomically with a [`FileWriter`] and read back whole with
//! [`ContainerFile::open`].

mod decode;
mod encode;
mod writer;

pub use writer::FileWriter;

use crate::{
    DcResult,
    block::{Block, Header},
    error::Details,
    validator::{validate_block_name, validate_header_key},
};
use std::{collections::HashSet, fs, io::Read, path::Path};

/// The content of a container file.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ContainerFile {
    primary: Header,
    blocks: Vec<Block>,
}

impl ContainerFile {
    /// Assemble a container file, checking block names and header keys.
    ///
    /// Block names must be unique, a duplicate is a [`Details::NameCollision`].
    pub fn new(primary: Header, blocks: Vec<Block>) -> DcResult<Self> {
        check_header(&primary)?;
        let mut names = HashSet::with_capacity(blocks.len());
        for block in &blocks {
            validate_block_name(&block.name)?;
            check_header(&block.header)?;
            if !names.insert(block.name.as_str()) {
                return Err(Details::NameCollision(block.name.clone()).into());
            }
        }
        Ok(ContainerFile { primary, blocks })
    }

    /// Read and decode the file at `path`.
    pub fn open(path: impl AsRef<Path>) -> DcResult<Self> {
        let path = path.as_ref();
        let bytes = fs::read(path).map_err(|source| Details::ReadFile {
            path: path.to_path_buf(),
            source,
        })?;
        Self::read(&mut bytes.as_slice())
    }

    /// Decode a container file from `reader`.
    pub fn read<R: Read>(reader: &mut R) -> DcResult<Self> {
        decode::decode_container(reader)
    }

    /// Write to `path` without compression and with a random sync marker.
    pub fn write(&self, path: impl AsRef<Path>, overwrite: bool) -> DcResult<()> {
        FileWriter::builder()
            .overwrite(overwrite)
            .build()
            .write(self, path)
    }

    pub fn primary(&self) -> &Header {
        &self.primary
    }

    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    pub fn block(&self, name: &str) -> Option<&Block> {
        self.blocks.iter().find(|b| b.name == name)
    }

    pub fn block_names(&self) -> impl Iterator<Item = &str> {
        self.blocks.iter().map(|b| b.name.as_str())
    }

    pub fn into_parts(self) -> (Header, Vec<Block>) {
        (self.primary, self.blocks)
    }
}

fn check_header(header: &Header) -> DcResult<()> {
    header.iter().try_for_each(|(key, _)| validate_header_key(key))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        Codec,
        block::{Column, ColumnData, Payload},
        codec::DeflateSettings,
        error::ErrorKind,
        types::{Array, HeaderValue},
        util::{write_bytes, write_long, write_string},
    };
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    type TestResult = anyhow::Result<()>;

    fn sample() -> DcResult<ContainerFile> {
        let primary: Header = [
            ("PIPELINE", HeaderValue::from("PYPEIT")),
            ("EXPTIME", HeaderValue::Float(900.0)),
            ("IR_REDUX", HeaderValue::Boolean(false)),
            ("BINNING", HeaderValue::List(vec![HeaderValue::Int(2), HeaderValue::Int(1)])),
        ]
        .into_iter()
        .collect();
        let blocks = vec![
            Block::header_only(
                "DET01-SPEC2DOBJ",
                [("DMODCLS", "Spec2DObj"), ("DMODVER", "1.1.0")].into_iter().collect(),
            ),
            Block::image(
                "DET01-SCIIMG",
                Header::new(),
                Array::from_f32(vec![2, 3], &[1.0, 2.0, 3.0, 4.0, 5.0, f32::NAN])?,
            ),
            Block {
                name: "OBJ-SPECOBJ".into(),
                header: Header::new(),
                payload: Some(Payload::Table(vec![
                    Column {
                        name: "OPT_WAVE".into(),
                        data: ColumnData::Array(Array::from_f64(vec![2], &[4000.0, 4001.5])?),
                    },
                    Column {
                        name: "DETECTOR".into(),
                        data: ColumnData::RecordRef("OBJ-DETECTOR".into()),
                    },
                ])),
            },
        ];
        ContainerFile::new(primary, blocks)
    }

    fn encode(file: &ContainerFile, codec: Codec) -> DcResult<Vec<u8>> {
        let mut bytes = Vec::new();
        FileWriter::builder()
            .codec(codec)
            .marker([3; 16])
            .build()
            .write_to(file, &mut bytes)?;
        Ok(bytes)
    }

    #[rstest]
    #[case(Codec::Null)]
    #[case(Codec::Deflate(DeflateSettings::default()))]
    fn round_trips_in_memory(#[case] codec: Codec) -> TestResult {
        let file = sample()?;
        let bytes = encode(&file, codec)?;
        let back = ContainerFile::read(&mut bytes.as_slice())?;
        assert_eq!(back.primary(), file.primary());
        assert_eq!(
            back.block_names().collect::<Vec<_>>(),
            vec!["DET01-SPEC2DOBJ", "DET01-SCIIMG", "OBJ-SPECOBJ"]
        );
        // NaN does not compare equal, so compare the raw bytes of the image.
        let image = back.block("DET01-SCIIMG").and_then(Block::image_data);
        assert_eq!(
            image.map(Array::as_bytes),
            file.block("DET01-SCIIMG").and_then(Block::image_data).map(Array::as_bytes)
        );
        assert_eq!(back.block("OBJ-SPECOBJ"), file.block("OBJ-SPECOBJ"));
        Ok(())
    }

    #[test]
    fn duplicate_block_names_collide() {
        let err = ContainerFile::new(
            Header::new(),
            vec![
                Block::header_only("A", Header::new()),
                Block::header_only("A", Header::new()),
            ],
        )
        .err();
        assert!(matches!(
            err.as_ref().map(|e| e.details()),
            Some(Details::NameCollision(name)) if name == "A"
        ));
    }

    #[test]
    fn invalid_header_keys_are_rejected() {
        let header: Header = [("BAD KEY", 1_i64)].into_iter().collect();
        assert!(ContainerFile::new(header, vec![]).is_err());
    }

    #[test]
    fn wrong_magic() -> TestResult {
        let mut bytes = encode(&sample()?, Codec::Null)?;
        bytes[0] = b'X';
        let err = ContainerFile::read(&mut bytes.as_slice()).err();
        assert!(matches!(err.as_ref().map(|e| e.details()), Some(Details::HeaderMagic)));
        Ok(())
    }

    #[test]
    fn truncated_file_is_a_format_error() -> TestResult {
        let bytes = encode(&sample()?, Codec::Null)?;
        let err = ContainerFile::read(&mut &bytes[..bytes.len() - 5]).err();
        assert_eq!(err.map(|e| e.kind()), Some(ErrorKind::Format));
        Ok(())
    }

    #[test]
    fn corrupted_payload_fails_the_checksum() -> TestResult {
        let file = ContainerFile::new(
            Header::new(),
            vec![Block::image("IMG", Header::new(), Array::from_u8(vec![4], &[1, 2, 3, 4])?)],
        )?;
        let mut bytes = encode(&file, Codec::Null)?;
        // The last payload byte sits before the 4-byte checksum and the 16-byte marker.
        let position = bytes.len() - 21;
        bytes[position] ^= 0xff;
        let err = ContainerFile::read(&mut bytes.as_slice()).err();
        assert!(matches!(
            err.as_ref().map(|e| e.details()),
            Some(Details::Checksum { block, .. }) if block == "IMG"
        ));
        Ok(())
    }

    #[test]
    fn block_marker_must_match() -> TestResult {
        let mut bytes = encode(&sample()?, Codec::Null)?;
        let last = bytes.len() - 1;
        bytes[last] ^= 0xff;
        let err = ContainerFile::read(&mut bytes.as_slice()).err();
        assert!(matches!(err.as_ref().map(|e| e.details()), Some(Details::GetBlockMarker)));
        Ok(())
    }

    #[test]
    fn missing_file_is_an_io_error() -> TestResult {
        let dir = tempfile::tempdir()?;
        let err = ContainerFile::open(dir.path().join("absent.dcf")).err();
        assert_eq!(err.map(|e| e.kind()), Some(ErrorKind::Io));
        Ok(())
    }

    /// A container with an empty primary header, no codec and the given raw block bytes.
    fn raw_file(header: &[u8], count: i64, blocks: &[u8]) -> DcResult<Vec<u8>> {
        let mut bytes = encode::MAGIC.to_vec();
        write_string("null", &mut bytes)?;
        bytes.extend_from_slice(&[3; 16]);
        bytes.extend_from_slice(header);
        write_long(count, &mut bytes)?;
        bytes.extend_from_slice(blocks);
        Ok(bytes)
    }

    #[test]
    fn oversized_array_shapes_fail_to_decode() -> TestResult {
        let mut payload = Vec::new();
        write_string("f64", &mut payload)?;
        write_long(4, &mut payload)?;
        for _ in 0..4 {
            write_long(1 << 28, &mut payload)?;
        }
        write_bytes(&[], &mut payload)?;

        let mut block = Vec::new();
        write_string("IMG", &mut block)?;
        write_long(0, &mut block)?;
        block.push(encode::PAYLOAD_IMAGE);
        write_bytes(&payload, &mut block)?;
        block.extend_from_slice(&crc32fast::hash(&payload).to_be_bytes());
        block.extend_from_slice(&[3; 16]);

        let mut primary = Vec::new();
        write_long(0, &mut primary)?;
        let bytes = raw_file(&primary, 1, &block)?;
        let err = ContainerFile::read(&mut bytes.as_slice()).err();
        assert!(matches!(
            err.as_ref().map(|e| e.details()),
            Some(Details::ArraySize { shape, .. }) if shape.len() == 4
        ));
        Ok(())
    }

    fn nested_list(depth: usize) -> HeaderValue {
        (0..depth).fold(HeaderValue::Int(1), |inner, _| HeaderValue::List(vec![inner]))
    }

    #[test]
    fn deeply_nested_header_lists_are_rejected() -> TestResult {
        let mut primary = Vec::new();
        write_long(1, &mut primary)?;
        write_string("DEEP", &mut primary)?;
        for _ in 0..10_000 {
            primary.push(encode::HEADER_LIST);
            write_long(1, &mut primary)?;
        }
        let bytes = raw_file(&primary, 0, &[])?;
        let err = ContainerFile::read(&mut bytes.as_slice()).err();
        assert!(matches!(
            err.as_ref().map(|e| e.details()),
            Some(Details::HeaderNesting(encode::MAX_HEADER_DEPTH))
        ));
        Ok(())
    }

    #[test]
    fn header_lists_nest_up_to_the_limit() -> TestResult {
        let header: Header = [("DEEP", nested_list(encode::MAX_HEADER_DEPTH))]
            .into_iter()
            .collect();
        let file = ContainerFile::new(header.clone(), vec![])?;
        let back = ContainerFile::read(&mut encode(&file, Codec::Null)?.as_slice())?;
        assert_eq!(back.primary(), &header);

        let deeper: Header = [("DEEP", nested_list(encode::MAX_HEADER_DEPTH + 1))]
            .into_iter()
            .collect();
        let err = encode(&ContainerFile::new(deeper, vec![])?, Codec::Null).err();
        assert_eq!(err.map(|e| e.kind()), Some(ErrorKind::Format));
        Ok(())
    }
}
