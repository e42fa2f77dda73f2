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

use datacontainer::{
    Codec, ContainerFile, DataContainer, DeflateSettings, FileWriter, Spec2DObj,
    block::Header,
    error::{Details, ErrorKind},
};
use pretty_assertions::assert_eq;
use rstest::rstest;

mod common;
use common::{TestResult, spec2d};

#[rstest]
#[case::null(Codec::Null)]
#[case::deflate(Codec::Deflate(DeflateSettings::default()))]
fn spec2d_survives_a_file(#[case] codec: Codec) -> TestResult {
    let original = spec2d(1, 12.5)?;
    let blocks = original.bundle()?;
    let file = ContainerFile::new(Header::from_iter([("ORIGIN", "test")]), blocks)?;

    let dir = tempfile::tempdir()?;
    let path = dir.path().join("spec2d.dcf");
    FileWriter::builder().codec(codec).build().write(&file, &path)?;

    let read = ContainerFile::open(&path)?;
    assert_eq!(read, file);
    let back = Spec2DObj::from_blocks(read.blocks(), "DET01-")?;
    assert_eq!(back, original);
    assert_eq!(back.sci_spat_flexure(), Some(0.25));
    assert_eq!(back.slits().map(|s| s.mask()), Some(vec![0, 8]));
    assert_eq!(
        back.detector().map(|d| d.gain()),
        Some(vec![1.2, 1.3])
    );
    Ok(())
}

#[test]
fn from_file_keeps_the_primary_header() -> TestResult {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("spec2d.dcf");
    spec2d(3, 1.0)?.to_file(&path, false)?;

    let back = Spec2DObj::from_file(&path, 3)?;
    assert_eq!(back.det(), Some(3));
    assert!(back.head0().is_some());

    let err = Spec2DObj::from_file(&path, 2).err();
    assert!(matches!(
        err.as_ref().map(|e| e.details()),
        Some(Details::DetectorNotInFile { .. })
    ));
    Ok(())
}

#[test]
fn to_file_refuses_to_overwrite() -> TestResult {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("spec2d.dcf");
    spec2d(1, 1.0)?.to_file(&path, false)?;
    let before = std::fs::read(&path)?;

    let err = spec2d(1, 2.0)?.to_file(&path, false).err();
    assert_eq!(err.map(|e| e.kind()), Some(ErrorKind::AlreadyExists));
    assert_eq!(std::fs::read(&path)?, before);

    spec2d(1, 2.0)?.to_file(&path, true)?;
    let back = Spec2DObj::read_from(&path, "DET01-")?;
    assert_eq!(back.sciimg().map(|a| a.to_f64_vec()[0]), Some(2.0));
    Ok(())
}

#[test]
fn prefixes_keep_records_apart() -> TestResult {
    let mut blocks = spec2d(1, 1.0)?.bundle()?;
    blocks.extend(spec2d(2, 2.0)?.bundle()?);
    let file = ContainerFile::new(Header::new(), blocks)?;

    let first = Spec2DObj::from_blocks(file.blocks(), "DET01-")?;
    let second = Spec2DObj::from_blocks(file.blocks(), "DET02-")?;
    assert_eq!(first.sciimg().map(|a| a.to_f64_vec()[0]), Some(1.0));
    assert_eq!(second.sciimg().map(|a| a.to_f64_vec()[0]), Some(2.0));
    assert_eq!(second.detector().and_then(|d| d.det()), Some(2));

    let err = Spec2DObj::from_blocks(file.blocks(), "DET03-").err();
    assert!(matches!(
        err.as_ref().map(|e| e.details()),
        Some(Details::MissingBlock(name)) if name == "DET03-SPEC2DOBJ"
    ));
    Ok(())
}
