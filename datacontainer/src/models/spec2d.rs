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

//! Two-dimensional spectral products of one detector, and the per-exposure collection of them.

use super::{
    detector::{DETECTOR_SCHEMA, Detector},
    slits::{SLIT_TRACE_SET_SCHEMA, SlitTraceSet},
};
use crate::{
    DcResult,
    bitmask::{BitFlags, IMAGE_BITMASK, SLIT_BITMASK},
    block::Header,
    collection::{CollectionMember, KeyedCollection},
    container::ContainerFile,
    datamodel::DataContainer,
    error::Details,
    record::Record,
    schema::{ElementType, FieldSchema, FieldType, Schema},
    types::{Array, HeaderValue, Value},
};
use chrono::{Local, NaiveDate};
use log::debug;
use std::{path::Path, sync::LazyLock};

/// Block name prefix of the products of detector `det`.
pub fn spec2d_block_prefix(det: u32) -> String {
    format!("DET{det:02}-")
}

fn image_flags() -> Value {
    Value::String(IMAGE_BITMASK.canonical())
}

fn positive_det(record: &mut Record) -> Result<(), String> {
    match record.int("det") {
        Some(det) if det > 0 => Ok(()),
        Some(det) => Err(format!("det must be a positive detector number, got {det}")),
        None => Err("Must set det at instantiation".to_string()),
    }
}

fn image(name: &str, element: ElementType, description: &str, optional: bool) -> FieldSchema {
    FieldSchema::builder()
        .name(name)
        .types(vec![FieldType::Array])
        .element(element)
        .description(description)
        .optional(optional)
        .build()
}

pub static SPEC2DOBJ_SCHEMA: LazyLock<Schema> = LazyLock::new(|| {
    Schema::builder()
        .name("Spec2DObj")
        .version("1.0.0")
        .doc("2D spectral image outputs of one detector")
        .fields(vec![
            image("sciimg", ElementType::Float, "2D processed science image", false),
            image("ivarraw", ElementType::Float, "2D processed inverse variance image", false),
            image("skymodel", ElementType::Float, "2D sky model image", true),
            image("objmodel", ElementType::Float, "2D object model image", true),
            image("ivarmodel", ElementType::Float, "2D ivar model image", true),
            image("tilts", ElementType::Float, "2D tilts image", true),
            image("waveimg", ElementType::Float, "2D wavelength image", true),
            image("bpmmask", ElementType::Int, "2D bad-pixel mask for the image", true),
            FieldSchema::builder()
                .name("imgbitm")
                .types(vec![FieldType::String])
                .description("List of BITMASK keys from ImageBitMask")
                .canonical(image_flags)
                .build(),
            FieldSchema::builder()
                .name("slits")
                .types(vec![FieldType::Record(&SLIT_TRACE_SET_SCHEMA)])
                .description("SlitTraceSet defining the slits")
                .optional(true)
                .build(),
            FieldSchema::builder()
                .name("sci_spat_flexure")
                .types(vec![FieldType::Float])
                .description("Shift, in spatial pixels, between this image and SlitTrace")
                .optional(true)
                .build(),
            FieldSchema::builder()
                .name("detector")
                .types(vec![FieldType::Record(&DETECTOR_SCHEMA)])
                .description("Detector DataContainer")
                .optional(true)
                .build(),
            FieldSchema::builder()
                .name("det")
                .types(vec![FieldType::Int])
                .description("Detector index")
                .build(),
        ])
        .validate(positive_det)
        .build()
        .expect("Spec2DObj schema is valid")
});

/// The 2D spectral products of one detector.
#[derive(Clone, Debug)]
pub struct Spec2DObj {
    record: Record,
    head0: Option<Header>,
}

impl PartialEq for Spec2DObj {
    fn eq(&self, other: &Self) -> bool {
        self.record == other.record
    }
}

impl DataContainer for Spec2DObj {
    fn schema() -> &'static Schema {
        &SPEC2DOBJ_SCHEMA
    }

    fn wrap(record: Record) -> Self {
        Spec2DObj { record, head0: None }
    }

    fn record(&self) -> &Record {
        &self.record
    }

    fn record_mut(&mut self) -> &mut Record {
        &mut self.record
    }

    fn into_record(self) -> Record {
        self.record
    }

    fn block_prefix(&self) -> String {
        let det = self.det().and_then(|d| u32::try_from(d).ok()).unwrap_or_default();
        spec2d_block_prefix(det)
    }
}

impl CollectionMember for Spec2DObj {
    const META_PREFIX: &'static str = "ALLSPEC2D_";
    const COLLECTION_NAME: &'static str = "AllSpec2DObj";

    fn key_prefix(key: u32) -> String {
        spec2d_block_prefix(key)
    }
}

#[bon::bon]
impl Spec2DObj {
    #[builder]
    pub fn new(
        det: u32,
        sciimg: Array,
        ivarraw: Array,
        skymodel: Option<Array>,
        objmodel: Option<Array>,
        ivarmodel: Option<Array>,
        tilts: Option<Array>,
        waveimg: Option<Array>,
        bpmmask: Option<Array>,
        #[builder(into)] imgbitm: Option<String>,
        slits: Option<SlitTraceSet>,
        sci_spat_flexure: Option<f64>,
        detector: Option<Detector>,
    ) -> DcResult<Self> {
        let mut values: Vec<(&str, Value)> = vec![
            ("det", det.into()),
            ("sciimg", sciimg.into()),
            ("ivarraw", ivarraw.into()),
        ];
        let optional = [
            ("skymodel", skymodel.map(Value::from)),
            ("objmodel", objmodel.map(Value::from)),
            ("ivarmodel", ivarmodel.map(Value::from)),
            ("tilts", tilts.map(Value::from)),
            ("waveimg", waveimg.map(Value::from)),
            ("bpmmask", bpmmask.map(Value::from)),
            ("imgbitm", imgbitm.map(Value::from)),
            ("slits", slits.map(|s| Value::from(s.into_record()))),
            ("sci_spat_flexure", sci_spat_flexure.map(Value::from)),
            ("detector", detector.map(|d| Value::from(d.into_record()))),
        ];
        values.extend(optional.into_iter().filter_map(|(k, v)| v.map(|v| (k, v))));

        Ok(Spec2DObj {
            record: Record::new(&SPEC2DOBJ_SCHEMA, values)?,
            head0: None,
        })
    }
}

impl Spec2DObj {
    /// Read the products of detector `det` from a container file, keeping its primary header.
    pub fn from_file(path: impl AsRef<Path>, det: u32) -> DcResult<Self> {
        let path = path.as_ref();
        let file = ContainerFile::open(path)?;
        let tag = format!("DET{det:02}");
        if !file.block_names().any(|name| name.contains(&tag)) {
            return Err(Details::DetectorNotInFile {
                det,
                path: path.to_path_buf(),
            }
            .into());
        }
        let mut spec2d = Self::from_blocks(file.blocks(), &spec2d_block_prefix(det))?;
        spec2d.head0 = Some(file.primary().clone());
        Ok(spec2d)
    }

    pub fn det(&self) -> Option<i64> {
        self.record.int("det")
    }

    pub fn sciimg(&self) -> Option<&Array> {
        self.record.array("sciimg")
    }

    pub fn ivarraw(&self) -> Option<&Array> {
        self.record.array("ivarraw")
    }

    pub fn bpmmask(&self) -> Option<&Array> {
        self.record.array("bpmmask")
    }

    pub fn sci_spat_flexure(&self) -> Option<f64> {
        self.record.float("sci_spat_flexure")
    }

    pub fn slits(&self) -> Option<SlitTraceSet> {
        self.record
            .record("slits")
            .and_then(|r| SlitTraceSet::from_record(r.clone()).ok())
    }

    pub fn detector(&self) -> Option<Detector> {
        self.record
            .record("detector")
            .and_then(|r| Detector::from_record(r.clone()).ok())
    }

    /// The primary header of the file this object was read from.
    pub fn head0(&self) -> Option<&Header> {
        self.head0.as_ref()
    }

    /// Completed reduction steps. They are working state and are not stored with the object.
    pub fn process_steps(&self) -> Option<Vec<String>> {
        let steps = self.record.internal("process_steps")?.as_list()?;
        Some(
            steps
                .iter()
                .filter_map(|s| s.as_str().map(str::to_string))
                .collect(),
        )
    }

    pub fn set_process_steps<S: Into<String>>(&mut self, steps: impl IntoIterator<Item = S>) {
        let steps: Vec<Value> = steps.into_iter().map(|s| Value::String(s.into())).collect();
        self.record.set_internal("process_steps", Value::List(steps));
    }
}

/// The 2D spectral products of every detector of an exposure.
pub type AllSpec2DObj = KeyedCollection<Spec2DObj>;

/// Calibration keys recorded in the primary header of a spec2d file.
#[derive(bon::Builder, Clone, Debug)]
pub struct CalibKeys {
    #[builder(into)]
    pub bias: String,
    #[builder(into)]
    pub arc: String,
    #[builder(into)]
    pub trace: String,
    #[builder(into)]
    pub flat: String,
}

/// Raw header keys describing the raw image layout, replaced by the written file's own.
const STRUCTURAL_KEYS: &[&str] = &[
    "BUNIT", "COMMENT", "", "BITPIX", "NAXIS", "NAXIS1", "NAXIS2", "HISTORY", "EXTEND", "DATASEC",
];

/// Drop the last three characters, the detector part of a calibration key.
fn strip_detector(key: &str) -> String {
    let keep = key.chars().count().saturating_sub(3);
    key.chars().take(keep).collect()
}

#[bon::bon]
impl KeyedCollection<Spec2DObj> {
    /// Build the primary header of a spec2d file from the header of the raw frame.
    #[builder]
    pub fn build_primary_header(
        &self,
        raw_header: &Header,
        #[builder(into)] pypeline: String,
        #[builder(into)] spectrograph: String,
        calib_keys: Option<&CalibKeys>,
        master_dir: Option<&Path>,
        #[builder(into)] redux_path: Option<String>,
        subheader: Option<&Header>,
        #[builder(default = Local::now().date_naive())] date: NaiveDate,
    ) -> Header {
        let mut header = Header::new();
        for (key, value) in raw_header.iter() {
            if !STRUCTURAL_KEYS.contains(&key) {
                header.insert(key, value.clone());
            }
        }
        if let Some(history) = raw_header.get("HISTORY") {
            header.insert("HISTORY", history.to_string().replace('\n', " "));
        }
        if let Some(subheader) = subheader {
            for (key, value) in subheader.iter() {
                header.insert(key.to_uppercase(), value.clone());
            }
        }

        header.insert("PIPELINE", "PYPEIT");
        header.insert("PYPELINE", pypeline);
        header.insert("SPECTROG", spectrograph);
        header.insert("DATE-RDX", date.format("%Y-%b-%d").to_string());

        if let Some(keys) = calib_keys {
            header.insert("BIASMKEY", strip_detector(&keys.bias));
            header.insert("ARCMKEY", strip_detector(&keys.arc));
            header.insert("TRACMKEY", strip_detector(&keys.trace));
            header.insert("FLATMKEY", strip_detector(&keys.flat));
        }

        if let Some(steps) = self.iter().next().and_then(|(_, s)| s.process_steps()) {
            header.insert("PROCSTEP", steps.join(","));
        }
        if let Some(master_dir) = master_dir {
            header.insert("PYPMFDIR", master_dir.display().to_string());
        }
        if let Some(redux_path) = redux_path {
            header.insert("PYPRDXP", redux_path);
        }

        let ir_redux = self.meta().get("ir_redux").and_then(HeaderValue::as_bool);
        header.insert("SKYSUB", if ir_redux == Some(true) { "DIFF" } else { "MODEL" });
        debug!("Built a primary header with {} entries", header.len());
        header
    }
}

impl KeyedCollection<Spec2DObj> {
    /// Slit ids, slit-mask design ids and slit flags of every detector.
    pub fn slit_report(&self) -> String {
        let mut lines = Vec::new();
        for (det, spec2d) in self.iter() {
            lines.push(format!("================ DET {det:02} ======================"));
            lines.push("SpatID  MaskID  Flags".to_string());
            let Some(slits) = spec2d.slits() else {
                continue;
            };
            let maskdef_id = slits.maskdef_id();
            let mask = slits.mask();
            for (i, spat_id) in slits.spat_id().into_iter().enumerate() {
                let maskdef = maskdef_id
                    .as_ref()
                    .and_then(|ids| ids.get(i).copied())
                    .unwrap_or(0);
                let bits = mask.get(i).copied().unwrap_or(0);
                let flags = if bits == 0 {
                    vec!["None"]
                } else {
                    SLIT_BITMASK.flagged_bits(bits as u64)
                };
                lines.push(format!("{spat_id:04}    {maskdef:04}    {}", flags.join(", ")));
            }
        }
        lines.join("\n")
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::{
        error::ErrorKind,
        models::{detector::tests::detector, slits::tests::slits},
        types::DType,
    };
    use pretty_assertions::assert_eq;

    type TestResult = anyhow::Result<()>;

    pub(crate) fn spec2d(det: u32, fill: f32) -> DcResult<Spec2DObj> {
        Spec2DObj::builder()
            .det(det)
            .sciimg(Array::from_f32(vec![2, 2], &[fill; 4])?)
            .ivarraw(Array::from_f32(vec![2, 2], &[1.0; 4])?)
            .bpmmask(Array::from_i16(vec![2, 2], &[0, 1, 0, 0])?)
            .slits(slits(&[0, 40])?)
            .detector(detector(det)?)
            .sci_spat_flexure(0.25)
            .build()
    }

    #[test]
    fn bundles_under_the_detector_prefix() -> TestResult {
        let spec2d = spec2d(1, 3.0)?;
        let blocks = spec2d.bundle()?;
        let names: Vec<_> = blocks.iter().map(|b| b.name.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "DET01-SPEC2DOBJ",
                "DET01-SCIIMG",
                "DET01-IVARRAW",
                "DET01-BPMMASK",
                "DET01-SLITS",
                "DET01-SLITS-SPAT_ID",
                "DET01-SLITS-LEFT_INIT",
                "DET01-SLITS-RIGHT_INIT",
                "DET01-SLITS-MASK",
                "DET01-DETECTOR",
            ]
        );
        assert_eq!(
            blocks[0].header.get("IMGBITM"),
            Some(&HeaderValue::from(IMAGE_BITMASK.canonical()))
        );
        let back = Spec2DObj::from_blocks(&blocks, "DET01-")?;
        assert_eq!(back, spec2d);
        assert_eq!(back.slits().map(|s| s.spat_id()), Some(vec![100, 300]));
        assert_eq!(back.detector().and_then(|d| d.det()), Some(1));
        Ok(())
    }

    #[test]
    fn det_must_be_positive() -> TestResult {
        let err = Spec2DObj::builder()
            .det(0)
            .sciimg(Array::zeros(DType::F32, vec![1])?)
            .ivarraw(Array::zeros(DType::F32, vec![1])?)
            .build()
            .err();
        assert!(matches!(
            err.as_ref().map(|e| e.details()),
            Some(Details::ValidationHook { .. })
        ));
        Ok(())
    }

    #[test]
    fn stale_image_flags_are_rejected() -> TestResult {
        let err = Spec2DObj::builder()
            .det(1)
            .sciimg(Array::zeros(DType::F32, vec![1])?)
            .ivarraw(Array::zeros(DType::F32, vec![1])?)
            .imgbitm("BPM,CR")
            .build()
            .err();
        assert_eq!(err.map(|e| e.kind()), Some(ErrorKind::SchemaViolation));
        Ok(())
    }

    #[test]
    fn reads_one_detector_with_its_primary_header() -> TestResult {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("spec2d.dcf");
        let mut all = AllSpec2DObj::new();
        all.insert(1, spec2d(1, 1.0)?)?;
        all.insert(2, spec2d(2, 2.0)?)?;
        all.write(&path, &Default::default())?;

        let second = Spec2DObj::from_file(&path, 2)?;
        assert_eq!(second, spec2d(2, 2.0)?);
        assert_eq!(
            second.head0().and_then(|h| h.get("ALLSPEC2D_DETS")),
            Some(&HeaderValue::from("1,2"))
        );

        let err = Spec2DObj::from_file(&path, 3).err();
        assert!(matches!(
            err.as_ref().map(|e| e.details()),
            Some(Details::DetectorNotInFile { det: 3, .. })
        ));
        Ok(())
    }

    #[test]
    fn primary_header_from_a_raw_header() -> TestResult {
        let mut all = AllSpec2DObj::new();
        let mut first = spec2d(1, 0.0)?;
        first.set_process_steps(["apply_gain", "flatten"]);
        all.insert(1, first)?;
        all.meta_mut().insert("ir_redux", true)?;

        let raw: Header = [
            ("NAXIS", HeaderValue::Int(2)),
            ("OBJECT", HeaderValue::from("J1234+5678")),
            ("HISTORY", HeaderValue::from("bias\nflat")),
            ("EXPTIME", HeaderValue::Float(600.0)),
        ]
        .into_iter()
        .collect();
        let subheader: Header = [("airmass", 1.2)].into_iter().collect();
        let calib = CalibKeys::builder()
            .bias("B_1_01")
            .arc("A_1_01")
            .trace("T_3_01")
            .flat("F_3_01")
            .build();

        let header = all
            .build_primary_header()
            .raw_header(&raw)
            .pypeline("MultiSlit")
            .spectrograph("keck_deimos")
            .calib_keys(&calib)
            .redux_path("/data/redux")
            .subheader(&subheader)
            .date(NaiveDate::from_ymd_opt(2020, 3, 7).ok_or_else(|| anyhow::anyhow!("bad date"))?)
            .call();

        assert!(!header.contains_key("NAXIS"));
        assert_eq!(header.get("OBJECT"), Some(&HeaderValue::from("J1234+5678")));
        assert_eq!(header.get("HISTORY"), Some(&HeaderValue::from("bias flat")));
        assert_eq!(header.get("AIRMASS"), Some(&HeaderValue::Float(1.2)));
        assert_eq!(header.get("DATE-RDX"), Some(&HeaderValue::from("2020-Mar-07")));
        assert_eq!(header.get("BIASMKEY"), Some(&HeaderValue::from("B_1")));
        assert_eq!(header.get("FLATMKEY"), Some(&HeaderValue::from("F_3")));
        assert_eq!(header.get("PROCSTEP"), Some(&HeaderValue::from("apply_gain,flatten")));
        assert_eq!(header.get("PYPRDXP"), Some(&HeaderValue::from("/data/redux")));
        assert_eq!(header.get("PYPMFDIR"), None);
        assert_eq!(header.get("SKYSUB"), Some(&HeaderValue::from("DIFF")));
        Ok(())
    }

    #[test]
    fn slit_report_lists_flags_per_detector() -> TestResult {
        let mut all = AllSpec2DObj::new();
        all.insert(2, spec2d(2, 0.0)?)?;
        assert_eq!(
            all.slit_report(),
            [
                "================ DET 02 ======================",
                "SpatID  MaskID  Flags",
                "0100    0000    None",
                "0300    0000    BADWVCALIB, SKIPFLATCALIB",
            ]
            .join("\n")
        );
        Ok(())
    }
}
