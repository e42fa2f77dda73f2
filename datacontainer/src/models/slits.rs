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

//! Slit boundaries and their status flags.

use crate::{
    DcResult,
    bitmask::{BitFlags, SLIT_BITMASK},
    datamodel::impl_data_container,
    record::Record,
    schema::{ElementType, FieldSchema, FieldType, Schema},
    types::{Array, Value},
};
use std::sync::LazyLock;

fn slit_flags() -> Value {
    Value::String(SLIT_BITMASK.canonical())
}

fn consistent_slits(record: &mut Record) -> Result<(), String> {
    let count = |name: &str| record.array(name).map(|a| a.len());
    match (count("spat_id"), count("mask")) {
        (Some(ids), Some(mask)) if ids != mask => Err(format!(
            "spat_id holds {ids} slits but mask holds {mask}"
        )),
        _ => Ok(()),
    }
}

fn array(name: &str, element: ElementType, description: &str) -> FieldSchema {
    FieldSchema::builder()
        .name(name)
        .types(vec![FieldType::Array])
        .element(element)
        .description(description)
        .build()
}

pub static SLIT_TRACE_SET_SCHEMA: LazyLock<Schema> = LazyLock::new(|| {
    Schema::builder()
        .name("SlitTraceSet")
        .version("1.0.0")
        .doc("Left and right edges of the slits of one detector")
        .fields(vec![
            FieldSchema::builder()
                .name("nspec")
                .types(vec![FieldType::Int])
                .description("Number of pixels in the image spectral direction")
                .build(),
            FieldSchema::builder()
                .name("nspat")
                .types(vec![FieldType::Int])
                .description("Number of pixels in the image spatial direction")
                .build(),
            FieldSchema::builder()
                .name("pypeline")
                .types(vec![FieldType::String])
                .description("Pipeline mode the slits were traced for")
                .build(),
            FieldSchema::builder()
                .name("binspec")
                .types(vec![FieldType::Int])
                .description("Number of pixels binned in the spectral direction")
                .optional(true)
                .build(),
            FieldSchema::builder()
                .name("binspat")
                .types(vec![FieldType::Int])
                .description("Number of pixels binned in the spatial direction")
                .optional(true)
                .build(),
            array("spat_id", ElementType::Int, "Slit ID number from SPATIAL position at the detector center"),
            FieldSchema::builder()
                .name("maskdef_id")
                .types(vec![FieldType::Array])
                .element(ElementType::Int)
                .description("Slit ID number from the slitmask design")
                .optional(true)
                .build(),
            array("left_init", ElementType::Float, "Spatial coordinates of the left slit edges, shape (nspec, nslits)"),
            array("right_init", ElementType::Float, "Spatial coordinates of the right slit edges, shape (nspec, nslits)"),
            array("mask", ElementType::Int, "Bit mask of each slit"),
            FieldSchema::builder()
                .name("slitbitm")
                .types(vec![FieldType::String])
                .description("Comma-joined flag names of the slit bit mask")
                .canonical(slit_flags)
                .build(),
        ])
        .validate(consistent_slits)
        .build()
        .expect("SlitTraceSet schema is valid")
});

/// The slits traced on one detector.
#[derive(Clone, Debug, PartialEq)]
pub struct SlitTraceSet {
    record: Record,
}

impl_data_container!(SlitTraceSet, SLIT_TRACE_SET_SCHEMA);

#[bon::bon]
impl SlitTraceSet {
    #[builder]
    pub fn new(
        nspec: i64,
        nspat: i64,
        #[builder(into)] pypeline: String,
        spat_id: Array,
        left_init: Array,
        right_init: Array,
        mask: Array,
        maskdef_id: Option<Array>,
        binspec: Option<i64>,
        binspat: Option<i64>,
    ) -> DcResult<Self> {
        let mut values: Vec<(&str, Value)> = vec![
            ("nspec", nspec.into()),
            ("nspat", nspat.into()),
            ("pypeline", pypeline.into()),
            ("spat_id", spat_id.into()),
            ("left_init", left_init.into()),
            ("right_init", right_init.into()),
            ("mask", mask.into()),
        ];
        if let Some(maskdef_id) = maskdef_id {
            values.push(("maskdef_id", maskdef_id.into()));
        }
        if let Some(binspec) = binspec {
            values.push(("binspec", binspec.into()));
        }
        if let Some(binspat) = binspat {
            values.push(("binspat", binspat.into()));
        }
        Ok(SlitTraceSet {
            record: Record::new(&SLIT_TRACE_SET_SCHEMA, values)?,
        })
    }
}

impl SlitTraceSet {
    pub fn nslits(&self) -> usize {
        self.record.array("spat_id").map_or(0, Array::len)
    }

    pub fn spat_id(&self) -> Vec<i64> {
        self.int_array("spat_id").unwrap_or_default()
    }

    pub fn maskdef_id(&self) -> Option<Vec<i64>> {
        self.int_array("maskdef_id")
    }

    pub fn mask(&self) -> Vec<i64> {
        self.int_array("mask").unwrap_or_default()
    }

    fn int_array(&self, name: &str) -> Option<Vec<i64>> {
        self.record.array(name).and_then(Array::to_i64_vec)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::{datamodel::DataContainer, error::ErrorKind};
    use pretty_assertions::assert_eq;

    type TestResult = anyhow::Result<()>;

    pub(crate) fn slits(mask: &[i16]) -> DcResult<SlitTraceSet> {
        let n = mask.len();
        let ids: Vec<i32> = (0..n as i32).map(|i| 100 + 200 * i).collect();
        SlitTraceSet::builder()
            .nspec(4)
            .nspat(1000)
            .pypeline("MultiSlit")
            .spat_id(Array::from_i32(vec![n], &ids)?)
            .left_init(Array::zeros(crate::types::DType::F64, vec![4, n])?)
            .right_init(Array::zeros(crate::types::DType::F64, vec![4, n])?)
            .mask(Array::from_i16(vec![n], mask)?)
            .build()
    }

    #[test]
    fn records_the_flag_vocabulary() -> TestResult {
        let slits = slits(&[0, 8])?;
        assert_eq!(slits.record().str("slitbitm"), Some(SLIT_BITMASK.canonical().as_str()));
        assert_eq!(slits.spat_id(), vec![100, 300]);
        assert_eq!(slits.mask(), vec![0, 8]);
        assert_eq!(slits.maskdef_id(), None);
        assert_eq!(slits.nslits(), 2);
        Ok(())
    }

    #[test]
    fn rejects_a_mask_of_the_wrong_length() -> TestResult {
        let mut slits = slits(&[0, 0])?;
        slits.record_mut().set("mask", Array::from_i16(vec![3], &[0, 0, 0])?)?;
        let err = slits.record_mut().validate().err();
        assert_eq!(err.map(|e| e.kind()), Some(ErrorKind::SchemaViolation));
        Ok(())
    }

    #[test]
    fn stale_flag_vocabulary_is_rejected_on_read() -> TestResult {
        let mut blocks = slits(&[1])?.bundle()?;
        blocks[0].header.insert("SLITBITM", "SHORTSLIT,BOXSLIT");
        let err = SlitTraceSet::from_blocks(&blocks, "").err();
        assert_eq!(err.map(|e| e.kind()), Some(ErrorKind::SchemaViolation));
        Ok(())
    }
}
