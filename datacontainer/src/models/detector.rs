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

//! Detector parameters, stored as a header-only nested record.

use crate::{
    DcResult,
    datamodel::impl_data_container,
    record::Record,
    schema::{ElementType, FieldSchema, FieldType, Schema},
    types::Value,
};
use std::sync::LazyLock;

fn number(name: &str, description: &str, optional: bool) -> FieldSchema {
    FieldSchema::builder()
        .name(name)
        .types(vec![FieldType::Int, FieldType::Float])
        .description(description)
        .optional(optional)
        .build()
}

fn per_amplifier(name: &str, element: ElementType, description: &str, optional: bool) -> FieldSchema {
    let scalar = match element {
        ElementType::String => FieldType::String,
        _ => FieldType::Float,
    };
    let mut types = vec![scalar, FieldType::List];
    if element != ElementType::String {
        types.insert(0, FieldType::Int);
    }
    FieldSchema::builder()
        .name(name)
        .types(types)
        .element(element)
        .description(description)
        .optional(optional)
        .build()
}

pub static DETECTOR_SCHEMA: LazyLock<Schema> = LazyLock::new(|| {
    Schema::builder()
        .name("Detector")
        .version("1.0.0")
        .doc("Parameters of a single detector")
        .fields(vec![
            FieldSchema::builder()
                .name("dataext")
                .types(vec![FieldType::Int])
                .description("Index of fits extension containing data")
                .build(),
            FieldSchema::builder()
                .name("specaxis")
                .types(vec![FieldType::Int])
                .description("Spectra are dispersed along this axis, 0 or 1")
                .build(),
            FieldSchema::builder()
                .name("specflip")
                .types(vec![FieldType::Boolean])
                .description("The dispersion dimension is flipped")
                .build(),
            FieldSchema::builder()
                .name("spatflip")
                .types(vec![FieldType::Boolean])
                .description("The spatial dimension is flipped")
                .build(),
            number("xgap", "Gap between the square detector pixels, as a fraction of the x pixel size", true),
            number("ygap", "Gap between the square detector pixels, as a fraction of the y pixel size", true),
            number("ysize", "Size of a pixel in the y-direction as a multiple of the x pixel size", true),
            number("platescale", "arcsec per pixel in the spatial dimension for an unbinned pixel", false),
            number("darkcurr", "Dark current (e-/hour)", true),
            number("saturation", "The detector saturation level", false),
            number("mincounts", "Counts in a pixel below this value are unphysical", false),
            number("nonlinear", "Fraction of the detector range which is linear", false),
            FieldSchema::builder()
                .name("numamplifiers")
                .types(vec![FieldType::Int])
                .description("Number of amplifiers")
                .build(),
            per_amplifier("gain", ElementType::Float, "Inverse gain (e-/ADU), one per amplifier", false),
            per_amplifier("ronoise", ElementType::Float, "Read-out noise (e-), one per amplifier", false),
            per_amplifier("datasec", ElementType::String, "Data sections, one per amplifier", true),
            per_amplifier("oscansec", ElementType::String, "Overscan sections, one per amplifier", true),
            FieldSchema::builder()
                .name("det")
                .types(vec![FieldType::Int])
                .description("Detector number, 1-based")
                .build(),
        ])
        .build()
        .expect("Detector schema is valid")
});

/// Parameters of one detector of a spectrograph.
#[derive(Clone, Debug, PartialEq)]
pub struct Detector {
    record: Record,
}

impl_data_container!(Detector, DETECTOR_SCHEMA);

#[bon::bon]
impl Detector {
    #[builder]
    pub fn new(
        dataext: i64,
        specaxis: i64,
        specflip: bool,
        spatflip: bool,
        platescale: f64,
        saturation: f64,
        mincounts: f64,
        nonlinear: f64,
        numamplifiers: i64,
        gain: Vec<f64>,
        ronoise: Vec<f64>,
        det: u32,
        xgap: Option<f64>,
        ygap: Option<f64>,
        ysize: Option<f64>,
        darkcurr: Option<f64>,
        datasec: Option<Vec<String>>,
        oscansec: Option<Vec<String>>,
    ) -> DcResult<Self> {
        let mut values: Vec<(&str, Value)> = vec![
            ("dataext", dataext.into()),
            ("specaxis", specaxis.into()),
            ("specflip", specflip.into()),
            ("spatflip", spatflip.into()),
            ("platescale", platescale.into()),
            ("saturation", saturation.into()),
            ("mincounts", mincounts.into()),
            ("nonlinear", nonlinear.into()),
            ("numamplifiers", numamplifiers.into()),
            ("gain", gain.into()),
            ("ronoise", ronoise.into()),
            ("det", det.into()),
        ];
        let optional = [
            ("xgap", xgap.map(Value::from)),
            ("ygap", ygap.map(Value::from)),
            ("ysize", ysize.map(Value::from)),
            ("darkcurr", darkcurr.map(Value::from)),
            ("datasec", datasec.map(Value::from)),
            ("oscansec", oscansec.map(Value::from)),
        ];
        values.extend(optional.into_iter().filter_map(|(k, v)| v.map(|v| (k, v))));

        Ok(Detector {
            record: Record::new(&DETECTOR_SCHEMA, values)?,
        })
    }
}

impl Detector {
    pub fn det(&self) -> Option<i64> {
        self.record.int("det")
    }

    pub fn platescale(&self) -> Option<f64> {
        self.record.float("platescale")
    }

    /// Per amplifier gains. A single number is a one-amplifier detector.
    pub fn gain(&self) -> Vec<f64> {
        floats(self.record.get("gain").ok().flatten())
    }

    pub fn ronoise(&self) -> Vec<f64> {
        floats(self.record.get("ronoise").ok().flatten())
    }

    /// On-chip binning, as `"spectral,spatial"`. It is working state and is not stored.
    pub fn binning(&self) -> Option<&str> {
        self.record.internal("binning").and_then(Value::as_str)
    }

    pub fn set_binning(&mut self, binning: impl Into<String>) {
        self.record.set_internal("binning", binning.into());
    }
}

fn floats(value: Option<&Value>) -> Vec<f64> {
    match value {
        Some(Value::List(items)) => items.iter().filter_map(Value::as_float).collect(),
        Some(other) => other.as_float().into_iter().collect(),
        None => Vec::new(),
    }
}
