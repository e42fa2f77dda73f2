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

//! One-dimensional extracted spectra, stored as tables.

use super::detector::{DETECTOR_SCHEMA, Detector};
use crate::{
    DcResult,
    datamodel::{DataContainer, impl_data_container},
    error::Details,
    record::Record,
    schema::{ElementType, FieldSchema, FieldType, Layout, Schema},
    types::{Array, Value},
};
use std::{str::FromStr, sync::LazyLock};
use strum_macros::{Display, EnumString, IntoStaticStr};

/// Reduction mode of a spectrum.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Display, EnumString, IntoStaticStr)]
pub enum Pypeline {
    Echelle,
    MultiSlit,
    #[strum(serialize = "IFU")]
    Ifu,
}

/// One of the two extractions stored with every spectrum.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Display, EnumString, IntoStaticStr)]
pub enum Extraction {
    #[strum(serialize = "OPT")]
    Optimal,
    #[strum(serialize = "BOX")]
    Boxcar,
}

/// The arrays of one extraction, borrowed from a [`SpecObj`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ExtractedSpectrum<'a> {
    pub wave: &'a Array,
    pub flux: Option<&'a Array>,
    pub ivar: Option<&'a Array>,
    pub mask: Option<&'a Array>,
}

fn known_pypeline(record: &mut Record) -> Result<(), String> {
    let pypeline = record.str("PYPELINE").unwrap_or_default();
    Pypeline::from_str(pypeline)
        .map(|_| ())
        .map_err(|_| format!("Bad PYPELINE {pypeline:?}"))
}

fn field(name: &str, types: Vec<FieldType>, description: &str) -> FieldSchema {
    FieldSchema::builder()
        .name(name)
        .types(types)
        .description(description)
        .optional(true)
        .build()
}

fn spectrum(name: &str, description: &str) -> FieldSchema {
    FieldSchema::builder()
        .name(name)
        .types(vec![FieldType::Array])
        .element(ElementType::Float)
        .description(description)
        .optional(true)
        .build()
}

fn mask(name: &str, description: &str) -> FieldSchema {
    FieldSchema::builder()
        .name(name)
        .types(vec![FieldType::Array])
        .element(ElementType::Boolean)
        .description(description)
        .optional(true)
        .build()
}

/// Fields shared by the optimal (`OPT_`) and boxcar (`BOX_`) extractions.
fn extraction(prefix: &str, label: &str) -> Vec<FieldSchema> {
    vec![
        spectrum(&format!("{prefix}_WAVE"), &format!("{label} wavelengths (Angstroms)")),
        spectrum(&format!("{prefix}_FLAM"), &format!("{label} flux (erg/s/cm^2/Ang)")),
        spectrum(&format!("{prefix}_FLAM_SIG"), &format!("{label} flux uncertainty (erg/s/cm^2/Ang)")),
        spectrum(&format!("{prefix}_FLAM_IVAR"), &format!("{label} flux inverse variance (erg/s/cm^2/Ang)^-2")),
        spectrum(&format!("{prefix}_COUNTS"), &format!("{label} flux (counts)")),
        spectrum(&format!("{prefix}_COUNTS_IVAR"), &format!("{label} inverse variance of the extracted flux (counts^2)")),
        spectrum(&format!("{prefix}_COUNTS_SIG"), &format!("{label} extracted noise from IVAR (counts)")),
        spectrum(&format!("{prefix}_COUNTS_NIVAR"), &format!("{label} extracted noise variance, sky+read noise only (counts^2)")),
        mask(&format!("{prefix}_MASK"), &format!("Mask for the {label} extracted flux")),
        spectrum(&format!("{prefix}_COUNTS_SKY"), &format!("{label} extracted sky (counts)")),
        spectrum(&format!("{prefix}_COUNTS_RN"), &format!("{label} extracted RN squared (counts)")),
        spectrum(&format!("{prefix}_FRAC_USE"), "Fraction of pixels in the object profile subimage used for this extraction"),
        spectrum(&format!("{prefix}_CHI2"), "Reduced chi2 of the model fit for this spectral pixel"),
    ]
}

pub static SPECOBJ_SCHEMA: LazyLock<Schema> = LazyLock::new(|| {
    let mut fields = vec![
        spectrum("TRACE_SPAT", "Object trace along the spec (spatial pixel)"),
        field("FWHM", vec![FieldType::Float], "Spatial FWHM of the object (pixels)"),
        field("FWHMFIT", vec![FieldType::Array], "Spatial FWHM across the detector (pixels)"),
    ];
    fields.extend(extraction("OPT", "Optimal"));
    fields.push(spectrum("BOX_NPIX", "Number of pixels used for the boxcar extraction; can be fractional"));
    fields.extend(extraction("BOX", "Boxcar"));
    fields.extend([
        field("BOX_RADIUS", vec![FieldType::Float], "Size of boxcar radius (pixels)"),
        field("FLEX_SHIFT", vec![FieldType::Float], "Shift of the spectrum to correct for flexure (pixels)"),
        field("VEL_TYPE", vec![FieldType::String], "Type of heliocentric correction (if any)"),
        field("VEL_CORR", vec![FieldType::Float], "Relativistic velocity correction for wavelengths"),
        FieldSchema::builder()
            .name("DET")
            .types(vec![FieldType::Int])
            .description("Detector number")
            .build(),
        field("DETECTOR", vec![FieldType::Record(&DETECTOR_SCHEMA)], "Detector DataContainer"),
        FieldSchema::builder()
            .name("PYPELINE")
            .types(vec![FieldType::String])
            .description("Name of the reduction pipeline mode")
            .build(),
        field("OBJTYPE", vec![FieldType::String], "Type of object (standard, science)"),
        field("SPAT_PIXPOS", vec![FieldType::Float], "Spatial location of the trace on detector (pixel)"),
        field("SPAT_FRACPOS", vec![FieldType::Float], "Fractional location of the object on the slit"),
        field("SLITID", vec![FieldType::Int], "Slit ID, increasing from left to right on the detector. Zero based."),
        field("OBJID", vec![FieldType::Int], "Object ID for multislit data, one based within its slit"),
        field("NAME", vec![FieldType::String], "Name of the object following the naming model"),
        field("RA", vec![FieldType::Float], "Right Ascension (J2000) decimal degree"),
        field("DEC", vec![FieldType::Float], "Declination (J2000) decimal degree"),
        field("MASK_SLITID", vec![FieldType::Int], "Slitmask slit ID"),
        field("ECH_OBJID", vec![FieldType::Int], "Object ID for echelle data, one based within its order"),
        field("ECH_ORDERINDX", vec![FieldType::Int], "Order index, analogous to SLITID for echelle. Zero based."),
        field("ECH_FRACPOS", vec![FieldType::Float], "Synced echelle fractional location of the object on the slit"),
        field("ECH_ORDER", vec![FieldType::Int], "Physical echelle order"),
        field("ECH_NAME", vec![FieldType::String], "Name of the object for echelle data, without the order number"),
    ]);

    Schema::builder()
        .name("SpecObj")
        .version("1.1.0")
        .doc("One extracted spectrum and its trace")
        .layout(Layout::Table)
        .fields(fields)
        .validate(known_pypeline)
        .build()
        .expect("SpecObj schema is valid")
});

/// One extracted object spectrum.
#[derive(Clone, Debug, PartialEq)]
pub struct SpecObj {
    record: Record,
}

impl_data_container!(SpecObj, SPECOBJ_SCHEMA, block_prefix(this) {
    this.name().map(|name| format!("{name}-")).unwrap_or_default()
});

#[bon::bon]
impl SpecObj {
    /// Create a spectrum and name it, see [`SpecObj::set_name`].
    #[builder]
    pub fn new(
        pypeline: Pypeline,
        det: u32,
        #[builder(into, default = String::from("unknown"))] objtype: String,
        slitid: Option<i64>,
        ech_order: Option<i64>,
        ech_orderindx: Option<i64>,
        spat_pixpos: Option<f64>,
        ech_fracpos: Option<f64>,
    ) -> DcResult<Self> {
        let pypeline: &'static str = pypeline.into();
        let mut values: Vec<(&str, Value)> = vec![
            ("PYPELINE", pypeline.into()),
            ("DET", det.into()),
            ("OBJTYPE", objtype.into()),
            ("FLEX_SHIFT", 0.0_f64.into()),
        ];
        let optional = [
            ("SLITID", slitid.map(Value::from)),
            ("ECH_ORDER", ech_order.map(Value::from)),
            ("ECH_ORDERINDX", ech_orderindx.map(Value::from)),
            ("SPAT_PIXPOS", spat_pixpos.map(Value::from)),
            ("ECH_FRACPOS", ech_fracpos.map(Value::from)),
        ];
        values.extend(optional.into_iter().filter_map(|(k, v)| v.map(|v| (k, v))));

        let mut specobj = SpecObj {
            record: Record::new(&SPECOBJ_SCHEMA, values)?,
        };
        specobj.set_name()?;
        Ok(specobj)
    }
}

impl SpecObj {
    pub fn pypeline(&self) -> Option<Pypeline> {
        self.record
            .str("PYPELINE")
            .and_then(|p| Pypeline::from_str(p).ok())
    }

    pub fn name(&self) -> Option<&str> {
        self.record.str("NAME")
    }

    pub fn det(&self) -> Option<i64> {
        self.record.int("DET")
    }

    pub fn detector(&self) -> Option<Detector> {
        self.record
            .record("DETECTOR")
            .and_then(|r| Detector::from_record(r.clone()).ok())
    }

    pub fn set_detector(&mut self, detector: Detector) -> DcResult<()> {
        self.record.set("DETECTOR", detector.into_record())
    }

    pub fn opt_wave(&self) -> Option<&Array> {
        self.record.array("OPT_WAVE")
    }

    pub fn opt_counts(&self) -> Option<&Array> {
        self.record.array("OPT_COUNTS")
    }

    /// Wavelengths, flux, inverse variance and mask of one extraction.
    ///
    /// `fluxed` reads the `FLAM` columns instead of the `COUNTS` ones. Only the wavelengths are
    /// required.
    pub fn to_arrays(
        &self,
        extraction: Extraction,
        fluxed: bool,
    ) -> DcResult<ExtractedSpectrum<'_>> {
        let prefix: &'static str = extraction.into();
        let wave_field = format!("{prefix}_WAVE");
        let wave = self.record.array(&wave_field).ok_or_else(|| Details::MissingRequiredField {
            schema: SPECOBJ_SCHEMA.name.clone(),
            field: wave_field.clone(),
        })?;
        let (flux, ivar) = if fluxed {
            ("FLAM", "FLAM_IVAR")
        } else {
            ("COUNTS", "COUNTS_IVAR")
        };
        Ok(ExtractedSpectrum {
            wave,
            flux: self.record.array(&format!("{prefix}_{flux}")),
            ivar: self.record.array(&format!("{prefix}_{ivar}")),
            mask: self.record.array(&format!("{prefix}_MASK")),
        })
    }

    /// The slit, or the physical order for echelle data.
    pub fn slit_order(&self) -> Option<i64> {
        match self.pypeline()? {
            Pypeline::Echelle => self.record.int("ECH_ORDER"),
            Pypeline::MultiSlit | Pypeline::Ifu => self.record.int("SLITID"),
        }
    }

    /// The slit index, or the order index for echelle data.
    pub fn slit_orderindx(&self) -> Option<i64> {
        match self.pypeline()? {
            Pypeline::Echelle => self.record.int("ECH_ORDERINDX"),
            Pypeline::MultiSlit | Pypeline::Ifu => self.record.int("SLITID"),
        }
    }

    fn require_int(&self, field: &str) -> DcResult<i64> {
        self.record.int(field).ok_or_else(|| {
            Details::MissingRequiredField {
                schema: SPECOBJ_SCHEMA.name.clone(),
                field: field.to_string(),
            }
            .into()
        })
    }

    /// Name the spectrum after its position.
    ///
    /// Slit data is named `SPATssss-SLITnnnn-DETdd` from the spatial pixel position, the slit id and
    /// the detector; echelle data is named `OBJffff-DETdd-ORDERoooo` from the fractional position in
    /// thousandths, the detector and the order. An unknown position is written as `----`.
    pub fn set_name(&mut self) -> DcResult<()> {
        let pypeline = self.record.str("PYPELINE").unwrap_or_default();
        let pypeline = Pypeline::from_str(pypeline).map_err(|_| Details::ValidationHook {
            schema: SPECOBJ_SCHEMA.name.clone(),
            reason: format!("Bad PYPELINE {pypeline:?}"),
        })?;
        let det = self.require_int("DET")?;

        match pypeline {
            Pypeline::Echelle => {
                let frac = self
                    .record
                    .float("ECH_FRACPOS")
                    .map(|f| format!("{:04}", (1000.0 * f).round_ties_even() as i64));
                let order = self.require_int("ECH_ORDER")?;
                let ech_name = format!("OBJ{}-DET{det:02}", frac.as_deref().unwrap_or_default());
                let name = format!(
                    "OBJ{}-DET{det:02}-ORDER{order:04}",
                    frac.as_deref().unwrap_or("----")
                );
                self.record.set("ECH_NAME", ech_name)?;
                self.record.set("NAME", name)
            }
            Pypeline::MultiSlit | Pypeline::Ifu => {
                let spat = self
                    .record
                    .float("SPAT_PIXPOS")
                    .map(|p| format!("{:04}", p.round_ties_even() as i64))
                    .unwrap_or_else(|| "----".to_string());
                let slit = self.require_int("SLITID")?;
                self.record
                    .set("NAME", format!("SPAT{spat}-SLIT{slit:04}-DET{det:02}"))
            }
        }
    }
}
