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

//! Bit-flag vocabularies for mask values.
//!
//! A mask value packs named flags into the bits of an integer, the first key of a vocabulary being
//! bit 0. Stored data records the vocabulary it was written with as a comma-joined list of keys,
//! see [`BitFlags::canonical`].

use crate::{DcResult, error::Details};

/// A vocabulary of named bit flags.
pub trait BitFlags {
    /// Flag names, in bit order.
    fn keys(&self) -> Vec<&'static str>;

    /// Name of the vocabulary, used in error messages.
    fn name(&self) -> &'static str;

    fn bit(&self, flag: &str) -> DcResult<u32> {
        self.keys()
            .iter()
            .position(|k| *k == flag)
            .map(|i| i as u32)
            .ok_or_else(|| {
                Details::UnknownFlag {
                    mask: self.name(),
                    flag: flag.to_string(),
                }
                .into()
            })
    }

    /// Whether `flag` is set in `value`.
    fn flagged(&self, value: u64, flag: &str) -> DcResult<bool> {
        Ok(value & (1 << self.bit(flag)?) != 0)
    }

    /// Return `value` with `flag` set.
    fn turn_on(&self, value: u64, flag: &str) -> DcResult<u64> {
        Ok(value | (1 << self.bit(flag)?))
    }

    /// Names of the flags set in `value`, in bit order.
    fn flagged_bits(&self, value: u64) -> Vec<&'static str> {
        self.keys()
            .into_iter()
            .enumerate()
            .filter(|(i, _)| value & (1 << i) != 0)
            .map(|(_, k)| k)
            .collect()
    }

    /// The comma-joined flag names identifying this vocabulary.
    fn canonical(&self) -> String {
        self.keys().join(",")
    }
}

/// A fixed vocabulary of `(flag, description)` pairs.
#[derive(Clone, Copy, Debug)]
pub struct BitMask {
    name: &'static str,
    flags: &'static [(&'static str, &'static str)],
}

impl BitMask {
    pub const fn new(name: &'static str, flags: &'static [(&'static str, &'static str)]) -> Self {
        BitMask { name, flags }
    }

    pub fn describe(&self, flag: &str) -> Option<&'static str> {
        self.flags.iter().find(|(k, _)| *k == flag).map(|(_, d)| *d)
    }
}

impl BitFlags for BitMask {
    fn keys(&self) -> Vec<&'static str> {
        self.flags.iter().map(|(k, _)| *k).collect()
    }

    fn name(&self) -> &'static str {
        self.name
    }
}

/// Flags of image pixel masks.
pub const IMAGE_BITMASK: BitMask = BitMask::new(
    "ImageBitMask",
    &[
        ("BPM", "Component of the instrument-specific bad pixel mask"),
        ("CR", "Cosmic ray detected"),
        ("SATURATION", "Saturated pixel"),
        ("MINCOUNTS", "Pixel below the instrument-specific minimum counts"),
        ("OFFSLITS", "Pixel does not belong to any slit"),
        ("IS_NAN", "Pixel value is undefined"),
        ("IVAR0", "Inverse variance is undefined"),
        ("IVAR_NAN", "Inverse variance is NaN"),
        ("EXTRACT", "Pixel masked during local skysub and extraction"),
    ],
);

/// Flags of slit masks.
pub const SLIT_BITMASK: BitMask = BitMask::new(
    "SlitTraceBitMask",
    &[
        ("SHORTSLIT", "Slit formed by left and right edge is too short. Not ignored for flexure"),
        ("BOXSLIT", "Slit formed by left and right edge is valid (large enough to be a valid slit), but too short to be a science slit"),
        ("USERIGNORE", "User has specified to ignore this slit. Not ignored for flexure."),
        ("BADWVCALIB", "Wavelength calibration failed for this slit"),
        ("BADTILTSCALIB", "Tilts analysis failed for this slit"),
        ("SKIPFLATCALIB", "Flat field generation failed for this slit. Skip flat fielding"),
        ("BADFLATCALIB", "Flat field generation failed for this slit. Ignore it fully."),
        ("BADREDUCE", "Skysub/extraction failed for this slit"),
    ],
);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use pretty_assertions::assert_eq;

    type TestResult = anyhow::Result<()>;

    #[test]
    fn flags_follow_bit_order() -> TestResult {
        let value = IMAGE_BITMASK.turn_on(0, "CR")?;
        let value = IMAGE_BITMASK.turn_on(value, "IS_NAN")?;
        assert_eq!(value, 0b10_0010);
        assert!(IMAGE_BITMASK.flagged(value, "CR")?);
        assert!(!IMAGE_BITMASK.flagged(value, "BPM")?);
        assert_eq!(IMAGE_BITMASK.flagged_bits(value), vec!["CR", "IS_NAN"]);
        Ok(())
    }

    #[test]
    fn unknown_flags_are_rejected() {
        let err = SLIT_BITMASK.flagged(1, "NOPE").err();
        assert_eq!(err.map(|e| e.kind()), Some(ErrorKind::Key));
    }

    #[test]
    fn canonical_lists_every_key() {
        assert_eq!(
            IMAGE_BITMASK.canonical(),
            "BPM,CR,SATURATION,MINCOUNTS,OFFSLITS,IS_NAN,IVAR0,IVAR_NAN,EXTRACT"
        );
        assert_eq!(SLIT_BITMASK.describe("BADREDUCE"), Some("Skysub/extraction failed for this slit"));
    }
}
