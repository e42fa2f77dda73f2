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

//! # Custom name validation
//!
//! Field names become upper-case header keys and block names, so by default they are restricted
//! to ASCII identifiers. Block names additionally allow `-`, which separates name prefixes.
//!
//! A project with other naming conventions can register its own validator once, before any schema
//! is declared:
//!
//! ```
//! # use datacontainer::{DcResult, validator::{FieldNameValidator, set_field_name_validator}};
//! # use regex_lite::Regex;
//! # use std::sync::OnceLock;
//! struct LowerCaseOnly;
//!
//! impl FieldNameValidator for LowerCaseOnly {
//!     fn regex(&self) -> &'static Regex {
//!         static FIELD_NAME_ONCE: OnceLock<Regex> = OnceLock::new();
//!         FIELD_NAME_ONCE.get_or_init(|| Regex::new(r"^[a-z_][a-z0-9_]*$").expect("Regex is valid"))
//!     }
//! }
//!
//! if set_field_name_validator(Box::new(LowerCaseOnly)).is_err() {
//!     panic!("There was already a field name validator configured")
//! }
//! ```
//!
//! **Note**: a validator can be set only once per the application lifetime! If the application
//! declares schemas before setting a validator, the default validator is registered and used.

use crate::{DcResult, error::Details};
use log::debug;
use regex_lite::Regex;
use std::sync::OnceLock;

struct DefaultValidator;

/// A trait that validates schema field names.
///
/// To register a custom one use [`set_field_name_validator`].
pub trait FieldNameValidator: Send + Sync {
    fn regex(&self) -> &'static Regex {
        static FIELD_NAME_ONCE: OnceLock<Regex> = OnceLock::new();
        FIELD_NAME_ONCE.get_or_init(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").unwrap())
    }

    /// Should return [`Details::FieldName`] if it is invalid.
    fn validate(&self, field_name: &str) -> DcResult<()> {
        let regex = FieldNameValidator::regex(self);
        if !regex.is_match(field_name) {
            return Err(Details::FieldName(field_name.to_string(), regex.as_str()).into());
        }
        Ok(())
    }
}

impl FieldNameValidator for DefaultValidator {}

static FIELD_NAME_VALIDATOR_ONCE: OnceLock<Box<dyn FieldNameValidator + Send + Sync>> =
    OnceLock::new();

/// Sets a custom field name validator.
///
/// Returns `Err(validator)` if a validator is already configured.
pub fn set_field_name_validator(
    validator: Box<dyn FieldNameValidator + Send + Sync>,
) -> Result<(), Box<dyn FieldNameValidator + Send + Sync>> {
    debug!("Setting a custom field name validator.");
    FIELD_NAME_VALIDATOR_ONCE.set(validator)
}

pub(crate) fn validate_field_name(field_name: &str) -> DcResult<()> {
    FIELD_NAME_VALIDATOR_ONCE
        .get_or_init(|| {
            debug!("Going to use the default field name validator.");
            Box::new(DefaultValidator)
        })
        .validate(field_name)
}

/// A trait that validates block names.
///
/// To register a custom one use [`set_block_name_validator`].
pub trait BlockNameValidator: Send + Sync {
    fn regex(&self) -> &'static Regex {
        static BLOCK_NAME_ONCE: OnceLock<Regex> = OnceLock::new();
        BLOCK_NAME_ONCE.get_or_init(|| Regex::new(r"^[A-Za-z0-9_][A-Za-z0-9_\-]*$").unwrap())
    }

    /// Should return [`Details::BlockName`] if it is invalid.
    fn validate(&self, block_name: &str) -> DcResult<()> {
        let regex = BlockNameValidator::regex(self);
        if !regex.is_match(block_name) {
            return Err(Details::BlockName(block_name.to_string(), regex.as_str()).into());
        }
        Ok(())
    }
}

impl BlockNameValidator for DefaultValidator {}

static BLOCK_NAME_VALIDATOR_ONCE: OnceLock<Box<dyn BlockNameValidator + Send + Sync>> =
    OnceLock::new();

/// Sets a custom block name validator.
///
/// Returns `Err(validator)` if a validator is already configured.
pub fn set_block_name_validator(
    validator: Box<dyn BlockNameValidator + Send + Sync>,
) -> Result<(), Box<dyn BlockNameValidator + Send + Sync>> {
    debug!("Setting a custom block name validator.");
    BLOCK_NAME_VALIDATOR_ONCE.set(validator)
}

pub(crate) fn validate_block_name(block_name: &str) -> DcResult<()> {
    BLOCK_NAME_VALIDATOR_ONCE
        .get_or_init(|| {
            debug!("Going to use the default block name validator.");
            Box::new(DefaultValidator)
        })
        .validate(block_name)
}

/// Header keys are not configurable: empty keys (blank cards) are allowed, otherwise any printable
/// ASCII without spaces or `=`.
pub(crate) fn validate_header_key(key: &str) -> DcResult<()> {
    static HEADER_KEY_ONCE: OnceLock<Regex> = OnceLock::new();
    let regex = HEADER_KEY_ONCE.get_or_init(|| Regex::new(r"^[!-<>-~]*$").unwrap());
    if !regex.is_match(key) {
        return Err(Details::HeaderKey(key.to_string(), regex.as_str()).into());
    }
    Ok(())
}
