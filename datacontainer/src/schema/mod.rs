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

//! Logic for declaring record schemas.
//!
//! A [`Schema`] is an ordered list of [`FieldSchema`]s plus a name and a version. Schemas are
//! declared once, validated when they are built, and then referenced as `&'static Schema` by every
//! [`Record`](crate::Record) of that type:
//!
//! ```
//! use datacontainer::schema::{FieldSchema, FieldType, Schema};
//! use std::sync::LazyLock;
//!
//! static SKY: LazyLock<Schema> = LazyLock::new(|| {
//!     Schema::builder()
//!         .name("SkyModel")
//!         .version("1.0.0")
//!         .fields(vec![
//!             FieldSchema::builder()
//!                 .name("image")
//!                 .types(vec![FieldType::Array])
//!                 .description("Sky model image")
//!                 .build(),
//!             FieldSchema::builder()
//!                 .name("exptime")
//!                 .types(vec![FieldType::Float])
//!                 .optional(true)
//!                 .build(),
//!         ])
//!         .build()
//!         .expect("SkyModel schema is valid")
//! });
//!
//! assert_eq!(SKY.block_name(), "SKYMODEL");
//! assert!(SKY.field("exptime").is_some());
//! ```

mod field;

pub use field::FieldSchema;
pub(crate) use field::Admission;

use crate::{
    DcResult,
    error::Details,
    record::Record,
    types::Value,
    validator::{validate_block_name, validate_field_name},
};
use serde::{Serialize, Serializer};
use std::{
    collections::{BTreeMap, HashSet},
    fmt,
};
use strum_macros::{Display, EnumString, IntoStaticStr};

/// Header key naming the schema a block was bundled from.
pub const DMODCLS: &str = "DMODCLS";
/// Header key holding the schema version a block was bundled with.
pub const DMODVER: &str = "DMODVER";

/// Provider of the canonical value of a field.
pub type CanonicalFn = fn() -> Value;

/// Hook run on every constructed or reconstructed record. It may adjust fields and returns a
/// reason when the record is invalid.
pub type ValidateHook = fn(&mut Record) -> Result<(), String>;

/// The value types a field can accept.
#[derive(Clone, Copy, Debug)]
pub enum FieldType {
    Boolean,
    Int,
    Float,
    String,
    /// A short list of scalars.
    List,
    /// An n-dimensional typed array.
    Array,
    /// A nested record of the given schema.
    Record(&'static Schema),
}

impl PartialEq for FieldType {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (FieldType::Record(a), FieldType::Record(b)) => a.name == b.name,
            _ => std::mem::discriminant(self) == std::mem::discriminant(other),
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldType::Boolean => f.write_str("boolean"),
            FieldType::Int => f.write_str("int"),
            FieldType::Float => f.write_str("float"),
            FieldType::String => f.write_str("string"),
            FieldType::List => f.write_str("list"),
            FieldType::Array => f.write_str("array"),
            FieldType::Record(schema) => f.write_str(&schema.name),
        }
    }
}

impl Serialize for FieldType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Type of the elements of an array or list field.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Display, EnumString, IntoStaticStr, Serialize)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ElementType {
    Boolean,
    Int,
    Float,
    String,
}

/// How the array fields of a record are laid out in blocks.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Display, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Layout {
    /// Every array field gets its own image block.
    #[default]
    Image,
    /// Array fields are the columns of a table in the primary block.
    Table,
}

/// A description of a record type.
#[derive(Clone, Serialize)]
pub struct Schema {
    pub name: String,
    pub version: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub doc: String,
    pub layout: Layout,
    pub fields: Vec<FieldSchema>,
    /// Maps field names to their position in `fields`.
    #[serde(skip)]
    pub lookup: BTreeMap<String, usize>,
    #[serde(skip)]
    pub validate: Option<ValidateHook>,
}

impl fmt::Debug for Schema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut debug = f.debug_struct("Schema");
        debug.field("name", &self.name);
        debug.field("version", &self.version);
        debug.field("layout", &self.layout);
        debug.field("fields", &self.fields);
        debug.finish_non_exhaustive()
    }
}

#[bon::bon]
impl Schema {
    /// Declare a schema, validating its field names and types.
    #[builder]
    pub fn new(
        #[builder(into)] name: String,
        #[builder(into)] version: String,
        #[builder(into, default)] doc: String,
        #[builder(default)] layout: Layout,
        fields: Vec<FieldSchema>,
        validate: Option<ValidateHook>,
    ) -> DcResult<Self> {
        validate_block_name(&name)?;
        let block_name = name.to_uppercase();

        let mut seen = HashSet::with_capacity(fields.len());
        for field in &fields {
            validate_field_name(&field.name)?;
            let upper = field.name.to_uppercase();
            if upper == DMODCLS || upper == DMODVER {
                return Err(Details::ReservedFieldName {
                    schema: name,
                    field: field.name.clone(),
                }
                .into());
            }
            // A child block named after this field would collide with the primary block.
            if upper == block_name {
                return Err(Details::FieldShadowsSchema {
                    schema: name,
                    field: field.name.clone(),
                }
                .into());
            }
            if !seen.insert(upper) {
                return Err(Details::DuplicateField {
                    schema: name,
                    field: field.name.clone(),
                }
                .into());
            }
            if field.types.is_empty() {
                return Err(Details::NoAllowedTypes {
                    schema: name,
                    field: field.name.clone(),
                }
                .into());
            }
            if field.element.is_some()
                && !field.types.contains(&FieldType::Array)
                && !field.types.contains(&FieldType::List)
            {
                return Err(Details::ElementTypeWithoutContainer {
                    schema: name,
                    field: field.name.clone(),
                }
                .into());
            }
        }

        let lookup = calculate_lookup_table(&fields);
        Ok(Schema {
            name,
            version,
            doc,
            layout,
            fields,
            lookup,
            validate,
        })
    }
}

impl Schema {
    pub fn field(&self, name: &str) -> Option<&FieldSchema> {
        self.lookup.get(name).map(|&i| &self.fields[i])
    }

    pub fn position(&self, name: &str) -> Option<usize> {
        self.lookup.get(name).copied()
    }

    /// Name of the primary block of a record of this schema, without prefix.
    pub fn block_name(&self) -> String {
        self.name.to_uppercase()
    }

    /// Names of the fields that must always be present.
    pub fn required_fields(&self) -> impl Iterator<Item = &str> {
        self.fields
            .iter()
            .filter(|f| f.is_required())
            .map(|f| f.name.as_str())
    }

    /// JSON description of the data model, suitable for documentation.
    pub fn to_json(&self) -> DcResult<String> {
        serde_json::to_string_pretty(self).map_err(|e| Details::SerializeSchema(e).into())
    }
}

fn calculate_lookup_table(fields: &[FieldSchema]) -> BTreeMap<String, usize> {
    fields
        .iter()
        .enumerate()
        .map(|(i, field)| (field.name.clone(), i))
        .collect()
}
