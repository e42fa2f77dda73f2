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

//! Rebuilding records from blocks.

use crate::{
    DcResult,
    block::{Block, ColumnData, Header},
    error::Details,
    record::Record,
    schema::{DMODCLS, DMODVER, FieldSchema, Layout, Schema},
    types::Value,
};
use log::{debug, warn};
use std::collections::HashMap;

/// Rebuild a record of `schema` from the blocks whose names begin with `prefix`.
///
/// This is the inverse of [`bundle`](crate::bundle::bundle). Fields without a matching block,
/// column or header key are absent. When a required field is missing the error is
/// [`Details::VersionMismatch`] if the data was written with another schema version, otherwise a
/// format error. Data written with another version that still satisfies the schema is read with a
/// warning. The record is built through [`Record::new`], so every schema check applies.
pub fn reconstruct(schema: &'static Schema, blocks: &[Block], prefix: &str) -> DcResult<Record> {
    let selected: HashMap<&str, &Block> = blocks
        .iter()
        .filter(|b| b.name.starts_with(prefix))
        .map(|b| (b.name.as_str(), b))
        .collect();
    let primary = format!("{prefix}{}", schema.block_name());
    let record = reconstruct_named(schema, &selected, &primary, prefix)?;
    debug!("Reconstructed a {} record from {primary}", schema.name);
    Ok(record)
}

fn header_str<'a>(block: &'a Block, key: &str) -> DcResult<&'a str> {
    let value = block.header.get(key).ok_or_else(|| Details::MissingHeaderKey {
        block: block.name.clone(),
        key: key.to_string(),
    })?;
    value.as_str().ok_or_else(|| {
        Details::HeaderType {
            block: block.name.clone(),
            key: key.to_string(),
            expected: "string",
        }
        .into()
    })
}

fn reconstruct_named(
    schema: &'static Schema,
    blocks: &HashMap<&str, &Block>,
    primary_name: &str,
    child_prefix: &str,
) -> DcResult<Record> {
    let primary = blocks
        .get(primary_name)
        .ok_or_else(|| Details::MissingBlock(primary_name.to_string()))?;

    let class = header_str(primary, DMODCLS)?;
    if class != schema.name {
        return Err(Details::RecordClass {
            block: primary_name.to_string(),
            expected: schema.name.clone(),
            found: class.to_string(),
        }
        .into());
    }
    let version = header_str(primary, DMODVER)?;

    let mut values = Vec::new();
    let mut missing = None;
    for field in &schema.fields {
        match bind_field(schema, field, primary, blocks, child_prefix)? {
            Some(value) => values.push((field.name.as_str(), value)),
            None if field.is_required() && field.canonical.is_none() => {
                missing.get_or_insert(field);
            }
            None => {}
        }
    }

    if let Some(field) = missing {
        return Err(if version != schema.version {
            Details::VersionMismatch {
                schema: schema.name.clone(),
                expected: schema.version.clone(),
                found: version.to_string(),
                field: field.name.clone(),
            }
        } else {
            Details::MissingField {
                schema: schema.name.clone(),
                field: field.name.clone(),
                block: primary_name.to_string(),
            }
        }
        .into());
    }
    if version != schema.version {
        warn!(
            "{primary_name} was written with {} version {version}, reading it with version {}",
            schema.name, schema.version
        );
    }

    Record::new(schema, values)
}

fn bind_field(
    schema: &Schema,
    field: &FieldSchema,
    primary: &Block,
    blocks: &HashMap<&str, &Block>,
    child_prefix: &str,
) -> DcResult<Option<Value>> {
    let key = field.name.to_uppercase();
    let child_name = format!("{child_prefix}{key}");

    if let Some(nested) = field.nested_schema() {
        let nested_name = match primary.payload.as_ref().and_then(|p| p.column(&key)) {
            Some(ColumnData::RecordRef(name)) => name.clone(),
            _ => child_name.clone(),
        };
        if blocks.contains_key(nested_name.as_str()) {
            let nested_prefix = format!("{nested_name}-");
            let record = reconstruct_named(nested, blocks, &nested_name, &nested_prefix)?;
            return Ok(Some(Value::from(record)));
        }
    }

    if field.is_array() {
        match schema.layout {
            Layout::Image => {
                if let Some(block) = blocks.get(child_name.as_str()) {
                    let array = block.image_data().ok_or_else(|| Details::BlockPayload {
                        block: child_name.clone(),
                        field: field.name.clone(),
                    })?;
                    return Ok(Some(Value::Array(array.clone())));
                }
            }
            Layout::Table => {
                if let Some(ColumnData::Array(array)) =
                    primary.payload.as_ref().and_then(|p| p.column(&key))
                {
                    return Ok(Some(Value::Array(array.clone())));
                }
            }
        }
    }

    Ok(header_value(&primary.header, &key))
}

fn header_value(header: &Header, key: &str) -> Option<Value> {
    header.get(key).map(Value::from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        bundle::bundle,
        error::ErrorKind,
        schema::{ElementType, FieldType},
        types::{Array, HeaderValue},
    };
    use pretty_assertions::assert_eq;
    use std::sync::LazyLock;

    type TestResult = anyhow::Result<()>;

    static TRACE: LazyLock<Schema> = LazyLock::new(|| {
        Schema::builder()
            .name("Trace")
            .version("1.1")
            .fields(vec![
                FieldSchema::builder()
                    .name("center")
                    .types(vec![FieldType::Array])
                    .element(ElementType::Float)
                    .build(),
                FieldSchema::builder()
                    .name("slitord")
                    .types(vec![FieldType::Int])
                    .build(),
                FieldSchema::builder()
                    .name("pad")
                    .types(vec![FieldType::List])
                    .element(ElementType::Int)
                    .optional(true)
                    .build(),
                FieldSchema::builder()
                    .name("maskdef")
                    .types(vec![FieldType::String])
                    .optional(true)
                    .build(),
            ])
            .build()
            .expect("Trace schema is valid")
    });

    fn trace() -> DcResult<Record> {
        Record::new(
            &TRACE,
            [
                ("center", Array::from_f64(vec![3], &[10.5, 11.0, 11.5])?.into()),
                ("slitord", Value::Int(4)),
                ("pad", Value::from(vec![2, 3])),
            ],
        )
    }

    #[test]
    fn round_trips_with_absent_optional_fields() -> TestResult {
        let record = trace()?;
        let blocks = bundle(&record, "")?;
        let back = reconstruct(&TRACE, &blocks, "")?;
        assert_eq!(back, record);
        assert_eq!(back.get("maskdef")?, None);
        Ok(())
    }

    #[test]
    fn missing_primary_block_is_a_format_error() -> TestResult {
        let blocks = bundle(&trace()?, "DET01-")?;
        let err = reconstruct(&TRACE, &blocks, "DET02-").err();
        assert!(matches!(
            err.as_ref().map(|e| e.details()),
            Some(Details::MissingBlock(name)) if name == "DET02-TRACE"
        ));
        Ok(())
    }

    #[test]
    fn class_must_match() -> TestResult {
        let mut blocks = bundle(&trace()?, "")?;
        blocks[0].header.insert(DMODCLS, "Other");
        let err = reconstruct(&TRACE, &blocks, "").err();
        assert!(matches!(
            err.as_ref().map(|e| e.details()),
            Some(Details::RecordClass { .. })
        ));
        Ok(())
    }

    #[test]
    fn missing_field_with_same_version_is_a_format_error() -> TestResult {
        let mut blocks = bundle(&trace()?, "")?;
        blocks.retain(|b| b.name != "CENTER");
        let err = reconstruct(&TRACE, &blocks, "").err();
        assert_eq!(err.map(|e| e.kind()), Some(ErrorKind::Format));
        Ok(())
    }

    #[test]
    fn missing_field_from_an_older_version_is_a_version_mismatch() -> TestResult {
        let mut blocks = bundle(&trace()?, "")?;
        blocks[0].header.remove("SLITORD");
        blocks[0].header.insert(DMODVER, "1.0");
        let err = reconstruct(&TRACE, &blocks, "").err();
        assert!(matches!(
            err.as_ref().map(|e| e.details()),
            Some(Details::VersionMismatch { field, found, .. }) if field == "slitord" && found == "1.0"
        ));
        Ok(())
    }

    #[test]
    fn older_version_satisfying_the_schema_is_read() -> TestResult {
        let record = trace()?;
        let mut blocks = bundle(&record, "")?;
        blocks[0].header.insert(DMODVER, "1.0");
        assert_eq!(reconstruct(&TRACE, &blocks, "")?, record);
        Ok(())
    }

    #[test]
    fn header_values_are_still_type_checked() -> TestResult {
        let mut blocks = bundle(&trace()?, "")?;
        blocks[0].header.insert("SLITORD", HeaderValue::from("four"));
        let err = reconstruct(&TRACE, &blocks, "").err();
        assert_eq!(err.map(|e| e.kind()), Some(ErrorKind::SchemaViolation));
        Ok(())
    }
}
