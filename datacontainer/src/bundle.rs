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

//! Bundling records into blocks.

use crate::{
    DcResult,
    block::{Block, Column, ColumnData, Header, Payload},
    error::Details,
    record::Record,
    schema::{DMODCLS, DMODVER, Layout},
    types::{HeaderValue, Value},
};
use log::debug;

/// Bundle `record` into an ordered list of blocks.
///
/// The first block is the header-only primary block `"{prefix}{SCHEMA}"`, carrying the schema
/// name and version plus every scalar and list field under its upper-case name. Each array field
/// follows as its own block `"{prefix}{FIELD}"`, or as a column of the primary block for
/// [`Layout::Table`] schemas. A nested record gets the primary block `"{prefix}{FIELD}"` and
/// its own blocks are prefixed with `"{prefix}{FIELD}-"`. Absent fields produce nothing.
pub fn bundle(record: &Record, prefix: &str) -> DcResult<Vec<Block>> {
    let primary = format!("{prefix}{}", record.schema().block_name());
    let mut blocks = Vec::new();
    bundle_named(record, primary, prefix, &mut blocks)?;
    debug!(
        "Bundled a {} record into {} blocks with prefix {prefix:?}",
        record.schema().name,
        blocks.len()
    );
    Ok(blocks)
}

fn bundle_named(
    record: &Record,
    primary_name: String,
    child_prefix: &str,
    blocks: &mut Vec<Block>,
) -> DcResult<()> {
    let schema = record.schema();

    let mut header = Header::new();
    header.insert(DMODCLS, schema.name.as_str());
    header.insert(DMODVER, schema.version.as_str());

    // The primary block is always first, its payload is only known once every field is seen.
    let primary_index = blocks.len();
    blocks.push(Block::header_only(primary_name, Header::new()));

    let mut columns = Vec::new();
    for field in &schema.fields {
        let stored = record.get(&field.name)?;
        let canonical = field.canonical.map(|provide| provide());
        let value = match (stored, &canonical) {
            (Some(stored), Some(current)) if stored != current => {
                return Err(Details::CanonicalMismatch {
                    schema: schema.name.clone(),
                    field: field.name.clone(),
                    stored: format!("{stored:?}"),
                    current: format!("{current:?}"),
                }
                .into());
            }
            (Some(stored), _) => stored,
            (None, Some(current)) => current,
            (None, None) => continue,
        };

        let key = field.name.to_uppercase();
        match value {
            Value::Array(array) => match schema.layout {
                Layout::Image => blocks.push(Block::image(
                    format!("{child_prefix}{key}"),
                    Header::new(),
                    array.clone(),
                )),
                Layout::Table => columns.push(Column {
                    name: key,
                    data: ColumnData::Array(array.clone()),
                }),
            },
            Value::Record(nested) => {
                let nested_name = format!("{child_prefix}{key}");
                let nested_prefix = format!("{nested_name}-");
                if schema.layout == Layout::Table {
                    columns.push(Column {
                        name: key,
                        data: ColumnData::RecordRef(nested_name.clone()),
                    });
                }
                bundle_named(nested, nested_name, &nested_prefix, blocks)?;
            }
            other => {
                header.insert(key, HeaderValue::try_from(other)?);
            }
        }
    }

    let primary = &mut blocks[primary_index];
    primary.header = header;
    if !columns.is_empty() {
        primary.payload = Some(Payload::Table(columns));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        block::BlockKind,
        schema::{FieldSchema, FieldType, Schema},
        types::Array,
    };
    use pretty_assertions::assert_eq;
    use std::sync::LazyLock;

    type TestResult = anyhow::Result<()>;

    static PROBE: LazyLock<Schema> = LazyLock::new(|| {
        Schema::builder()
            .name("Probe")
            .version("2.0")
            .fields(vec![
                FieldSchema::builder().name("id").types(vec![FieldType::Int]).build(),
                FieldSchema::builder()
                    .name("pixels")
                    .types(vec![FieldType::Array])
                    .optional(true)
                    .build(),
            ])
            .build()
            .expect("Probe schema is valid")
    });

    static HOLDER: LazyLock<Schema> = LazyLock::new(|| {
        Schema::builder()
            .name("Holder")
            .version("1.0")
            .fields(vec![
                FieldSchema::builder()
                    .name("flux")
                    .types(vec![FieldType::Array])
                    .build(),
                FieldSchema::builder()
                    .name("probe")
                    .types(vec![FieldType::Record(&PROBE)])
                    .optional(true)
                    .build(),
                FieldSchema::builder()
                    .name("ivar")
                    .types(vec![FieldType::Array])
                    .optional(true)
                    .build(),
                FieldSchema::builder()
                    .name("airmass")
                    .types(vec![FieldType::Float])
                    .optional(true)
                    .build(),
            ])
            .build()
            .expect("Holder schema is valid")
    });

    static ROW: LazyLock<Schema> = LazyLock::new(|| {
        Schema::builder()
            .name("Row")
            .version("1.0")
            .layout(Layout::Table)
            .fields(vec![
                FieldSchema::builder()
                    .name("wave")
                    .types(vec![FieldType::Array])
                    .build(),
                FieldSchema::builder()
                    .name("probe")
                    .types(vec![FieldType::Record(&PROBE)])
                    .build(),
            ])
            .build()
            .expect("Row schema is valid")
    });

    fn probe() -> DcResult<Record> {
        Record::new(
            &PROBE,
            [
                ("id", Value::Int(7)),
                ("pixels", Array::from_u8(vec![3], &[1, 2, 3])?.into()),
            ],
        )
    }

    #[test]
    fn primary_first_then_declaration_order() -> TestResult {
        let record = Record::new(
            &HOLDER,
            [
                ("flux", Array::from_f64(vec![2], &[1.0, 2.0])?.into()),
                ("probe", probe()?.into()),
                ("airmass", Value::Float(1.3)),
            ],
        )?;
        let blocks = bundle(&record, "DET02-")?;
        let names: Vec<_> = blocks.iter().map(|b| b.name.as_str()).collect();
        assert_eq!(
            names,
            vec!["DET02-HOLDER", "DET02-FLUX", "DET02-PROBE", "DET02-PROBE-PIXELS"]
        );

        let primary = &blocks[0];
        assert_eq!(primary.kind(), BlockKind::HeaderOnly);
        assert_eq!(primary.header.get(DMODCLS), Some(&HeaderValue::from("Holder")));
        assert_eq!(primary.header.get(DMODVER), Some(&HeaderValue::from("1.0")));
        assert_eq!(primary.header.get("AIRMASS"), Some(&HeaderValue::Float(1.3)));
        assert!(!primary.header.contains_key("IVAR"));

        assert_eq!(blocks[2].header.get(DMODCLS), Some(&HeaderValue::from("Probe")));
        assert_eq!(blocks[2].header.get("ID"), Some(&HeaderValue::Int(7)));
        Ok(())
    }

    #[test]
    fn table_layout_uses_columns() -> TestResult {
        let record = Record::new(
            &ROW,
            [
                ("wave", Array::from_f32(vec![2], &[5000.0, 5001.0])?.into()),
                ("probe", probe()?.into()),
            ],
        )?;
        let blocks = bundle(&record, "OBJ-")?;
        let names: Vec<_> = blocks.iter().map(|b| b.name.as_str()).collect();
        assert_eq!(names, vec!["OBJ-ROW", "OBJ-PROBE", "OBJ-PROBE-PIXELS"]);

        let payload = blocks[0].payload.as_ref();
        assert!(matches!(payload.and_then(|p| p.column("WAVE")), Some(ColumnData::Array(_))));
        assert_eq!(
            payload.and_then(|p| p.column("PROBE")),
            Some(&ColumnData::RecordRef("OBJ-PROBE".into()))
        );
        Ok(())
    }
}
