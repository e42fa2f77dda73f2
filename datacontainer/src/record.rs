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

//! Schema-validated records.

use crate::{
    DcResult,
    error::Details,
    schema::{Admission, FieldSchema, Schema},
    types::{Array, Value},
};
use std::{collections::BTreeMap, fmt};

/// A typed instance of a [`Schema`].
///
/// Every present value satisfies the schema: unknown names and wrongly typed values are rejected
/// by [`Record::new`], [`Record::set`] and [`Record::unset`] alike. Internal values are free-form
/// working state that is never validated, never serialized and ignored by equality.
///
/// `Clone` is a deep copy, nested records included.
#[derive(Clone)]
pub struct Record {
    schema: &'static Schema,
    fields: Vec<Option<Value>>,
    internals: BTreeMap<String, Value>,
}

impl Record {
    /// Build a record from `(field name, value)` pairs.
    ///
    /// Canonical fields that are absent receive their canonical value, required fields must be
    /// present, and the schema's validate hook runs last.
    pub fn new<I, K>(schema: &'static Schema, values: I) -> DcResult<Self>
    where
        I: IntoIterator<Item = (K, Value)>,
        K: AsRef<str>,
    {
        let mut record = Record {
            schema,
            fields: vec![None; schema.fields.len()],
            internals: BTreeMap::new(),
        };
        for (name, value) in values {
            let (position, value) = record.admit(name.as_ref(), value)?;
            record.fields[position] = Some(value);
        }
        record.validate()?;
        Ok(record)
    }

    pub fn schema(&self) -> &'static Schema {
        self.schema
    }

    fn field_schema(&self, name: &str) -> DcResult<(usize, &'static FieldSchema)> {
        let schema = self.schema;
        schema
            .position(name)
            .map(|i| (i, &schema.fields[i]))
            .ok_or_else(|| {
                Details::UnknownField {
                    schema: schema.name.clone(),
                    field: name.to_string(),
                }
                .into()
            })
    }

    fn admit(&self, name: &str, value: Value) -> DcResult<(usize, Value)> {
        let (position, field) = self.field_schema(name)?;
        let value = match field.admit(&self.schema.name, &value)? {
            Admission::Accepted => value,
            Admission::Coerced(coerced) => coerced,
        };
        if let Some(canonical) = field.canonical {
            check_canonical(self.schema, field, &value, &canonical())?;
        }
        Ok((position, value))
    }

    /// The value of a field, `None` when it is absent.
    pub fn get(&self, name: &str) -> DcResult<Option<&Value>> {
        let (position, _) = self.field_schema(name)?;
        Ok(self.fields[position].as_ref())
    }

    /// Replace the value of a field after checking it against the schema.
    pub fn set(&mut self, name: &str, value: impl Into<Value>) -> DcResult<()> {
        let (position, value) = self.admit(name, value.into())?;
        self.fields[position] = Some(value);
        Ok(())
    }

    /// Remove the value of an optional field, returning it.
    pub fn unset(&mut self, name: &str) -> DcResult<Option<Value>> {
        let (position, field) = self.field_schema(name)?;
        if field.is_required() {
            return Err(Details::UnsetRequired {
                schema: self.schema.name.clone(),
                field: name.to_string(),
            }
            .into());
        }
        Ok(self.fields[position].take())
    }

    /// Fill in canonical values, check required fields and run the validate hook.
    pub fn validate(&mut self) -> DcResult<()> {
        let schema = self.schema;
        for (field, slot) in schema.fields.iter().zip(self.fields.iter_mut()) {
            if let Some(canonical) = field.canonical {
                match slot {
                    Some(value) => check_canonical(schema, field, value, &canonical())?,
                    None => *slot = Some(canonical()),
                }
            }
            if slot.is_none() && field.is_required() {
                return Err(Details::MissingRequiredField {
                    schema: schema.name.clone(),
                    field: field.name.clone(),
                }
                .into());
            }
        }
        if let Some(hook) = schema.validate {
            hook(self).map_err(|reason| Details::ValidationHook {
                schema: schema.name.clone(),
                reason,
            })?;
        }
        Ok(())
    }

    /// Present fields in schema order.
    pub fn iter(&self) -> impl Iterator<Item = (&'static FieldSchema, &Value)> {
        let schema = self.schema;
        schema
            .fields
            .iter()
            .zip(&self.fields)
            .filter_map(|(field, value)| value.as_ref().map(|v| (field, v)))
    }

    /// Names of the present fields in schema order.
    pub fn keys(&self) -> impl Iterator<Item = &'static str> {
        self.iter().map(|(field, _)| field.name.as_str())
    }

    fn value(&self, name: &str) -> Option<&Value> {
        self.schema
            .position(name)
            .and_then(|i| self.fields[i].as_ref())
    }

    pub fn int(&self, name: &str) -> Option<i64> {
        self.value(name).and_then(Value::as_int)
    }

    pub fn float(&self, name: &str) -> Option<f64> {
        self.value(name).and_then(Value::as_float)
    }

    pub fn bool(&self, name: &str) -> Option<bool> {
        self.value(name).and_then(Value::as_bool)
    }

    pub fn str(&self, name: &str) -> Option<&str> {
        self.value(name).and_then(Value::as_str)
    }

    pub fn list(&self, name: &str) -> Option<&[Value]> {
        self.value(name).and_then(Value::as_list)
    }

    pub fn array(&self, name: &str) -> Option<&Array> {
        self.value(name).and_then(Value::as_array)
    }

    pub fn record(&self, name: &str) -> Option<&Record> {
        self.value(name).and_then(Value::as_record)
    }

    /// Mutable access to a nested record. The nested record keeps enforcing its own schema.
    pub fn record_mut(&mut self, name: &str) -> Option<&mut Record> {
        let position = self.schema.position(name)?;
        match self.fields[position].as_mut() {
            Some(Value::Record(record)) => Some(&mut **record),
            _ => None,
        }
    }

    pub fn internal(&self, name: &str) -> Option<&Value> {
        self.internals.get(name)
    }

    pub fn set_internal(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.internals.insert(name.into(), value.into());
    }
}

fn check_canonical(
    schema: &Schema,
    field: &FieldSchema,
    stored: &Value,
    current: &Value,
) -> DcResult<()> {
    if stored == current {
        Ok(())
    } else {
        Err(Details::CanonicalMismatch {
            schema: schema.name.clone(),
            field: field.name.clone(),
            stored: format!("{stored:?}"),
            current: format!("{current:?}"),
        }
        .into())
    }
}

impl PartialEq for Record {
    fn eq(&self, other: &Self) -> bool {
        self.schema.name == other.schema.name && self.fields == other.fields
    }
}

impl fmt::Debug for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut debug = f.debug_struct(&self.schema.name);
        for (field, value) in self.iter() {
            debug.field(&field.name, value);
        }
        debug.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        error::ErrorKind,
        schema::{ElementType, FieldType},
    };
    use pretty_assertions::assert_eq;
    use std::sync::LazyLock;

    type TestResult = anyhow::Result<()>;

    fn flags() -> Value {
        Value::from("BPM,CR")
    }

    fn positive_gain(record: &mut Record) -> Result<(), String> {
        match record.float("gain") {
            Some(g) if g <= 0.0 => Err(format!("gain must be positive, got {g}")),
            _ => Ok(()),
        }
    }

    static AMP: LazyLock<Schema> = LazyLock::new(|| {
        Schema::builder()
            .name("Amp")
            .version("1.0.0")
            .fields(vec![
                FieldSchema::builder()
                    .name("gain")
                    .types(vec![FieldType::Float])
                    .build(),
                FieldSchema::builder()
                    .name("name")
                    .types(vec![FieldType::String])
                    .optional(true)
                    .build(),
            ])
            .validate(positive_gain)
            .build()
            .expect("Amp schema is valid")
    });

    static FRAME: LazyLock<Schema> = LazyLock::new(|| {
        Schema::builder()
            .name("Frame")
            .version("1.0.0")
            .fields(vec![
                FieldSchema::builder()
                    .name("image")
                    .types(vec![FieldType::Array])
                    .element(ElementType::Float)
                    .build(),
                FieldSchema::builder()
                    .name("amp")
                    .types(vec![FieldType::Record(&AMP)])
                    .optional(true)
                    .build(),
                FieldSchema::builder()
                    .name("bitmask")
                    .types(vec![FieldType::String])
                    .canonical(flags)
                    .build(),
            ])
            .build()
            .expect("Frame schema is valid")
    });

    fn amp(gain: f64) -> DcResult<Record> {
        Record::new(&AMP, [("gain", Value::Float(gain))])
    }

    fn frame() -> DcResult<Record> {
        Record::new(
            &FRAME,
            [
                ("image", Array::from_f32(vec![2], &[1.0, 2.0])?.into()),
                ("amp", amp(1.2)?.into()),
            ],
        )
    }

    #[test]
    fn fills_canonical_fields() -> TestResult {
        let record = frame()?;
        assert_eq!(record.str("bitmask"), Some("BPM,CR"));
        assert_eq!(record.keys().collect::<Vec<_>>(), vec!["image", "amp", "bitmask"]);
        Ok(())
    }

    #[test]
    fn rejects_a_conflicting_canonical_value() -> TestResult {
        let err = Record::new(
            &FRAME,
            [
                ("image", Value::Array(Array::zeros(crate::types::DType::F32, vec![1])?)),
                ("bitmask", Value::from("BPM")),
            ],
        )
        .err();
        assert!(matches!(
            err.as_ref().map(|e| e.details()),
            Some(Details::CanonicalMismatch { .. })
        ));
        Ok(())
    }

    #[test]
    fn rejects_unknown_and_missing_fields() {
        let err = Record::new(&AMP, [("gain", Value::Float(1.0)), ("noise", Value::Float(3.0))]).err();
        assert_eq!(err.map(|e| e.kind()), Some(ErrorKind::SchemaViolation));

        let err = Record::new(&AMP, [("name", Value::from("A"))]).err();
        assert!(matches!(
            err.as_ref().map(|e| e.details()),
            Some(Details::MissingRequiredField { field, .. }) if field == "gain"
        ));
    }

    #[test]
    fn runs_the_validate_hook() {
        let err = amp(-1.0).err();
        assert!(matches!(
            err.as_ref().map(|e| e.details()),
            Some(Details::ValidationHook { reason, .. }) if reason.contains("positive")
        ));
    }

    #[test]
    fn set_and_unset_are_checked() -> TestResult {
        let mut record = amp(1.0)?;
        record.set("gain", 2)?;
        assert_eq!(record.get("gain")?, Some(&Value::Float(2.0)));
        assert!(record.set("gain", "high").is_err());
        assert!(record.set("bias", 3.0).is_err());
        assert!(record.get("bias").is_err());

        record.set("name", "A1")?;
        assert_eq!(record.unset("name")?, Some(Value::from("A1")));
        assert_eq!(record.get("name")?, None);
        assert_eq!(record.unset("gain").err().map(|e| e.kind()), Some(ErrorKind::SchemaViolation));
        Ok(())
    }

    #[test]
    fn nested_records_must_match_their_schema() -> TestResult {
        let mut record = frame()?;
        let err = record.set("amp", frame()?).err();
        assert!(matches!(
            err.as_ref().map(|e| e.details()),
            Some(Details::NestedSchema { .. })
        ));
        Ok(())
    }

    #[test]
    fn clone_is_deep_and_internals_do_not_count() -> TestResult {
        let original = frame()?;
        let mut copy = original.clone();
        copy.set_internal("process_steps", "bias,flat");
        assert_eq!(copy, original);

        if let Some(amp) = copy.record_mut("amp") {
            amp.set("gain", 3.5)?;
        }
        assert_eq!(original.record("amp").and_then(|a| a.float("gain")), Some(1.2));
        assert_eq!(copy.record("amp").and_then(|a| a.float("gain")), Some(3.5));
        assert_ne!(copy, original);
        Ok(())
    }
}
