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

use crate::{
    schema::{CanonicalFn, ElementType, FieldType},
    types::{Array, DType, Value, ValueKind},
};
use serde::Serialize;

/// Represents a field of a [`Schema`](crate::schema::Schema).
#[derive(bon::Builder, Clone, Debug, Serialize)]
pub struct FieldSchema {
    /// Name of the field. It becomes an upper-case header key or block name.
    #[builder(into)]
    pub name: String,
    /// Value types accepted by the field.
    pub types: Vec<FieldType>,
    /// Type of the elements of an array or list field.
    pub element: Option<ElementType>,
    /// Human readable description of the field.
    #[builder(into, default)]
    pub description: String,
    /// Whether the field may be absent.
    #[builder(default)]
    pub optional: bool,
    /// Provider of the value every stored instance of this field must hold.
    #[serde(skip)]
    pub canonical: Option<CanonicalFn>,
}

/// What happened when a value was checked against a field.
pub(crate) enum Admission {
    Accepted,
    /// An integer was stored in a float-only field.
    Coerced(Value),
}

impl FieldSchema {
    pub fn is_required(&self) -> bool {
        !self.optional
    }

    /// The field holds n-dimensional arrays and is stored in its own block.
    pub fn is_array(&self) -> bool {
        self.types.contains(&FieldType::Array)
    }

    /// The schema of the nested record held by this field, if any.
    pub fn nested_schema(&self) -> Option<&'static crate::schema::Schema> {
        self.types.iter().find_map(|t| match t {
            FieldType::Record(schema) => Some(*schema),
            _ => None,
        })
    }

    pub(crate) fn type_names(&self) -> String {
        self.types
            .iter()
            .map(|t| t.to_string())
            .collect::<Vec<_>>()
            .join(", ")
    }

    fn allows(&self, ty: FieldType) -> bool {
        self.types.contains(&ty)
    }

    /// Check `value` against the declared types, returning the coerced value when an integer is
    /// stored in a field that only accepts floats.
    pub(crate) fn admit(&self, schema: &str, value: &Value) -> crate::DcResult<Admission> {
        use crate::error::Details;

        let type_error = || Details::FieldType {
            schema: schema.to_string(),
            field: self.name.clone(),
            expected: self.type_names(),
            found: value.kind(),
        };

        match value {
            Value::Boolean(_) if self.allows(FieldType::Boolean) => Ok(Admission::Accepted),
            Value::Int(_) if self.allows(FieldType::Int) => Ok(Admission::Accepted),
            Value::Int(i) if self.allows(FieldType::Float) => {
                Ok(Admission::Coerced(Value::Float(*i as f64)))
            }
            Value::Float(_) if self.allows(FieldType::Float) => Ok(Admission::Accepted),
            Value::String(_) if self.allows(FieldType::String) => Ok(Admission::Accepted),
            Value::List(items) if self.allows(FieldType::List) => {
                self.admit_list(schema, items)?;
                Ok(Admission::Accepted)
            }
            Value::Array(array) if self.allows(FieldType::Array) => {
                self.admit_array(schema, array)?;
                Ok(Admission::Accepted)
            }
            Value::Record(record) => match self.nested_schema() {
                Some(expected) if expected.name == record.schema().name => Ok(Admission::Accepted),
                Some(expected) => Err(Details::NestedSchema {
                    schema: schema.to_string(),
                    field: self.name.clone(),
                    expected: expected.name.clone(),
                    found: record.schema().name.clone(),
                }
                .into()),
                None => Err(type_error().into()),
            },
            _ => Err(type_error().into()),
        }
    }

    fn admit_list(&self, schema: &str, items: &[Value]) -> crate::DcResult<()> {
        for item in items {
            if !item.is_scalar() {
                return Err(self.element_error(schema, ElementType::String, item.kind()));
            }
            let Some(element) = self.element else {
                continue;
            };
            let ok = matches!(
                (element, item),
                (ElementType::Boolean, Value::Boolean(_))
                    | (ElementType::Int, Value::Int(_))
                    | (ElementType::Float, Value::Float(_) | Value::Int(_))
                    | (ElementType::String, Value::String(_))
            );
            if !ok {
                return Err(self.element_error(schema, element, item.kind()));
            }
        }
        Ok(())
    }

    fn admit_array(&self, schema: &str, array: &Array) -> crate::DcResult<()> {
        let Some(element) = self.element else {
            return Ok(());
        };
        let dtype = array.dtype();
        let ok = match element {
            ElementType::Boolean => dtype == DType::Bool,
            ElementType::Int => dtype.is_integer(),
            ElementType::Float => dtype.is_float() || dtype.is_integer(),
            ElementType::String => false,
        };
        if ok {
            Ok(())
        } else {
            Err(crate::error::Details::ElementType {
                schema: schema.to_string(),
                field: self.name.clone(),
                expected: element,
                found: dtype.to_string(),
            }
            .into())
        }
    }

    fn element_error(&self, schema: &str, expected: ElementType, found: ValueKind) -> crate::Error {
        let expected = self.element.unwrap_or(expected);
        crate::error::Details::ElementType {
            schema: schema.to_string(),
            field: self.name.clone(),
            expected,
            found: found.to_string(),
        }
        .into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{Details, ErrorKind};
    use pretty_assertions::assert_eq;

    type TestResult = anyhow::Result<()>;

    #[test]
    fn integers_are_coerced_to_float_only_fields() -> TestResult {
        let field = FieldSchema::builder()
            .name("exptime")
            .types(vec![FieldType::Float])
            .build();
        match field.admit("Test", &Value::Int(30))? {
            Admission::Coerced(v) => assert_eq!(v, Value::Float(30.0)),
            Admission::Accepted => panic!("expected a coercion"),
        }
        Ok(())
    }

    #[test]
    fn integers_stay_integers_when_allowed() -> TestResult {
        let field = FieldSchema::builder()
            .name("binning")
            .types(vec![FieldType::Int, FieldType::Float])
            .build();
        assert!(matches!(field.admit("Test", &Value::Int(2))?, Admission::Accepted));
        Ok(())
    }

    #[test]
    fn floats_are_not_coerced_to_integers() {
        let field = FieldSchema::builder()
            .name("det")
            .types(vec![FieldType::Int])
            .build();
        let err = field.admit("Test", &Value::Float(1.0)).err();
        assert!(matches!(
            err.as_ref().map(|e| e.details()),
            Some(Details::FieldType {
                found: ValueKind::Float,
                ..
            })
        ));
    }

    #[test]
    fn list_elements_are_checked() {
        let field = FieldSchema::builder()
            .name("platescale")
            .types(vec![FieldType::List])
            .element(ElementType::Float)
            .build();
        assert!(field.admit("Test", &Value::from(vec![1.0, 2.0])).is_ok());
        assert!(field.admit("Test", &Value::from(vec![1, 2])).is_ok());
        let err = field.admit("Test", &Value::from(vec!["a"])).err();
        assert_eq!(err.map(|e| e.kind()), Some(ErrorKind::SchemaViolation));
    }

    #[test]
    fn array_dtypes_are_checked() -> TestResult {
        let field = FieldSchema::builder()
            .name("bpmmask")
            .types(vec![FieldType::Array])
            .element(ElementType::Int)
            .build();
        assert!(field.admit("Test", &Value::Array(Array::from_i16(vec![1], &[3])?)).is_ok());
        let err = field
            .admit("Test", &Value::Array(Array::from_f32(vec![1], &[3.0])?))
            .err();
        assert!(matches!(
            err.as_ref().map(|e| e.details()),
            Some(Details::ElementType {
                expected: ElementType::Int,
                ..
            })
        ));
        Ok(())
    }
}
