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

//! Logic handling the intermediate representation of record field values.

use crate::{DcResult, error::Details, record::Record};
use serde::{Deserialize, Serialize};
use std::fmt;
use strum_macros::{Display, EnumDiscriminants, EnumString, IntoStaticStr};

/// Element type of an [`Array`]. Data is always stored little-endian.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Display, EnumString, IntoStaticStr)]
#[strum(serialize_all = "lowercase")]
pub enum DType {
    Bool,
    U8,
    I16,
    I32,
    I64,
    F32,
    F64,
}

impl DType {
    /// Size in bytes of one element.
    pub fn size(self) -> usize {
        match self {
            DType::Bool | DType::U8 => 1,
            DType::I16 => 2,
            DType::I32 | DType::F32 => 4,
            DType::I64 | DType::F64 => 8,
        }
    }

    pub fn is_integer(self) -> bool {
        matches!(self, DType::U8 | DType::I16 | DType::I32 | DType::I64)
    }

    pub fn is_float(self) -> bool {
        matches!(self, DType::F32 | DType::F64)
    }
}

/// An n-dimensional array stored as raw little-endian bytes plus a shape.
#[derive(Clone, Debug, PartialEq)]
pub struct Array {
    dtype: DType,
    shape: Vec<usize>,
    data: Vec<u8>,
}

/// Bytes needed by `shape` elements of `dtype`, or an error if the count overflows `usize`.
fn byte_len(dtype: DType, shape: &[usize]) -> DcResult<usize> {
    shape
        .iter()
        .try_fold(dtype.size(), |acc, &dim| acc.checked_mul(dim))
        .ok_or_else(|| {
            Details::ArraySize {
                dtype: dtype.to_string(),
                shape: shape.to_vec(),
            }
            .into()
        })
}

macro_rules! array_from_slice {
    ($fn_name:ident, $t:ty, $dtype:expr) => {
        #[doc = concat!("Build an array from `", stringify!($t), "` values.")]
        pub fn $fn_name(shape: Vec<usize>, values: &[$t]) -> DcResult<Self> {
            let data = values.iter().flat_map(|v| v.to_le_bytes()).collect();
            Self::new($dtype, shape, data)
        }
    };
}

impl Array {
    /// Create an array from raw little-endian bytes, checking that the byte length matches the
    /// shape.
    pub fn new(dtype: DType, shape: Vec<usize>, data: Vec<u8>) -> DcResult<Self> {
        let expected = byte_len(dtype, &shape)?;
        if expected != data.len() {
            return Err(Details::ArrayLength {
                dtype: dtype.to_string(),
                shape,
                expected,
                found: data.len(),
            }
            .into());
        }
        Ok(Array { dtype, shape, data })
    }

    /// An array of the given shape filled with zeros.
    pub fn zeros(dtype: DType, shape: Vec<usize>) -> DcResult<Self> {
        let len = byte_len(dtype, &shape)?;
        Ok(Array {
            dtype,
            shape,
            data: vec![0; len],
        })
    }

    array_from_slice!(from_u8, u8, DType::U8);
    array_from_slice!(from_i16, i16, DType::I16);
    array_from_slice!(from_i32, i32, DType::I32);
    array_from_slice!(from_i64, i64, DType::I64);
    array_from_slice!(from_f32, f32, DType::F32);
    array_from_slice!(from_f64, f64, DType::F64);

    /// Build a boolean array; `true` is stored as `1`.
    pub fn from_bool(shape: Vec<usize>, values: &[bool]) -> DcResult<Self> {
        let data = values.iter().map(|&v| u8::from(v)).collect();
        Self::new(DType::Bool, shape, data)
    }

    pub fn dtype(&self) -> DType {
        self.dtype
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    /// Number of elements.
    pub fn len(&self) -> usize {
        self.shape.iter().product()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// The elements converted to `f64`, whatever the dtype.
    pub fn to_f64_vec(&self) -> Vec<f64> {
        let size = self.dtype.size();
        self.data
            .chunks_exact(size)
            .map(|c| match self.dtype {
                DType::Bool | DType::U8 => f64::from(c[0]),
                DType::I16 => f64::from(i16::from_le_bytes([c[0], c[1]])),
                DType::I32 => f64::from(i32::from_le_bytes([c[0], c[1], c[2], c[3]])),
                DType::I64 => i64::from_le_bytes(le8(c)) as f64,
                DType::F32 => f64::from(f32::from_le_bytes([c[0], c[1], c[2], c[3]])),
                DType::F64 => f64::from_le_bytes(le8(c)),
            })
            .collect()
    }

    /// The elements converted to `i64`, or `None` for floating point arrays.
    pub fn to_i64_vec(&self) -> Option<Vec<i64>> {
        if self.dtype.is_float() {
            return None;
        }
        let size = self.dtype.size();
        Some(
            self.data
                .chunks_exact(size)
                .map(|c| match self.dtype {
                    DType::I16 => i64::from(i16::from_le_bytes([c[0], c[1]])),
                    DType::I32 => i64::from(i32::from_le_bytes([c[0], c[1], c[2], c[3]])),
                    DType::I64 => i64::from_le_bytes(le8(c)),
                    _ => i64::from(c[0]),
                })
                .collect(),
        )
    }
}

fn le8(c: &[u8]) -> [u8; 8] {
    let mut buf = [0u8; 8];
    buf.copy_from_slice(&c[..8]);
    buf
}

/// The value of a record field.
#[derive(Clone, Debug, PartialEq, EnumDiscriminants)]
#[strum_discriminants(name(ValueKind), derive(Hash, Display))]
pub enum Value {
    Boolean(bool),
    Int(i64),
    Float(f64),
    String(String),
    /// A short list of scalars, stored in a header.
    List(Vec<Value>),
    /// An n-dimensional array, stored in its own block.
    Array(Array),
    /// A nested record, exclusively owned by the enclosing record.
    Record(Box<Record>),
}

impl Value {
    pub fn is_scalar(&self) -> bool {
        matches!(
            self,
            Value::Boolean(_) | Value::Int(_) | Value::Float(_) | Value::String(_)
        )
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Floats, and integers widened to floats.
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            Value::Int(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&Array> {
        match self {
            Value::Array(a) => Some(a),
            _ => None,
        }
    }

    pub fn as_record(&self) -> Option<&Record> {
        match self {
            Value::Record(r) => Some(r),
            _ => None,
        }
    }

    pub fn kind(&self) -> ValueKind {
        ValueKind::from(self)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Self::Boolean(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Self::Int(i64::from(value))
    }
}

impl From<u32> for Value {
    fn from(value: u32) -> Self {
        Self::Int(i64::from(value))
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<f32> for Value {
    fn from(value: f32) -> Self {
        Self::Float(f64::from(value))
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::String(value.to_owned())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<Array> for Value {
    fn from(value: Array) -> Self {
        Self::Array(value)
    }
}

impl From<Record> for Value {
    fn from(value: Record) -> Self {
        Self::Record(Box::new(value))
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(value: Vec<T>) -> Self {
        Self::List(value.into_iter().map(Into::into).collect())
    }
}

/// A value that can be stored in a block header.
///
/// Header values are scalars, plus short lists of scalars so that list fields can round-trip.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum HeaderValue {
    Boolean(bool),
    Int(i64),
    Float(f64),
    String(String),
    List(Vec<HeaderValue>),
}

impl HeaderValue {
    pub fn is_scalar(&self) -> bool {
        !matches!(self, HeaderValue::List(_))
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            HeaderValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            HeaderValue::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            HeaderValue::Boolean(b) => Some(*b),
            _ => None,
        }
    }
}

impl fmt::Display for HeaderValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HeaderValue::Boolean(b) => write!(f, "{}", if *b { "T" } else { "F" }),
            HeaderValue::Int(i) => write!(f, "{i}"),
            HeaderValue::Float(x) => write!(f, "{x:?}"),
            HeaderValue::String(s) => write!(f, "{s}"),
            HeaderValue::List(items) => {
                let items: Vec<String> = items.iter().map(|i| i.to_string()).collect();
                write!(f, "[{}]", items.join(", "))
            }
        }
    }
}

impl From<bool> for HeaderValue {
    fn from(value: bool) -> Self {
        Self::Boolean(value)
    }
}

impl From<i64> for HeaderValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<f64> for HeaderValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<&str> for HeaderValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_owned())
    }
}

impl From<String> for HeaderValue {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl TryFrom<&Value> for HeaderValue {
    type Error = crate::Error;

    fn try_from(value: &Value) -> DcResult<Self> {
        Ok(match value {
            Value::Boolean(b) => HeaderValue::Boolean(*b),
            Value::Int(i) => HeaderValue::Int(*i),
            Value::Float(x) => HeaderValue::Float(*x),
            Value::String(s) => HeaderValue::String(s.clone()),
            Value::List(items) => HeaderValue::List(
                items
                    .iter()
                    .map(HeaderValue::try_from)
                    .collect::<DcResult<_>>()?,
            ),
            other => return Err(Details::NotInHeader(other.kind()).into()),
        })
    }
}

impl From<&HeaderValue> for Value {
    fn from(value: &HeaderValue) -> Self {
        match value {
            HeaderValue::Boolean(b) => Value::Boolean(*b),
            HeaderValue::Int(i) => Value::Int(*i),
            HeaderValue::Float(x) => Value::Float(*x),
            HeaderValue::String(s) => Value::String(s.clone()),
            HeaderValue::List(items) => Value::List(items.iter().map(Value::from).collect()),
        }
    }
}
