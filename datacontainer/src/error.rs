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

//! Errors raised while declaring schemas, validating records, bundling them into blocks and
//! moving blocks to and from container files.

use crate::{schema::ElementType, types::ValueKind};
use std::path::PathBuf;
use strum_macros::Display;

/// Errors encountered by the data container framework.
///
/// To inspect the details of the error use [`details`](Self::details) or
/// [`into_details`](Self::into_details). Use [`kind`](Self::kind) to classify it.
#[derive(thiserror::Error, Debug)]
#[repr(transparent)]
#[error(transparent)]
pub struct Error {
    details: Box<Details>,
}

impl Error {
    pub fn new(details: Details) -> Self {
        Self {
            details: Box::new(details),
        }
    }

    pub fn details(&self) -> &Details {
        &self.details
    }

    pub fn into_details(self) -> Details {
        *self.details
    }

    /// The class of failure, see [`ErrorKind`].
    pub fn kind(&self) -> ErrorKind {
        self.details.kind()
    }
}

impl From<Details> for Error {
    fn from(details: Details) -> Self {
        Self::new(details)
    }
}

/// Broad classification of an [`Error`].
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Display)]
pub enum ErrorKind {
    /// A schema declaration is itself invalid.
    SchemaDefinition,
    /// A record does not satisfy its schema.
    SchemaViolation,
    /// Stored data was written with another schema version and lacks a field the current
    /// version requires.
    VersionMismatch,
    /// Stored data is malformed or incomplete.
    Format,
    /// A keyed collection could not be loaded from a container file.
    Load,
    /// The output file exists and overwriting was not allowed.
    AlreadyExists,
    /// A key is invalid or absent.
    Key,
    /// The underlying storage failed.
    Io,
}

#[derive(thiserror::Error, Debug)]
pub enum Details {
    #[error("Invalid field name {0}. It must match the regex '{1}'")]
    FieldName(String, &'static str),

    #[error("Invalid block name {0:?}. It must match the regex '{1}'")]
    BlockName(String, &'static str),

    #[error("Invalid header key {0:?}. It must match the regex '{1}'")]
    HeaderKey(String, &'static str),

    #[error("Field {field} is declared twice in schema {schema}")]
    DuplicateField { schema: String, field: String },

    #[error("Field {field} of schema {schema} uses a reserved header key")]
    ReservedFieldName { schema: String, field: String },

    #[error("Field {field} of schema {schema} has the same name as the schema's block")]
    FieldShadowsSchema { schema: String, field: String },

    #[error("Field {field} of schema {schema} does not declare any allowed type")]
    NoAllowedTypes { schema: String, field: String },

    #[error("Field {field} of schema {schema} declares an element type but is neither an array nor a list")]
    ElementTypeWithoutContainer { schema: String, field: String },

    #[error("Schema {schema} has no field named {field}")]
    UnknownField { schema: String, field: String },

    #[error("Required field {field} of schema {schema} is missing")]
    MissingRequiredField { schema: String, field: String },

    #[error("Required field {field} of schema {schema} cannot be unset")]
    UnsetRequired { schema: String, field: String },

    #[error("Field {field} of schema {schema} expects one of [{expected}], got a {found} value")]
    FieldType {
        schema: String,
        field: String,
        expected: String,
        found: ValueKind,
    },

    #[error("Elements of field {field} of schema {schema} must be {expected}, got {found}")]
    ElementType {
        schema: String,
        field: String,
        expected: ElementType,
        found: String,
    },

    #[error("Field {field} of schema {schema} expects a nested {expected} record, got {found}")]
    NestedSchema {
        schema: String,
        field: String,
        expected: String,
        found: String,
    },

    #[error(
        "Field {field} of schema {schema} holds {stored:?} which differs from the current canonical value {current:?}"
    )]
    CanonicalMismatch {
        schema: String,
        field: String,
        stored: String,
        current: String,
    },

    #[error("Validation of a {schema} record failed: {reason}")]
    ValidationHook { schema: String, reason: String },

    #[error("Expected a {expected} record, got a {found} record")]
    WrongSchema { expected: String, found: String },

    #[error("Failed to serialize schema: {0}")]
    SerializeSchema(#[source] serde_json::Error),

    #[error("Metadata entry {key} must be a boolean, integer, float or string, got a {kind} value")]
    MetaValue { key: String, kind: ValueKind },

    #[error(
        "Field {field} of schema {schema} (version {expected}) is missing from data written with version {found}"
    )]
    VersionMismatch {
        schema: String,
        expected: String,
        found: String,
        field: String,
    },

    #[error("No block named {0}")]
    MissingBlock(String),

    #[error("Required field {field} of schema {schema} was not found for block {block}")]
    MissingField {
        schema: String,
        field: String,
        block: String,
    },

    #[error("Header of block {block} lacks the {key} key")]
    MissingHeaderKey { block: String, key: String },

    #[error("Header key {key} of block {block} must hold a {expected}")]
    HeaderType {
        block: String,
        key: String,
        expected: &'static str,
    },

    #[error("Block {block} holds a {found} record, expected {expected}")]
    RecordClass {
        block: String,
        expected: String,
        found: String,
    },

    #[error("Block {block} cannot be bound to field {field}")]
    BlockPayload { block: String, field: String },

    #[error("A value of kind {0} cannot be stored in a header")]
    NotInHeader(ValueKind),

    #[error("Two blocks are named {0}")]
    NameCollision(String),

    #[error("Wrong magic in container file header")]
    HeaderMagic,

    #[error("Container file ended unexpectedly")]
    Truncated(#[source] std::io::Error),

    #[error("Invalid {what} tag: {tag}")]
    InvalidTag { what: &'static str, tag: u8 },

    #[error("Unknown array dtype: {0}")]
    DType(String),

    #[error("Array of dtype {dtype} with shape {shape:?} needs {expected} bytes, got {found}")]
    ArrayLength {
        dtype: String,
        shape: Vec<usize>,
        expected: usize,
        found: usize,
    },

    #[error("Array of dtype {dtype} with shape {shape:?} is too large to address")]
    ArraySize { dtype: String, shape: Vec<usize> },

    #[error("Header lists are nested deeper than {0} levels")]
    HeaderNesting(usize),

    #[error("Bad CRC32 for block {block}; expected {expected:x} but got {actual:x}")]
    Checksum {
        block: String,
        expected: u32,
        actual: u32,
    },

    #[error("Block sync marker does not match the file marker")]
    GetBlockMarker,

    #[error("Codec '{0}' is not supported/enabled")]
    CodecNotSupported(String),

    #[error("Invalid utf-8 string")]
    ConvertToUtf8(#[source] std::string::FromUtf8Error),

    #[error("Unable to allocate {desired} bytes (maximum allowed: {maximum})")]
    MemoryAllocation { desired: usize, maximum: usize },

    #[error("Invalid length: {0}")]
    InvalidLength(i64),

    #[error("Variable length integer overflowed")]
    IntegerOverflow,

    #[error("Failed to decompress with deflate: {0}")]
    DeflateDecompress(#[source] std::io::Error),

    #[cfg(feature = "snappy")]
    #[error("Failed to compress with snappy: {0}")]
    SnappyCompress(#[source] snap::Error),

    #[cfg(feature = "snappy")]
    #[error("Failed to get snappy decompression length: {0}")]
    GetSnappyDecompressLen(#[source] snap::Error),

    #[cfg(feature = "snappy")]
    #[error("Failed to decompress with snappy: {0}")]
    SnappyDecompress(#[source] snap::Error),

    #[cfg(feature = "snappy")]
    #[error("Bad Snappy CRC32; expected {expected:x} but got {actual:x}")]
    SnappyCrc32 { expected: u32, actual: u32 },

    #[cfg(feature = "zstandard")]
    #[error("Failed to compress with zstd: {0}")]
    ZstdCompress(#[source] std::io::Error),

    #[cfg(feature = "zstandard")]
    #[error("Failed to decompress with zstd: {0}")]
    ZstdDecompress(#[source] std::io::Error),

    #[error("Malformed membership entry: {0:?}")]
    MalformedMembership(String),

    #[error("Primary header lacks the membership entry {0}")]
    MissingMembership(String),

    #[error("Blocks of member {0} are missing")]
    MissingMember(u32),

    #[error("Member {key} is incomplete: {source}")]
    IncompleteMember {
        key: u32,
        #[source]
        source: Error,
    },

    #[error("File {0} exists and overwriting is disabled")]
    AlreadyExists(PathBuf),

    #[error("No member under key {0}")]
    MissingKey(u32),

    #[error("Member keys must be positive integers, got {0}")]
    InvalidKey(u32),

    #[error("Unknown flag {flag} for bit mask {mask}")]
    UnknownFlag { mask: &'static str, flag: String },

    #[error("Requested detector {det} is not in {path}")]
    DetectorNotInFile { det: u32, path: PathBuf },

    #[error("Failed to read {path}: {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write {path}: {source}")]
    WriteFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to read bytes: {0}")]
    ReadBytes(#[source] std::io::Error),

    #[error("Failed to write bytes: {0}")]
    WriteBytes(#[source] std::io::Error),

    #[error("Failed to flush writer: {0}")]
    FlushWriter(#[source] std::io::Error),
}

impl Details {
    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Details::FieldName(..)
            | Details::BlockName(..)
            | Details::DuplicateField { .. }
            | Details::ReservedFieldName { .. }
            | Details::FieldShadowsSchema { .. }
            | Details::NoAllowedTypes { .. }
            | Details::ElementTypeWithoutContainer { .. } => ErrorKind::SchemaDefinition,
            Details::UnknownField { .. }
            | Details::MissingRequiredField { .. }
            | Details::UnsetRequired { .. }
            | Details::FieldType { .. }
            | Details::ElementType { .. }
            | Details::NestedSchema { .. }
            | Details::CanonicalMismatch { .. }
            | Details::ValidationHook { .. }
            | Details::WrongSchema { .. }
            | Details::MetaValue { .. } => ErrorKind::SchemaViolation,
            Details::VersionMismatch { .. } => ErrorKind::VersionMismatch,
            Details::MissingMembership(_)
            | Details::MissingMember(_)
            | Details::IncompleteMember { .. } => ErrorKind::Load,
            Details::AlreadyExists(_) => ErrorKind::AlreadyExists,
            Details::MissingKey(_)
            | Details::InvalidKey(_)
            | Details::UnknownFlag { .. }
            | Details::DetectorNotInFile { .. } => ErrorKind::Key,
            Details::ReadFile { .. }
            | Details::WriteFile { .. }
            | Details::ReadBytes(_)
            | Details::WriteBytes(_)
            | Details::FlushWriter(_) => ErrorKind::Io,
            _ => ErrorKind::Format,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn kinds_follow_details() {
        let err: Error = Details::MissingKey(4).into();
        assert_eq!(err.kind(), ErrorKind::Key);
        assert_eq!(err.to_string(), "No member under key 4");

        let err: Error = Details::VersionMismatch {
            schema: "Spec2DObj".into(),
            expected: "1.1.0".into(),
            found: "1.0.0".into(),
            field: "tilts".into(),
        }
        .into();
        assert_eq!(err.kind(), ErrorKind::VersionMismatch);

        let err: Error = Details::NameCollision("DET01-SCIIMG".into()).into();
        assert_eq!(err.kind(), ErrorKind::Format);

        let err: Error = Details::MissingMembership("ALLSPEC2D_DETS".into()).into();
        assert_eq!(err.kind(), ErrorKind::Load);
    }

    #[test]
    fn details_round_trip_through_error() {
        let err = Error::new(Details::AlreadyExists(PathBuf::from("spec2d.dcf")));
        assert_eq!(err.kind(), ErrorKind::AlreadyExists);
        assert!(matches!(err.into_details(), Details::AlreadyExists(path) if path == PathBuf::from("spec2d.dcf")));
    }

    #[test]
    fn path_messages_name_the_file() {
        let err: Error = Details::AlreadyExists(PathBuf::from("out/spec2d.dcf")).into();
        assert_eq!(
            err.to_string(),
            "File out/spec2d.dcf exists and overwriting is disabled"
        );

        let err: Error = Details::DetectorNotInFile {
            det: 3,
            path: PathBuf::from("spec1d.dcf"),
        }
        .into();
        assert!(err.to_string().contains("spec1d.dcf"));
    }

    #[test]
    fn incomplete_members_keep_their_cause() {
        use std::error::Error as _;

        let cause: Error = Details::MissingBlock("DET02-SCIIMG".into()).into();
        let err: Error = Details::IncompleteMember { key: 2, source: cause }.into();
        assert_eq!(err.kind(), ErrorKind::Load);
        assert!(err.to_string().starts_with("Member 2 is incomplete"));
        assert!(err.source().is_some());
    }
}
