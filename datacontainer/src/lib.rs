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

//! A schema-driven serialization framework for structured scientific records.
//!
//! A [`Schema`] declares the fields of a record type: their names, allowed types, element types of
//! arrays, and whether they are required. A [`Record`] is an instance checked against its schema on
//! construction and on every [`Record::validate`].
//!
//! Records are stored as named blocks. [`bundle`](bundle::bundle) flattens a record into a primary
//! block carrying its scalars as header entries plus one block per array and nested record;
//! [`reconstruct`](reconstruct::reconstruct) reverses it, refusing data written by a different
//! schema version when fields are missing. Blocks are written to a [`ContainerFile`], a single
//! binary file with a primary header and per-block checksums.
//!
//! A [`KeyedCollection`] holds several records of one type under positive integer keys (detector
//! numbers, for instance) in one file, and supports rewriting only some of its members.
//!
//! ```no_run
//! use datacontainer::{AllSpec2DObj, DcResult, collection::WriteOptions};
//!
//! fn refresh(path: &str) -> DcResult<()> {
//!     let mut all = AllSpec2DObj::load(path)?;
//!     all.meta_mut().insert("bkg_redux", false)?;
//!     all.write(path, &WriteOptions::builder().overwrite(true).build())
//! }
//! ```
//!
//! # Features
//!
//! - `snappy`: enable support for the Snappy codec
//! - `zstandard`: enable support for the Zstandard codec

pub mod bitmask;
pub mod block;
pub mod bundle;
mod codec;
pub mod collection;
pub mod container;
pub mod datamodel;
pub mod error;
pub mod models;
pub mod reconstruct;
pub mod record;
pub mod schema;
pub mod types;
pub mod util;
pub mod validator;

pub use crate::{
    codec::{Codec, DeflateSettings},
    collection::{CollectionMember, KeyedCollection},
    container::{ContainerFile, FileWriter},
    datamodel::DataContainer,
    error::Error,
    models::{AllSpec2DObj, Detector, SlitTraceSet, Spec2DObj, SpecObj},
    record::Record,
    schema::Schema,
    types::{Array, DType, HeaderValue, Value},
};
#[cfg(feature = "zstandard")]
pub use codec::zstandard::ZstandardSettings;

/// A convenience type alias for `Result`s with `Error`s.
pub type DcResult<T> = Result<T, Error>;
