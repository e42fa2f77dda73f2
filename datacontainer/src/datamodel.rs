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

//! Typed wrappers over [`Record`]s.
//!
//! Concrete data models (detectors, slit traces, spectra) keep their values in a [`Record`] and
//! implement [`DataContainer`] to gain bundling, reconstruction and file I/O.

use crate::{
    DcResult,
    block::{Block, Header},
    bundle::bundle,
    container::ContainerFile,
    error::Details,
    reconstruct::reconstruct,
    record::Record,
    schema::Schema,
};
use std::path::Path;

/// A typed view of a [`Record`] of a fixed schema.
pub trait DataContainer: Sized {
    /// The schema every instance follows.
    fn schema() -> &'static Schema;

    /// Wrap a record already known to follow [`schema`](Self::schema).
    fn wrap(record: Record) -> Self;

    fn record(&self) -> &Record;

    fn record_mut(&mut self) -> &mut Record;

    fn into_record(self) -> Record;

    /// Prefix of the names of the blocks this instance is bundled into.
    fn block_prefix(&self) -> String {
        String::new()
    }

    /// Wrap a record, checking that it follows the expected schema.
    fn from_record(record: Record) -> DcResult<Self> {
        let expected = Self::schema();
        if record.schema().name != expected.name {
            return Err(Details::WrongSchema {
                expected: expected.name.clone(),
                found: record.schema().name.clone(),
            }
            .into());
        }
        Ok(Self::wrap(record))
    }

    fn bundle(&self) -> DcResult<Vec<Block>> {
        bundle(self.record(), &self.block_prefix())
    }

    fn from_blocks(blocks: &[Block], prefix: &str) -> DcResult<Self> {
        Self::from_record(reconstruct(Self::schema(), blocks, prefix)?)
    }

    /// Write this instance alone to a container file.
    fn to_file(&self, path: impl AsRef<Path>, overwrite: bool) -> DcResult<()> {
        ContainerFile::new(Header::new(), self.bundle()?)?.write(path, overwrite)
    }

    /// Read an instance bundled with `prefix` from a container file.
    fn read_from(path: impl AsRef<Path>, prefix: &str) -> DcResult<Self> {
        let file = ContainerFile::open(path)?;
        Self::from_blocks(file.blocks(), prefix)
    }
}

/// Implement [`DataContainer`] for a newtype over [`Record`] whose schema is a static.
macro_rules! impl_data_container {
    ($ty:ident, $schema:expr $(, block_prefix($this:ident) $prefix:block)?) => {
        impl $crate::datamodel::DataContainer for $ty {
            fn schema() -> &'static $crate::schema::Schema {
                &$schema
            }

            fn wrap(record: $crate::record::Record) -> Self {
                $ty { record }
            }

            fn record(&self) -> &$crate::record::Record {
                &self.record
            }

            fn record_mut(&mut self) -> &mut $crate::record::Record {
                &mut self.record
            }

            fn into_record(self) -> $crate::record::Record {
                self.record
            }

            $(
                fn block_prefix(&self) -> String {
                    let $this = self;
                    $prefix
                }
            )?
        }
    };
}

pub(crate) use impl_data_container;
