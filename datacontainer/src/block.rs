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

//! Named, header-bearing blocks: the unit a record is bundled into.

use crate::types::{Array, HeaderValue};
use strum_macros::Display;

/// Ordered key/value metadata attached to a block or to a whole container file.
///
/// Keys are unique; inserting an existing key replaces its value in place.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Header {
    entries: Vec<(String, HeaderValue)>,
}

impl Header {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace `key`, returning the previous value.
    pub fn insert(
        &mut self,
        key: impl Into<String>,
        value: impl Into<HeaderValue>,
    ) -> Option<HeaderValue> {
        let key = key.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some((_, slot)) => Some(std::mem::replace(slot, value)),
            None => {
                self.entries.push((key, value));
                None
            }
        }
    }

    pub fn get(&self, key: &str) -> Option<&HeaderValue> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    pub fn remove(&mut self, key: &str) -> Option<HeaderValue> {
        let position = self.entries.iter().position(|(k, _)| k == key)?;
        Some(self.entries.remove(position).1)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &HeaderValue)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<K: Into<String>, V: Into<HeaderValue>> FromIterator<(K, V)> for Header {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        let mut header = Header::new();
        for (k, v) in iter {
            header.insert(k, v);
        }
        header
    }
}

impl<K: Into<String>, V: Into<HeaderValue>> Extend<(K, V)> for Header {
    fn extend<T: IntoIterator<Item = (K, V)>>(&mut self, iter: T) {
        for (k, v) in iter {
            self.insert(k, v);
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Display)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum BlockKind {
    DataArray,
    HeaderOnly,
}

/// One column of a table payload.
#[derive(Clone, Debug, PartialEq)]
pub struct Column {
    pub name: String,
    pub data: ColumnData,
}

#[derive(Clone, Debug, PartialEq)]
pub enum ColumnData {
    Array(Array),
    /// Names the primary block of a nested record stored alongside the table.
    RecordRef(String),
}

#[derive(Clone, Debug, PartialEq)]
pub enum Payload {
    Image(Array),
    Table(Vec<Column>),
}

impl Payload {
    /// Find a table column by name.
    pub fn column(&self, name: &str) -> Option<&ColumnData> {
        match self {
            Payload::Table(columns) => columns.iter().find(|c| c.name == name).map(|c| &c.data),
            Payload::Image(_) => None,
        }
    }
}

/// A named unit of a container file.
#[derive(Clone, Debug, PartialEq)]
pub struct Block {
    pub name: String,
    pub header: Header,
    pub payload: Option<Payload>,
}

impl Block {
    pub fn header_only(name: impl Into<String>, header: Header) -> Self {
        Block {
            name: name.into(),
            header,
            payload: None,
        }
    }

    pub fn image(name: impl Into<String>, header: Header, array: Array) -> Self {
        Block {
            name: name.into(),
            header,
            payload: Some(Payload::Image(array)),
        }
    }

    pub fn kind(&self) -> BlockKind {
        if self.payload.is_some() {
            BlockKind::DataArray
        } else {
            BlockKind::HeaderOnly
        }
    }

    pub fn image_data(&self) -> Option<&Array> {
        match &self.payload {
            Some(Payload::Image(array)) => Some(array),
            _ => None,
        }
    }
}
