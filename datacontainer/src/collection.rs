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

//! Keyed collections of data containers sharing one container file.
//!
//! A [`KeyedCollection`] maps positive integer keys (detector numbers) to members of one
//! [`CollectionMember`] type, plus a [`Meta`] section of scalar metadata. The whole collection is
//! written to one container file:
//!
//! * the primary header holds the meta entries as `"{META_PREFIX}{KEY}"`, an `EXTnnnn` entry naming
//!   every block in order, and the membership entry `"{META_PREFIX}DETS"` listing the keys;
//! * the blocks of every member follow in ascending key order, prefixed with
//!   [`CollectionMember::key_prefix`].

use crate::{
    Codec, DcResult, Error,
    block::Header,
    bundle::bundle,
    container::{ContainerFile, FileWriter},
    datamodel::DataContainer,
    error::{Details, ErrorKind},
    types::{HeaderValue, ValueKind},
};
use log::{debug, warn};
use std::{collections::BTreeMap, fmt, path::Path};

/// A [`DataContainer`] that can be stored in a [`KeyedCollection`].
pub trait CollectionMember: DataContainer {
    /// Prefix of the primary header keys holding collection metadata.
    const META_PREFIX: &'static str;

    /// Name used when displaying a collection.
    const COLLECTION_NAME: &'static str;

    /// Prefix of the block names of the member stored under `key`.
    fn key_prefix(key: u32) -> String {
        format!("DET{key:02}-")
    }
}

/// Suffix of the membership entry of the primary header.
const MEMBERSHIP: &str = "DETS";

/// Scalar metadata shared by a collection.
///
/// Keys are stored upper case. The primary header of the file a collection was loaded from is
/// kept separately as `head0`; it is never written back.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Meta {
    entries: Header,
    head0: Option<Header>,
}

impl Meta {
    /// Insert a scalar entry. Lists cannot be stored as metadata.
    pub fn insert(&mut self, key: &str, value: impl Into<HeaderValue>) -> DcResult<()> {
        let value = value.into();
        if !value.is_scalar() {
            return Err(Details::MetaValue {
                key: key.to_string(),
                kind: ValueKind::List,
            }
            .into());
        }
        self.entries.insert(key.to_uppercase(), value);
        Ok(())
    }

    pub fn get(&self, key: &str) -> Option<&HeaderValue> {
        self.entries.get(&key.to_uppercase())
    }

    pub fn remove(&mut self, key: &str) -> Option<HeaderValue> {
        self.entries.remove(&key.to_uppercase())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &HeaderValue)> {
        self.entries.iter()
    }

    /// The primary header of the file the collection was loaded from.
    pub fn head0(&self) -> Option<&Header> {
        self.head0.as_ref()
    }

    pub fn set_head0(&mut self, header: Header) {
        self.head0 = Some(header);
    }
}

/// Options of [`KeyedCollection::write`].
#[derive(bon::Builder, Clone, Debug, Default)]
pub struct WriteOptions {
    /// Replace an existing file.
    #[builder(default)]
    pub overwrite: bool,
    /// Only these members are taken from the collection; every other member is copied from the
    /// existing file.
    pub update_keys: Option<Vec<u32>>,
    /// Base primary header, usually from `build_primary_header`.
    pub primary_header: Option<Header>,
    #[builder(default)]
    pub codec: Codec,
}

/// Members of one type keyed by positive integers, plus shared metadata.
#[derive(Clone, Debug)]
pub struct KeyedCollection<T> {
    members: BTreeMap<u32, T>,
    meta: Meta,
}

impl<T> Default for KeyedCollection<T> {
    fn default() -> Self {
        KeyedCollection {
            members: BTreeMap::new(),
            meta: Meta::default(),
        }
    }
}

impl<T: CollectionMember> KeyedCollection<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `member` under `key`, returning the member it replaces.
    pub fn insert(&mut self, key: u32, member: T) -> DcResult<Option<T>> {
        if key == 0 {
            return Err(Details::InvalidKey(key).into());
        }
        Ok(self.members.insert(key, member))
    }

    pub fn get(&self, key: u32) -> DcResult<&T> {
        self.members
            .get(&key)
            .ok_or_else(|| Details::MissingKey(key).into())
    }

    pub fn get_mut(&mut self, key: u32) -> DcResult<&mut T> {
        self.members
            .get_mut(&key)
            .ok_or_else(|| Details::MissingKey(key).into())
    }

    pub fn contains(&self, key: u32) -> bool {
        self.members.contains_key(&key)
    }

    pub fn remove(&mut self, key: u32) -> Option<T> {
        self.members.remove(&key)
    }

    /// Member keys in ascending order.
    pub fn members(&self) -> Vec<u32> {
        self.members.keys().copied().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (u32, &T)> {
        self.members.iter().map(|(k, v)| (*k, v))
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn meta(&self) -> &Meta {
        &self.meta
    }

    pub fn meta_mut(&mut self) -> &mut Meta {
        &mut self.meta
    }

    fn membership_key() -> String {
        format!("{}{MEMBERSHIP}", T::META_PREFIX)
    }

    /// Load a collection from the container file at `path`.
    pub fn load(path: impl AsRef<Path>) -> DcResult<Self> {
        Self::from_container(&ContainerFile::open(path)?)
    }

    /// Rebuild a collection from a decoded container file.
    pub fn from_container(file: &ContainerFile) -> DcResult<Self> {
        let primary = file.primary();
        let membership_key = Self::membership_key();

        let mut collection = Self::new();
        for (key, value) in primary.iter() {
            if key == membership_key {
                continue;
            }
            if let Some(meta_key) = key.strip_prefix(T::META_PREFIX) {
                collection.meta.entries.insert(meta_key, value.clone());
            }
        }

        let membership = primary
            .get(&membership_key)
            .ok_or_else(|| Details::MissingMembership(membership_key.clone()))?;
        for key in parse_membership(membership)? {
            let prefix = T::key_prefix(key);
            let primary_block = format!("{prefix}{}", T::schema().block_name());
            if file.block(&primary_block).is_none() {
                return Err(Details::MissingMember(key).into());
            }
            // Version and schema errors keep their kind; structural gaps become load errors.
            let member = T::from_blocks(file.blocks(), &prefix).map_err(|source| {
                if source.kind() == ErrorKind::Format {
                    Details::IncompleteMember { key, source }.into()
                } else {
                    source
                }
            })?;
            collection.members.insert(key, member);
        }
        collection.meta.head0 = Some(primary.clone());

        debug!(
            "Loaded {} members {:?}",
            T::COLLECTION_NAME,
            collection.members()
        );
        Ok(collection)
    }

    /// Assemble the container file holding this collection.
    pub fn to_container(&self, primary_header: Option<&Header>) -> DcResult<ContainerFile> {
        let membership_key = Self::membership_key();
        let mut primary = primary_header.cloned().unwrap_or_default();

        for (key, value) in self.meta.iter() {
            let header_key = format!("{}{key}", T::META_PREFIX);
            if header_key == membership_key {
                warn!("Ignoring meta entry {key}, it is reserved for the membership list");
                continue;
            }
            primary.insert(header_key, value.clone());
        }

        let mut blocks = Vec::new();
        for (key, member) in &self.members {
            blocks.extend(bundle(member.record(), &T::key_prefix(*key))?);
        }
        for (i, block) in blocks.iter().enumerate() {
            primary.insert(format!("EXT{:04}", i + 1), block.name.as_str());
        }

        let membership = self
            .members
            .keys()
            .map(|k| k.to_string())
            .collect::<Vec<_>>()
            .join(",");
        primary.insert(membership_key, membership);

        ContainerFile::new(primary, blocks)
    }

    /// Write the collection to `path`.
    ///
    /// An existing file is only replaced with [`WriteOptions::overwrite`]. With
    /// [`WriteOptions::update_keys`] the existing file is loaded first and every member whose key is
    /// not listed is taken from it, so only the listed members change on disk. The file is replaced
    /// atomically once the complete content is assembled.
    pub fn write(&mut self, path: impl AsRef<Path>, options: &WriteOptions) -> DcResult<()> {
        let path = path.as_ref();
        if path.exists() {
            if !options.overwrite {
                return Err(Details::AlreadyExists(path.to_path_buf()).into());
            }
            if let Some(update_keys) = &options.update_keys {
                let existing = Self::load(path)?;
                for (key, member) in existing.members {
                    if !update_keys.contains(&key) {
                        debug!("Keeping member {key} of {}", path.display());
                        self.members.insert(key, member);
                    }
                }
            }
        }

        let file = self.to_container(options.primary_header.as_ref())?;
        FileWriter::builder()
            .codec(options.codec)
            .overwrite(options.overwrite)
            .build()
            .write(&file, path)
    }
}

fn parse_membership(value: &HeaderValue) -> DcResult<Vec<u32>> {
    let malformed = || Details::MalformedMembership(value.to_string());
    match value {
        HeaderValue::Int(key) => match u32::try_from(*key) {
            Ok(key) if key > 0 => Ok(vec![key]),
            _ => Err(malformed().into()),
        },
        HeaderValue::String(list) if list.trim().is_empty() => Ok(Vec::new()),
        HeaderValue::String(list) => list
            .split(',')
            .map(|item| match item.trim().parse::<u32>() {
                Ok(key) if key > 0 => Ok(key),
                _ => Err(Error::from(malformed())),
            })
            .collect(),
        _ => Err(malformed().into()),
    }
}

impl<T: CollectionMember> fmt::Display for KeyedCollection<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<{}: dets=(", T::COLLECTION_NAME)?;
        for key in self.members.keys() {
            write!(f, "{key},")?;
        }
        write!(f, ") >")
    }
}
