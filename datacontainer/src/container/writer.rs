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

//! Writing container files to disk.

use super::{ContainerFile, encode::encode_container};
use crate::{Codec, DcResult, error::Details};
use log::{debug, info};
use std::{
    fs::{self, File},
    io::Write,
    path::{Path, PathBuf},
};

/// Writes [`ContainerFile`]s.
///
/// The whole file is encoded in memory first. It is then written to a hidden temporary sibling of
/// the target, synced, renamed over the target and the directory is synced, so the target either
/// keeps its old content or holds the complete new one. A crash in the middle may leave the
/// temporary file behind.
#[derive(bon::Builder, Clone, Debug)]
pub struct FileWriter {
    /// Compression applied to every payload.
    #[builder(default)]
    codec: Codec,
    /// Replace an existing file instead of failing with [`Details::AlreadyExists`].
    #[builder(default = false)]
    overwrite: bool,
    /// Sync marker closing every block.
    #[builder(default = generate_sync_marker())]
    marker: [u8; 16],
}

impl Default for FileWriter {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl FileWriter {
    /// Encode `file` into `writer`, returning the number of bytes written.
    pub fn write_to<W: Write>(&self, file: &ContainerFile, writer: &mut W) -> DcResult<usize> {
        let n = encode_container(file, self.codec, &self.marker, writer)?;
        writer.flush().map_err(Details::FlushWriter)?;
        Ok(n)
    }

    /// Atomically write `file` to `path`.
    pub fn write(&self, file: &ContainerFile, path: impl AsRef<Path>) -> DcResult<()> {
        let path = path.as_ref();
        if path.exists() && !self.overwrite {
            return Err(Details::AlreadyExists(path.to_path_buf()).into());
        }

        let mut buffer = Vec::new();
        self.write_to(file, &mut buffer)?;

        let temp = temp_path(path);
        debug!("Writing {} bytes to {}", buffer.len(), temp.display());
        if let Err(e) = write_synced(&temp, &buffer).and_then(|()| fs::rename(&temp, path)) {
            // The target is untouched.
            let _ = fs::remove_file(&temp);
            return Err(Details::WriteFile {
                path: path.to_path_buf(),
                source: e,
            }
            .into());
        }
        sync_dir(path).map_err(|source| Details::WriteFile {
            path: path.to_path_buf(),
            source,
        })?;

        info!(
            "Wrote {} blocks to {} ({} bytes)",
            file.blocks().len(),
            path.display(),
            buffer.len()
        );
        Ok(())
    }
}

fn parent_dir(path: &Path) -> &Path {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    }
}

fn temp_path(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    parent_dir(path).join(format!(".{name}.tmp"))
}

fn write_synced(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let mut file = File::create(path)?;
    file.write_all(bytes)?;
    file.sync_all()
}

#[cfg(unix)]
fn sync_dir(path: &Path) -> std::io::Result<()> {
    File::open(parent_dir(path))?.sync_all()
}

#[cfg(not(unix))]
fn sync_dir(_path: &Path) -> std::io::Result<()> {
    Ok(())
}

fn generate_sync_marker() -> [u8; 16] {
    rand::random()
}
