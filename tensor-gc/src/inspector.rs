// Copyright 2026 tensor-gc Project Authors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::{
    collections::{HashMap, HashSet},
    fs, io,
    path::{Path, PathBuf},
    time::SystemTime,
};

use crate::tensor::TensorId;

/// Metadata of one materialized tensor.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CachedTensor {
    /// Payload size in bytes, `0` if unknown.
    pub size: u64,
    /// Last access time, if the filesystem reports one.
    pub accessed: Option<SystemTime>,
}

/// View of the cache directory taken at the start of a cycle.
#[derive(Debug, Clone, Default)]
pub struct CacheSnapshot {
    entries: HashMap<TensorId, CachedTensor>,
}

impl CacheSnapshot {
    /// Build a snapshot from known entries.
    pub fn from_entries(entries: impl IntoIterator<Item = (TensorId, CachedTensor)>) -> Self {
        Self {
            entries: entries.into_iter().collect(),
        }
    }

    /// Build a snapshot of tensors with unknown metadata.
    pub fn from_ids<T>(ids: impl IntoIterator<Item = T>) -> Self
    where
        T: Into<TensorId>,
    {
        Self::from_entries(ids.into_iter().map(|id| (id.into(), CachedTensor::default())))
    }

    /// Whether the tensor is materialized.
    pub fn contains(&self, tensor: &TensorId) -> bool {
        self.entries.contains_key(tensor)
    }

    /// Metadata of a materialized tensor.
    pub fn get(&self, tensor: &TensorId) -> Option<&CachedTensor> {
        self.entries.get(tensor)
    }

    /// Iterate over the materialized tensor ids.
    pub fn ids(&self) -> impl Iterator<Item = &TensorId> {
        self.entries.keys()
    }

    /// Iterate over the materialized tensors with their metadata.
    pub fn iter(&self) -> impl Iterator<Item = (&TensorId, &CachedTensor)> {
        self.entries.iter()
    }

    /// Sum of the known payload sizes.
    pub fn total_size(&self) -> u64 {
        self.entries.values().map(|entry| entry.size).sum()
    }

    /// Count of materialized tensors.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing is materialized.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Lists the tensors materialized in the shared cache directory.
#[derive(Debug, Clone)]
pub struct CacheInspector {
    dir: PathBuf,
}

impl CacheInspector {
    /// Create an inspector over `dir`.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// The inspected cache directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Ids of the tensors currently materialized.
    pub fn list_cached(&self) -> HashSet<TensorId> {
        self.snapshot().entries.into_keys().collect()
    }

    /// Snapshot of the cache directory.
    ///
    /// A directory that cannot be read yields an empty snapshot. The directory may briefly vanish while a
    /// serving runtime restarts, and the next cycle sees it again.
    pub fn snapshot(&self) -> CacheSnapshot {
        match self.scan() {
            Ok(snapshot) => snapshot,
            Err(e) => {
                tracing::warn!("[inspector] cannot list cache directory {:?}: {e}", self.dir);
                CacheSnapshot::default()
            }
        }
    }

    fn scan(&self) -> io::Result<CacheSnapshot> {
        let mut entries = HashMap::new();
        for entry in fs::read_dir(&self.dir)? {
            let entry = entry?;
            let Ok(name) = entry.file_name().into_string() else {
                tracing::trace!("[inspector] skip entry with non utf-8 name: {:?}", entry.path());
                continue;
            };

            let tensor = match entry.metadata() {
                Ok(metadata) if metadata.is_dir() => continue,
                Ok(metadata) => CachedTensor {
                    size: metadata.len(),
                    accessed: metadata.accessed().ok(),
                },
                // Removed between listing and stat.
                Err(e) if e.kind() == io::ErrorKind::NotFound => continue,
                Err(e) => {
                    tracing::debug!("[inspector] no metadata for tensor {name}: {e}");
                    CachedTensor::default()
                }
            };
            entries.insert(TensorId::from(name), tensor);
        }
        Ok(CacheSnapshot { entries })
    }
}
