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
    collections::{BTreeMap, HashSet},
    fs,
    path::Path,
};

use crate::{
    error::{Error, Result},
    tensor::{ModelId, TensorId},
};

/// A model installed on this node and the tensors it depends on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Model {
    id: ModelId,
    tensors: HashSet<TensorId>,
}

impl Model {
    /// Create a model from its identity and tensor dependencies.
    pub fn new<T>(id: impl Into<ModelId>, tensors: impl IntoIterator<Item = T>) -> Self
    where
        T: Into<TensorId>,
    {
        Self {
            id: id.into(),
            tensors: tensors.into_iter().map(Into::into).collect(),
        }
    }

    /// Parse a manifest: a whitespace-delimited list of tensor ids.
    pub fn from_manifest(id: impl Into<ModelId>, manifest: &str) -> Self {
        Self::new(id, manifest.split_whitespace())
    }

    /// Model identity.
    pub fn id(&self) -> &ModelId {
        &self.id
    }

    /// Tensors the model depends on.
    pub fn tensors(&self) -> &HashSet<TensorId> {
        &self.tensors
    }
}

/// Catalog of the models installed on this node.
///
/// The registry is loaded once at startup and never mutated afterwards. Installing or removing a model requires a
/// restart.
#[derive(Debug, Default, Clone)]
pub struct ModelRegistry {
    models: BTreeMap<ModelId, Model>,
}

impl ModelRegistry {
    /// Load one manifest per entry of `root`.
    ///
    /// The entry name is the model identity. Directories and hidden entries are skipped. Any read failure is
    /// returned as [`Error::ModelRegistry`] and is meant to abort startup.
    pub fn load(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref();
        let entries = fs::read_dir(root).map_err(|e| Error::model_registry(root, e))?;

        let mut models = vec![];
        for entry in entries {
            let entry = entry.map_err(|e| Error::model_registry(root, e))?;
            let path = entry.path();

            let Some(name) = entry.file_name().to_str().map(str::to_string) else {
                tracing::warn!("[registry] skip manifest with non utf-8 name: {path:?}");
                continue;
            };
            if name.starts_with('.') {
                continue;
            }
            // Follow symlinks, mounted manifests are usually links into a data directory.
            let metadata = fs::metadata(&path).map_err(|e| Error::model_registry(&path, e))?;
            if !metadata.is_file() {
                continue;
            }

            let manifest = fs::read_to_string(&path).map_err(|e| Error::model_registry(&path, e))?;
            let model = Model::from_manifest(name, &manifest);
            tracing::debug!(
                "[registry] load model {}, tensors: {}",
                model.id(),
                model.tensors().len()
            );
            models.push(model);
        }

        let registry = Self::from_models(models);
        tracing::info!(
            "[registry] loaded {} models with {} distinct tensors from {root:?}",
            registry.len(),
            registry.tensors().len()
        );
        Ok(registry)
    }

    /// Build a registry from already parsed models.
    pub fn from_models(models: impl IntoIterator<Item = Model>) -> Self {
        let models = models.into_iter().map(|model| (model.id.clone(), model)).collect();
        Self { models }
    }

    /// Iterate over the installed models in identity order.
    pub fn models(&self) -> impl Iterator<Item = &Model> {
        self.models.values()
    }

    /// Look up a model by identity.
    pub fn get(&self, id: &str) -> Option<&Model> {
        self.models.get(id)
    }

    /// Union of the tensors of every installed model.
    pub fn tensors(&self) -> HashSet<&TensorId> {
        self.models.values().flat_map(|model| model.tensors.iter()).collect()
    }

    /// Count of installed models.
    pub fn len(&self) -> usize {
        self.models.len()
    }

    /// Whether no model is installed.
    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }
}
