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

use std::{io, path::PathBuf};

/// Reclaimer error.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// The model root or one of its manifests cannot be read.
    #[error("failed to load model registry from {path}: {source}")]
    ModelRegistry {
        /// Path that failed.
        path: PathBuf,
        /// Underlying I/O error.
        source: io::Error,
    },
    /// The node identity source cannot be read.
    #[error("failed to read node identity from {path}: {source}")]
    NodeIdentity {
        /// Path that failed.
        path: PathBuf,
        /// Underlying I/O error.
        source: io::Error,
    },
    /// The node identity source is empty.
    #[error("node identity is empty")]
    EmptyNodeIdentity,
    /// Invalid configuration.
    #[error("config error: {0}")]
    Config(String),
    /// The workload resolver failed to list workloads.
    #[error("workload resolver error: {0}")]
    Resolver(anyhow::Error),
    /// Other error.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl Error {
    /// Build a model registry error for `path`.
    pub fn model_registry(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::ModelRegistry {
            path: path.into(),
            source,
        }
    }

    /// Build a workload resolver error.
    pub fn resolver(e: impl Into<anyhow::Error>) -> Self {
        Self::Resolver(e.into())
    }

    /// Build a config error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Build an error from any other error.
    pub fn other(e: impl Into<anyhow::Error>) -> Self {
        Self::Other(e.into())
    }
}

/// Reclaimer result.
pub type Result<T> = core::result::Result<T, Error>;
