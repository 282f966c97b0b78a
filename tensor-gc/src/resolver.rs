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

use std::{collections::HashSet, fmt::Debug, path::PathBuf, sync::Arc};

use futures_core::future::BoxFuture;
use futures_util::FutureExt;
use parking_lot::RwLock;

use crate::error::{Error, Result};

/// Lists the serving workloads currently scheduled on a node.
pub trait WorkloadResolver: Send + Sync + 'static + Debug {
    /// Identifiers of the workloads scheduled on `node`.
    ///
    /// An error must never be reported as an empty set, the reclaimer skips the cycle instead.
    fn list_current_workloads(&self, node: &str) -> BoxFuture<'static, Result<HashSet<String>>>;
}

/// A resolver returning a fixed set of workloads, replaceable at runtime.
///
/// Clones share the same set.
#[derive(Debug, Clone, Default)]
pub struct StaticResolver {
    workloads: Arc<RwLock<HashSet<String>>>,
}

impl StaticResolver {
    /// Create a resolver returning `workloads`.
    pub fn new<S>(workloads: impl IntoIterator<Item = S>) -> Self
    where
        S: Into<String>,
    {
        let resolver = Self::default();
        resolver.set(workloads);
        resolver
    }

    /// Replace the returned workloads.
    pub fn set<S>(&self, workloads: impl IntoIterator<Item = S>)
    where
        S: Into<String>,
    {
        *self.workloads.write() = workloads.into_iter().map(Into::into).collect();
    }
}

impl WorkloadResolver for StaticResolver {
    fn list_current_workloads(&self, _: &str) -> BoxFuture<'static, Result<HashSet<String>>> {
        let workloads = self.workloads.read().clone();
        async move { Ok(workloads) }.boxed()
    }
}

/// A resolver reading a whitespace-delimited list of workloads from a file on every call.
///
/// The file describes this node only, so the node identity is not used.
#[derive(Debug, Clone)]
pub struct FileResolver {
    path: PathBuf,
}

impl FileResolver {
    /// Create a resolver reading `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl WorkloadResolver for FileResolver {
    fn list_current_workloads(&self, _: &str) -> BoxFuture<'static, Result<HashSet<String>>> {
        let path = self.path.clone();
        async move {
            let content = tokio::fs::read_to_string(&path)
                .await
                .map_err(|e| Error::resolver(anyhow::anyhow!("fail to read workloads from {path:?}: {e}")))?;
            Ok(content.split_whitespace().map(String::from).collect())
        }
        .boxed()
    }
}
