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

//! `tensor-gc` reclaims tensors from a node-local shared-memory cache once no running model replica needs them.
//!
//! Every cycle the [`Reclaimer`] asks a [`WorkloadResolver`] which serving workloads run on the node, derives the
//! live tensors from the [`ModelRegistry`], lists the cache with the [`CacheInspector`], lets the [`Reconciler`]
//! pick the tensors that stayed unused for a full grace period, and deletes them with the [`SafeEvictor`] while
//! holding their advisory lock.

mod asyncify;

mod error;
mod evictor;
mod inspector;
mod keepalive;
mod live;
mod lock;
mod node;
mod picker;
mod reclaimer;
mod reconciler;
mod registry;
mod resolver;
mod tensor;

pub use crate::{
    error::{Error, Result},
    evictor::{EvictError, Eviction, SafeEvictor},
    inspector::{CacheInspector, CacheSnapshot, CachedTensor},
    keepalive::KeepAliveRegistry,
    live::{LiveSetCalculator, SubstringMatcher, WorkloadMatcher},
    lock::TensorLock,
    node::read_node_identity,
    picker::{EvictionPicker, GracePeriodPicker, MemoryPressurePicker, PickContext},
    reclaimer::{CycleReport, Reclaimer, ReclaimerBuilder},
    reconciler::{Reconciler, Reconciliation},
    registry::{Model, ModelRegistry},
    resolver::{FileResolver, StaticResolver, WorkloadResolver},
    tensor::{ModelId, TensorId},
};
