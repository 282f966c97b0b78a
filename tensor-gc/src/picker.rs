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
    collections::BTreeSet,
    fmt::Debug,
    time::{Duration, Instant, SystemTime},
};

use itertools::Itertools;

use crate::{inspector::CacheSnapshot, keepalive::KeepAliveRegistry, tensor::TensorId};

/// Inputs of one eviction decision.
#[derive(Debug)]
pub struct PickContext<'a> {
    /// Cached tensors that no running model demands.
    pub stale: &'a BTreeSet<TensorId>,
    /// Stale tensors first observed unused in this cycle.
    pub fresh: &'a BTreeSet<TensorId>,
    /// The cache snapshot of this cycle.
    pub cached: &'a CacheSnapshot,
    /// Unused-since bookkeeping, already updated for this cycle.
    pub keep_alive: &'a KeepAliveRegistry,
    /// Time of this cycle.
    pub now: Instant,
}

/// The eviction picker chooses which stale tensors to evict in a cycle.
///
/// Whatever a picker returns, only stale tensors are ever handed to the evictor.
pub trait EvictionPicker: Send + Sync + 'static + Debug {
    /// Pick the tensors to evict now.
    fn pick(&mut self, ctx: &PickContext<'_>) -> BTreeSet<TensorId>;
}

/// Evict a tensor once it has been continuously unused for at least the grace period.
///
/// A tensor is never picked in the cycle it is first observed unused, even with a zero grace period.
#[derive(Debug, Clone)]
pub struct GracePeriodPicker {
    grace: Duration,
}

impl GracePeriodPicker {
    /// Default grace period.
    pub const DEFAULT_GRACE_PERIOD: Duration = Duration::from_secs(60);

    /// Create a picker with the given grace period.
    pub fn new(grace: Duration) -> Self {
        Self { grace }
    }

    /// The grace period.
    pub fn grace(&self) -> Duration {
        self.grace
    }
}

impl Default for GracePeriodPicker {
    fn default() -> Self {
        Self::new(Self::DEFAULT_GRACE_PERIOD)
    }
}

impl EvictionPicker for GracePeriodPicker {
    fn pick(&mut self, ctx: &PickContext<'_>) -> BTreeSet<TensorId> {
        ctx.stale
            .iter()
            .filter(|tensor| !ctx.fresh.contains(*tensor))
            .filter(|tensor| {
                ctx.keep_alive
                    .unused_for(tensor, ctx.now)
                    .is_some_and(|unused| unused >= self.grace)
            })
            .cloned()
            .collect()
    }
}

/// Evict the least recently accessed stale tensors while the cache exceeds a memory bound.
///
/// The grace period is ignored. Tensors without a known access time are considered the oldest.
#[derive(Debug, Clone)]
pub struct MemoryPressurePicker {
    bound: u64,
}

impl MemoryPressurePicker {
    /// Create a picker keeping the cache at or below `bound` bytes.
    pub fn new(bound: u64) -> Self {
        Self { bound }
    }

    /// The memory bound in bytes.
    pub fn bound(&self) -> u64 {
        self.bound
    }
}

impl EvictionPicker for MemoryPressurePicker {
    fn pick(&mut self, ctx: &PickContext<'_>) -> BTreeSet<TensorId> {
        let mut total = ctx.cached.total_size();
        if total <= self.bound {
            return BTreeSet::new();
        }

        let candidates = ctx
            .stale
            .iter()
            .filter_map(|tensor| ctx.cached.get(tensor).map(|entry| (tensor, entry)))
            .sorted_by_key(|(tensor, entry)| (entry.accessed.unwrap_or(SystemTime::UNIX_EPOCH), *tensor));

        let mut picked = BTreeSet::new();
        for (tensor, entry) in candidates {
            if total <= self.bound {
                break;
            }
            total = total.saturating_sub(entry.size);
            picked.insert(tensor.clone());
        }

        tracing::debug!(
            "[pressure picker] cache above bound {}, pick {} tensors, projected size: {total}",
            self.bound,
            picked.len()
        );
        picked
    }
}
