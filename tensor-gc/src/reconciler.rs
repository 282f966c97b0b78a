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
    collections::{BTreeSet, HashSet},
    time::{Duration, Instant},
};

use crate::{
    inspector::CacheSnapshot,
    keepalive::KeepAliveRegistry,
    picker::{EvictionPicker, GracePeriodPicker, PickContext},
    tensor::TensorId,
};

/// Outcome of one reconciliation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Reconciliation {
    /// Cached tensors that no running model demands.
    pub stale: BTreeSet<TensorId>,
    /// Stale tensors first observed unused in this cycle.
    pub fresh: BTreeSet<TensorId>,
    /// Tracked tensors that are demanded again.
    pub revived: usize,
    /// Tracked tensors that left the cache by other means.
    pub pruned: usize,
    /// Tensors to hand to the evictor, in id order.
    pub evictable: Vec<TensorId>,
}

/// The reconciler compares the cache against the live set and decides what to evict.
///
/// It owns the keep-alive bookkeeping and performs no I/O.
#[derive(Debug)]
pub struct Reconciler {
    keep_alive: KeepAliveRegistry,
    picker: Box<dyn EvictionPicker>,
}

impl Default for Reconciler {
    fn default() -> Self {
        Self::new(GracePeriodPicker::default())
    }
}

impl Reconciler {
    /// Create a reconciler with the given eviction picker.
    pub fn new(picker: impl EvictionPicker) -> Self {
        Self::from_boxed(Box::new(picker))
    }

    pub(crate) fn from_boxed(picker: Box<dyn EvictionPicker>) -> Self {
        Self {
            keep_alive: KeepAliveRegistry::default(),
            picker,
        }
    }

    /// Create a reconciler evicting tensors unused for at least `grace`.
    pub fn with_grace_period(grace: Duration) -> Self {
        Self::new(GracePeriodPicker::new(grace))
    }

    /// The keep-alive bookkeeping.
    pub fn keep_alive(&self) -> &KeepAliveRegistry {
        &self.keep_alive
    }

    /// Run one reconciliation step at `now`.
    pub fn reconcile(&mut self, cached: &CacheSnapshot, live: &HashSet<TensorId>, now: Instant) -> Reconciliation {
        let stale: BTreeSet<TensorId> = cached.ids().filter(|tensor| !live.contains(*tensor)).cloned().collect();

        let fresh: BTreeSet<TensorId> = stale
            .iter()
            .filter(|tensor| self.keep_alive.track(tensor, now))
            .cloned()
            .collect();
        for tensor in fresh.iter() {
            tracing::trace!("[reconciler] tensor {tensor} becomes unused");
        }

        // Demand resets the grace timer, and entries of tensors gone from disk carry no information.
        let mut revived = 0;
        let mut pruned = 0;
        self.keep_alive.retain(|tensor, _| {
            if stale.contains(tensor) {
                return true;
            }
            if cached.contains(tensor) {
                tracing::trace!("[reconciler] tensor {tensor} is demanded again");
                revived += 1;
            } else {
                tracing::trace!("[reconciler] tensor {tensor} left the cache");
                pruned += 1;
            }
            false
        });

        let picked = self.picker.pick(&PickContext {
            stale: &stale,
            fresh: &fresh,
            cached,
            keep_alive: &self.keep_alive,
            now,
        });
        let evictable = picked.into_iter().filter(|tensor| stale.contains(tensor)).collect();

        Reconciliation {
            stale,
            fresh,
            revived,
            pruned,
            evictable,
        }
    }

    /// Notify the reconciler that `tensor` no longer exists in the cache.
    pub fn on_evicted(&mut self, tensor: &TensorId) {
        self.keep_alive.forget(tensor);
    }
}
