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
    collections::HashMap,
    time::{Duration, Instant},
};

use crate::tensor::TensorId;

/// Records since when each cached tensor has been continuously undemanded.
///
/// A tensor has an entry iff it was seen in the cache but not in the live set, and has neither reappeared in the
/// live set nor left the cache since.
#[derive(Debug, Default)]
pub struct KeepAliveRegistry {
    since: HashMap<TensorId, Instant>,
}

impl KeepAliveRegistry {
    /// Start tracking `tensor` as unused since `now`.
    ///
    /// Returns `true` if the tensor was not tracked before. The timestamp of a tracked tensor is never moved.
    pub fn track(&mut self, tensor: &TensorId, now: Instant) -> bool {
        if self.since.contains_key(tensor) {
            return false;
        }
        self.since.insert(tensor.clone(), now);
        true
    }

    /// Stop tracking `tensor`, returning since when it was unused.
    pub fn forget(&mut self, tensor: &TensorId) -> Option<Instant> {
        self.since.remove(tensor)
    }

    /// Keep only the entries for which `f` returns `true`.
    pub fn retain(&mut self, mut f: impl FnMut(&TensorId, Instant) -> bool) {
        self.since.retain(|tensor, since| f(tensor, *since));
    }

    /// Since when `tensor` has been unused.
    pub fn since(&self, tensor: &TensorId) -> Option<Instant> {
        self.since.get(tensor).copied()
    }

    /// How long `tensor` has been unused at `now`.
    pub fn unused_for(&self, tensor: &TensorId, now: Instant) -> Option<Duration> {
        self.since(tensor).map(|since| now.saturating_duration_since(since))
    }

    /// Whether `tensor` is tracked.
    pub fn contains(&self, tensor: &TensorId) -> bool {
        self.since.contains_key(tensor)
    }

    /// Iterate over the tracked tensors.
    pub fn iter(&self) -> impl Iterator<Item = (&TensorId, Instant)> {
        self.since.iter().map(|(tensor, since)| (tensor, *since))
    }

    /// Count of tracked tensors.
    pub fn len(&self) -> usize {
        self.since.len()
    }

    /// Whether no tensor is tracked.
    pub fn is_empty(&self) -> bool {
        self.since.is_empty()
    }
}
