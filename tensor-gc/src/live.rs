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

use std::{collections::HashSet, fmt::Debug};

use crate::{
    registry::{Model, ModelRegistry},
    tensor::{ModelId, TensorId},
};

/// Decides whether a workload runs a model.
pub trait WorkloadMatcher: Send + Sync + 'static + Debug {
    /// Whether `workload` is a replica of `model`.
    fn is_running(&self, model: &ModelId, workload: &str) -> bool;
}

/// A workload runs a model if the model identity is a substring of the workload identifier.
///
/// The rule is crude: model `resnet` also matches workloads of model `resnet50`. Such false positives only keep
/// tensors alive longer than needed and never cause a live tensor to be removed.
#[derive(Debug, Default, Clone, Copy)]
pub struct SubstringMatcher;

impl WorkloadMatcher for SubstringMatcher {
    fn is_running(&self, model: &ModelId, workload: &str) -> bool {
        workload.contains(model.as_str())
    }
}

/// Computes the set of tensors demanded by the models running on this node.
#[derive(Debug)]
pub struct LiveSetCalculator {
    matcher: Box<dyn WorkloadMatcher>,
}

impl Default for LiveSetCalculator {
    fn default() -> Self {
        Self::new(SubstringMatcher)
    }
}

impl LiveSetCalculator {
    /// Create a calculator with the given matching rule.
    pub fn new(matcher: impl WorkloadMatcher) -> Self {
        Self::from_boxed(Box::new(matcher))
    }

    pub(crate) fn from_boxed(matcher: Box<dyn WorkloadMatcher>) -> Self {
        Self { matcher }
    }

    /// Models with at least one running workload.
    pub fn running_models<'a>(
        &'a self,
        registry: &'a ModelRegistry,
        workloads: &'a HashSet<String>,
    ) -> impl Iterator<Item = &'a Model> + 'a {
        registry.models().filter(move |model| {
            workloads
                .iter()
                .any(|workload| self.matcher.is_running(model.id(), workload))
        })
    }

    /// Union of the tensors of every running model.
    pub fn compute(&self, registry: &ModelRegistry, workloads: &HashSet<String>) -> HashSet<TensorId> {
        self.running_models(registry, workloads)
            .flat_map(|model| model.tensors().iter().cloned())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(ids: &[&str]) -> HashSet<TensorId> {
        ids.iter().copied().map(TensorId::from).collect()
    }

    fn workloads(names: &[&str]) -> HashSet<String> {
        names.iter().map(|name| name.to_string()).collect()
    }

    fn registry() -> ModelRegistry {
        ModelRegistry::from_models([Model::new("m1", ["a", "b"]), Model::new("m2", ["b", "c"])])
    }

    #[test]
    fn test_single_running_model() {
        let calculator = LiveSetCalculator::default();
        let live = calculator.compute(&registry(), &workloads(&["pod-m1-xyz"]));
        assert_eq!(live, ids(&["a", "b"]));
    }

    #[test]
    fn test_union_of_running_models() {
        let calculator = LiveSetCalculator::default();
        let live = calculator.compute(&registry(), &workloads(&["pod-m1-xyz", "pod-m2-xyz"]));
        assert_eq!(live, ids(&["a", "b", "c"]));
    }

    #[test]
    fn test_no_workloads() {
        let calculator = LiveSetCalculator::default();
        assert!(calculator.compute(&registry(), &HashSet::new()).is_empty());
        assert!(calculator
            .compute(&registry(), &workloads(&["pod-unrelated"]))
            .is_empty());
    }

    #[test]
    fn test_substring_false_positive_is_kept() {
        let registry = ModelRegistry::from_models([
            Model::new("resnet", ["r"]),
            Model::new("resnet50", ["r50"]),
        ]);
        let calculator = LiveSetCalculator::default();
        let live = calculator.compute(&registry, &workloads(&["resnet50-7f9c"]));
        assert_eq!(live, ids(&["r", "r50"]));
    }

    #[test]
    fn test_custom_matcher() {
        #[derive(Debug)]
        struct PrefixMatcher;

        impl WorkloadMatcher for PrefixMatcher {
            fn is_running(&self, model: &ModelId, workload: &str) -> bool {
                workload.starts_with(model.as_str())
            }
        }

        let calculator = LiveSetCalculator::new(PrefixMatcher);
        let live = calculator.compute(&registry(), &workloads(&["pod-m1-xyz", "m2-abc"]));
        assert_eq!(live, ids(&["b", "c"]));
    }
}
