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

//! End-to-end reclamation cycles over real cache and lock directories.

use std::{
    collections::HashSet,
    fs,
    path::{Path, PathBuf},
    sync::Arc,
    time::{Duration, Instant},
};

use futures_core::future::BoxFuture;
use futures_util::FutureExt;
use tensor_gc::{
    CycleReport, Error, Model, ModelRegistry, Reclaimer, ReclaimerBuilder, StaticResolver, TensorId, WorkloadResolver,
};

const GRACE: Duration = Duration::from_secs(60);

struct Node {
    _root: tempfile::TempDir,
    models: PathBuf,
    cache: PathBuf,
    locks: PathBuf,
}

impl Node {
    /// Models `m1: {a, b}` and `m2: {b, c}`, tensors `a, b, c, d` cached and published with lock files.
    fn new() -> Self {
        let root = tempfile::tempdir().unwrap();
        let node = Self {
            models: root.path().join("models"),
            cache: root.path().join("cache"),
            locks: root.path().join("locks"),
            _root: root,
        };
        fs::create_dir(&node.models).unwrap();
        fs::create_dir(&node.cache).unwrap();
        fs::create_dir(&node.locks).unwrap();

        fs::write(node.models.join("m1"), "a b\n").unwrap();
        fs::write(node.models.join("m2"), "b c\n").unwrap();
        for tensor in ["a", "b", "c", "d"] {
            node.publish(tensor);
        }
        node
    }

    fn publish(&self, tensor: &str) {
        fs::write(self.cache.join(tensor), tensor.as_bytes()).unwrap();
        fs::write(self.locks.join(tensor), b"").unwrap();
    }

    fn builder(&self, resolver: Arc<dyn WorkloadResolver>) -> ReclaimerBuilder {
        ReclaimerBuilder::new("worker-1", resolver)
            .with_model_root(&self.models)
            .with_cache_dir(&self.cache)
            .with_lock_dir(&self.locks)
            .with_grace_period(GRACE)
            .with_lock_timeout(Some(Duration::from_millis(200)))
            .with_lock_poll_interval(Duration::from_millis(10))
    }

    fn cached(&self) -> HashSet<String> {
        list(&self.cache)
    }
}

fn list(dir: &Path) -> HashSet<String> {
    fs::read_dir(dir)
        .unwrap()
        .map(|entry| entry.unwrap().file_name().into_string().unwrap())
        .collect()
}

fn names(names: &[&str]) -> HashSet<String> {
    names.iter().map(|name| name.to_string()).collect()
}

fn ids(ids: &[&str]) -> Vec<TensorId> {
    ids.iter().copied().map(TensorId::from).collect()
}

fn tracked(reclaimer: &Reclaimer) -> HashSet<String> {
    reclaimer
        .reconciler()
        .keep_alive()
        .iter()
        .map(|(tensor, _)| tensor.to_string())
        .collect()
}

#[test_log::test(tokio::test)]
async fn test_unused_tensors_evicted_after_grace_period() {
    let node = Node::new();
    let resolver = StaticResolver::new(["pod-m1-xyz"]);
    let mut reclaimer = node.builder(Arc::new(resolver)).build().unwrap();
    assert_eq!(reclaimer.registry().len(), 2);

    let t0 = Instant::now();
    let report = reclaimer.run_cycle_at(t0).await;
    assert_eq!(report.live, 2);
    assert_eq!(report.cached, 4);
    assert!(report.evicted.is_empty());
    assert_eq!(tracked(&reclaimer), names(&["c", "d"]));

    let report = reclaimer.run_cycle_at(t0 + Duration::from_secs(30)).await;
    assert!(report.evicted.is_empty());
    assert_eq!(node.cached(), names(&["a", "b", "c", "d"]));

    let report = reclaimer.run_cycle_at(t0 + Duration::from_secs(65)).await;
    assert_eq!(report.evicted, ids(&["c", "d"]));
    assert_eq!(node.cached(), names(&["a", "b"]));
    assert!(tracked(&reclaimer).is_empty());
    // Lock files are owned by the serving runtimes.
    assert_eq!(list(&node.locks), names(&["a", "b", "c", "d"]));
}

#[test_log::test(tokio::test)]
async fn test_demand_resets_grace_period() {
    let node = Node::new();
    let resolver = StaticResolver::new(["pod-m1-xyz"]);
    let mut reclaimer = node.builder(Arc::new(resolver.clone())).build().unwrap();

    let t0 = Instant::now();
    reclaimer.run_cycle_at(t0).await;

    resolver.set(["pod-m1-xyz", "pod-m2-xyz"]);
    let report = reclaimer.run_cycle_at(t0 + Duration::from_secs(30)).await;
    assert_eq!(report.live, 3);
    assert_eq!(tracked(&reclaimer), names(&["d"]));

    resolver.set(["pod-m1-xyz"]);
    let report = reclaimer.run_cycle_at(t0 + Duration::from_secs(40)).await;
    assert!(report.evicted.is_empty());
    assert_eq!(tracked(&reclaimer), names(&["c", "d"]));

    let report = reclaimer.run_cycle_at(t0 + Duration::from_secs(65)).await;
    assert_eq!(report.evicted, ids(&["d"]));
    assert_eq!(node.cached(), names(&["a", "b", "c"]));

    let report = reclaimer.run_cycle_at(t0 + Duration::from_secs(100)).await;
    assert_eq!(report.evicted, ids(&["c"]));
    assert_eq!(node.cached(), names(&["a", "b"]));
}

#[test_log::test(tokio::test)]
async fn test_missing_lock_file_is_retried() {
    let node = Node::new();
    fs::remove_file(node.locks.join("d")).unwrap();

    let mut reclaimer = node
        .builder(Arc::new(StaticResolver::new(["pod-m1-xyz"])))
        .build()
        .unwrap();

    let t0 = Instant::now();
    reclaimer.run_cycle_at(t0).await;
    let report = reclaimer.run_cycle_at(t0 + Duration::from_secs(65)).await;
    assert_eq!(report.evicted, ids(&["c"]));
    assert_eq!(report.skipped, ids(&["d"]));
    assert_eq!(tracked(&reclaimer), names(&["d"]));
    assert!(node.cached().contains("d"));

    // Still skipped however long it stays unused.
    let report = reclaimer.run_cycle_at(t0 + Duration::from_secs(3600)).await;
    assert_eq!(report.skipped, ids(&["d"]));
    assert!(node.cached().contains("d"));

    // Once published, the next cycle evicts it.
    fs::write(node.locks.join("d"), b"").unwrap();
    let report = reclaimer.run_cycle_at(t0 + Duration::from_secs(3605)).await;
    assert_eq!(report.evicted, ids(&["d"]));
    assert!(tracked(&reclaimer).is_empty());
}

#[test_log::test(tokio::test)]
async fn test_live_tensors_survive() {
    let node = Node::new();
    let mut reclaimer = node
        .builder(Arc::new(StaticResolver::new(["pod-m1-xyz", "pod-m2-xyz"])))
        .build()
        .unwrap();

    let t0 = Instant::now();
    for k in 0..20u32 {
        let report = reclaimer.run_cycle_at(t0 + GRACE * k).await;
        for tensor in ["a", "b", "c"] {
            assert!(!report.evicted.contains(&TensorId::from(tensor)));
        }
    }
    assert_eq!(node.cached(), names(&["a", "b", "c"]));
}

#[derive(Debug)]
struct UnreachableResolver;

impl WorkloadResolver for UnreachableResolver {
    fn list_current_workloads(&self, _: &str) -> BoxFuture<'static, tensor_gc::Result<HashSet<String>>> {
        async move { Err(Error::resolver(unreachable_error())) }.boxed()
    }
}

fn unreachable_error() -> std::io::Error {
    std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "orchestrator unreachable")
}

#[test_log::test(tokio::test)]
async fn test_resolver_failure_skips_cycle() {
    let node = Node::new();
    let mut reclaimer = node.builder(Arc::new(UnreachableResolver)).build().unwrap();

    let t0 = Instant::now();
    for k in 0..5u32 {
        let report = reclaimer.run_cycle_at(t0 + GRACE * k).await;
        assert_eq!(
            report,
            CycleReport {
                resolver_failed: true,
                ..Default::default()
            }
        );
    }
    assert!(tracked(&reclaimer).is_empty());
    assert_eq!(node.cached(), names(&["a", "b", "c", "d"]));
}

#[test_log::test(tokio::test)]
async fn test_cache_dir_missing_is_empty_cycle() {
    let node = Node::new();
    let mut reclaimer = node
        .builder(Arc::new(StaticResolver::new(["pod-m1-xyz"])))
        .build()
        .unwrap();

    let t0 = Instant::now();
    reclaimer.run_cycle_at(t0).await;
    assert_eq!(tracked(&reclaimer), names(&["c", "d"]));

    let moved = node.cache.with_extension("moved");
    fs::rename(&node.cache, &moved).unwrap();
    let report = reclaimer.run_cycle_at(t0 + Duration::from_secs(5)).await;
    assert_eq!(report.cached, 0);
    assert!(tracked(&reclaimer).is_empty());

    // Back again: a fresh grace period starts.
    fs::rename(&moved, &node.cache).unwrap();
    let report = reclaimer.run_cycle_at(t0 + Duration::from_secs(65)).await;
    assert!(report.evicted.is_empty());
    assert_eq!(tracked(&reclaimer), names(&["c", "d"]));
}

#[cfg(target_os = "linux")]
#[test_log::test(tokio::test)]
async fn test_reader_lock_delays_eviction() {
    let node = Node::new();
    let mut reclaimer = node
        .builder(Arc::new(StaticResolver::new(["pod-m1-xyz"])))
        .build()
        .unwrap();

    let reader = tensor_gc::TensorLock::try_acquire(&node.locks.join("c")).unwrap().unwrap();

    let t0 = Instant::now();
    reclaimer.run_cycle_at(t0).await;
    let report = reclaimer.run_cycle_at(t0 + Duration::from_secs(65)).await;
    assert_eq!(report.evicted, ids(&["d"]));
    assert_eq!(report.failed, ids(&["c"]));
    assert_eq!(tracked(&reclaimer), names(&["c"]));
    assert!(node.cached().contains("c"));

    drop(reader);
    let report = reclaimer.run_cycle_at(t0 + Duration::from_secs(70)).await;
    assert_eq!(report.evicted, ids(&["c"]));
    assert_eq!(node.cached(), names(&["a", "b"]));
}

#[test_log::test(tokio::test)]
async fn test_memory_bound_policy() {
    let node = Node::new();
    // `d` is the largest stale tensor.
    fs::write(node.cache.join("d"), vec![0u8; 4096]).unwrap();

    let mut reclaimer = node
        .builder(Arc::new(StaticResolver::new(["pod-m1-xyz"])))
        .with_memory_bound(1024)
        .build()
        .unwrap();

    let report = reclaimer.run_cycle_at(Instant::now()).await;
    assert!(report.evicted.contains(&TensorId::from("d")));
    assert!(node.cached().contains("a"));
    assert!(node.cached().contains("b"));
}

#[test_log::test]
fn test_build_errors() {
    let node = Node::new();
    let resolver: Arc<dyn WorkloadResolver> = Arc::new(StaticResolver::default());

    let res = node.builder(resolver.clone()).with_cycle_period(Duration::ZERO).build();
    assert!(matches!(res, Err(Error::Config(_))));

    let res = node
        .builder(resolver.clone())
        .with_model_root(node.models.join("absent"))
        .build();
    assert!(matches!(res, Err(Error::ModelRegistry { .. })));

    let registry = ModelRegistry::from_models([Model::new("m3", ["z"])]);
    let reclaimer = node
        .builder(resolver)
        .with_model_root(node.models.join("absent"))
        .with_registry(registry)
        .build()
        .unwrap();
    assert_eq!(reclaimer.node(), "worker-1");
    assert!(reclaimer.registry().get("m3").is_some());
}

#[test_log::test(tokio::test)]
async fn test_run_until_shutdown() {
    let node = Node::new();
    let reclaimer = node
        .builder(Arc::new(StaticResolver::new(["pod-m1-xyz"])))
        .with_cycle_period(Duration::from_millis(20))
        .with_grace_period(Duration::from_millis(50))
        .build()
        .unwrap();

    let (tx, rx) = tokio::sync::oneshot::channel::<()>();
    let handle = tokio::spawn(reclaimer.run(async move {
        let _ = rx.await;
    }));

    let deadline = Instant::now() + Duration::from_secs(10);
    while node.cached() != names(&["a", "b"]) {
        assert!(Instant::now() < deadline, "tensors not reclaimed: {:?}", node.cached());
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    tx.send(()).unwrap();
    handle.await.unwrap();
}
