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
    future::Future,
    path::PathBuf,
    sync::Arc,
    time::{Duration, Instant},
};

use tokio::time::MissedTickBehavior;

use crate::{
    asyncify::asyncify,
    error::{Error, Result},
    evictor::{Eviction, SafeEvictor},
    inspector::{CacheInspector, CacheSnapshot},
    live::{LiveSetCalculator, WorkloadMatcher},
    picker::{EvictionPicker, GracePeriodPicker, MemoryPressurePicker},
    reconciler::Reconciler,
    registry::ModelRegistry,
    resolver::WorkloadResolver,
    tensor::TensorId,
};

/// Builder for [`Reclaimer`].
#[derive(Debug)]
pub struct ReclaimerBuilder {
    node: String,
    resolver: Arc<dyn WorkloadResolver>,
    model_root: PathBuf,
    registry: Option<ModelRegistry>,
    cache_dir: PathBuf,
    lock_dir: PathBuf,
    cycle_period: Duration,
    grace_period: Duration,
    lock_timeout: Option<Duration>,
    lock_poll_interval: Duration,
    matcher: Option<Box<dyn WorkloadMatcher>>,
    picker: Option<Box<dyn EvictionPicker>>,
}

impl ReclaimerBuilder {
    /// Default directory of model manifests.
    pub const DEFAULT_MODEL_ROOT: &'static str = "/models";
    /// Default shared cache directory.
    pub const DEFAULT_CACHE_DIR: &'static str = "/dev/shm/serving_memorys";
    /// Default lock directory.
    pub const DEFAULT_LOCK_DIR: &'static str = "/var/lib/serving_locks";
    /// Default period between two cycles.
    pub const DEFAULT_CYCLE_PERIOD: Duration = Duration::from_secs(5);

    /// Create a builder for the reclaimer of `node`, asking `resolver` for the running workloads.
    pub fn new(node: impl Into<String>, resolver: Arc<dyn WorkloadResolver>) -> Self {
        Self {
            node: node.into(),
            resolver,
            model_root: PathBuf::from(Self::DEFAULT_MODEL_ROOT),
            registry: None,
            cache_dir: PathBuf::from(Self::DEFAULT_CACHE_DIR),
            lock_dir: PathBuf::from(Self::DEFAULT_LOCK_DIR),
            cycle_period: Self::DEFAULT_CYCLE_PERIOD,
            grace_period: GracePeriodPicker::DEFAULT_GRACE_PERIOD,
            lock_timeout: Some(SafeEvictor::DEFAULT_LOCK_TIMEOUT),
            lock_poll_interval: SafeEvictor::DEFAULT_POLL_INTERVAL,
            matcher: None,
            picker: None,
        }
    }

    /// Set the directory of model manifests, loaded on build.
    pub fn with_model_root(mut self, model_root: impl Into<PathBuf>) -> Self {
        self.model_root = model_root.into();
        self
    }

    /// Use an already loaded model registry instead of loading the model root.
    pub fn with_registry(mut self, registry: ModelRegistry) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Set the shared cache directory.
    pub fn with_cache_dir(mut self, cache_dir: impl Into<PathBuf>) -> Self {
        self.cache_dir = cache_dir.into();
        self
    }

    /// Set the lock directory.
    pub fn with_lock_dir(mut self, lock_dir: impl Into<PathBuf>) -> Self {
        self.lock_dir = lock_dir.into();
        self
    }

    /// Set the period between two cycles.
    pub fn with_cycle_period(mut self, cycle_period: Duration) -> Self {
        self.cycle_period = cycle_period;
        self
    }

    /// Set the grace period of the default eviction picker.
    pub fn with_grace_period(mut self, grace_period: Duration) -> Self {
        self.grace_period = grace_period;
        self
    }

    /// Set how long eviction waits for a tensor lock. `None` waits indefinitely.
    pub fn with_lock_timeout(mut self, lock_timeout: Option<Duration>) -> Self {
        self.lock_timeout = lock_timeout;
        self
    }

    /// Set how often a contended tensor lock is retried.
    pub fn with_lock_poll_interval(mut self, lock_poll_interval: Duration) -> Self {
        self.lock_poll_interval = lock_poll_interval;
        self
    }

    /// Set the rule deciding whether a workload runs a model.
    pub fn with_matcher(mut self, matcher: impl WorkloadMatcher) -> Self {
        self.matcher = Some(Box::new(matcher));
        self
    }

    /// Replace the grace period policy with a custom eviction picker.
    pub fn with_eviction_picker(mut self, picker: impl EvictionPicker) -> Self {
        self.picker = Some(Box::new(picker));
        self
    }

    /// Replace the grace period policy with least-recently-accessed eviction above `bound` bytes.
    pub fn with_memory_bound(self, bound: u64) -> Self {
        self.with_eviction_picker(MemoryPressurePicker::new(bound))
    }

    /// Validate the configuration and load the model registry.
    pub fn build(self) -> Result<Reclaimer> {
        if self.cycle_period.is_zero() {
            return Err(Error::config("cycle period must be greater than zero"));
        }
        if self.lock_timeout.is_some() && self.lock_poll_interval.is_zero() {
            return Err(Error::config("lock poll interval must be greater than zero"));
        }

        let registry = match self.registry {
            Some(registry) => registry,
            None => ModelRegistry::load(&self.model_root)?,
        };
        let live = match self.matcher {
            Some(matcher) => LiveSetCalculator::from_boxed(matcher),
            None => LiveSetCalculator::default(),
        };
        let picker = self
            .picker
            .unwrap_or_else(|| Box::new(GracePeriodPicker::new(self.grace_period)));
        tracing::info!(
            "[reclaimer] node: {}, cache dir: {:?}, lock dir: {:?}, cycle period: {:?}, picker: {picker:?}",
            self.node,
            self.cache_dir,
            self.lock_dir,
            self.cycle_period
        );

        Ok(Reclaimer {
            node: self.node,
            registry,
            live,
            resolver: self.resolver,
            inspector: CacheInspector::new(&self.cache_dir),
            reconciler: Reconciler::from_boxed(picker),
            evictor: SafeEvictor::new(self.cache_dir, self.lock_dir)
                .with_lock_timeout(self.lock_timeout)
                .with_poll_interval(self.lock_poll_interval),
            cycle_period: self.cycle_period,
        })
    }
}

/// Summary of one reclamation cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    /// The workload resolver failed and the cycle was skipped.
    pub resolver_failed: bool,
    /// Count of workloads on the node.
    pub workloads: usize,
    /// Count of demanded tensors.
    pub live: usize,
    /// Count of materialized tensors.
    pub cached: usize,
    /// Count of tensors tracked as unused after the cycle.
    pub tracked: usize,
    /// Tensors removed from the cache.
    pub evicted: Vec<TensorId>,
    /// Tensors skipped because they have no lock file.
    pub skipped: Vec<TensorId>,
    /// Tensors whose eviction failed.
    pub failed: Vec<TensorId>,
}

/// The node-local tensor reclaimer.
///
/// Each cycle resolves the running workloads, computes the live tensors, lists the cache, reconciles both and
/// evicts what the reconciler selects. Cycles never overlap.
#[derive(Debug)]
pub struct Reclaimer {
    node: String,
    registry: ModelRegistry,
    live: LiveSetCalculator,
    resolver: Arc<dyn WorkloadResolver>,
    inspector: CacheInspector,
    reconciler: Reconciler,
    evictor: SafeEvictor,
    cycle_period: Duration,
}

impl Reclaimer {
    /// The node this reclaimer runs for.
    pub fn node(&self) -> &str {
        &self.node
    }

    /// The installed models.
    pub fn registry(&self) -> &ModelRegistry {
        &self.registry
    }

    /// The reconciler and its keep-alive bookkeeping.
    pub fn reconciler(&self) -> &Reconciler {
        &self.reconciler
    }

    /// Run one cycle now.
    pub async fn run_cycle(&mut self) -> CycleReport {
        self.run_cycle_at(Instant::now()).await
    }

    /// Run one cycle, taking `now` as the cycle time for the grace period bookkeeping.
    pub async fn run_cycle_at(&mut self, now: Instant) -> CycleReport {
        let mut report = CycleReport::default();

        let workloads = match self.resolver.list_current_workloads(&self.node).await {
            Ok(workloads) => workloads,
            Err(e) => {
                tracing::warn!("[reclaimer] skip cycle, cannot list workloads of node {}: {e}", self.node);
                report.resolver_failed = true;
                report.tracked = self.reconciler.keep_alive().len();
                return report;
            }
        };
        let live = self.live.compute(&self.registry, &workloads);

        let inspector = self.inspector.clone();
        let cached = asyncify(move || inspector.snapshot()).await.unwrap_or_else(|e| {
            tracing::warn!("[reclaimer] cache listing task failed: {e}");
            CacheSnapshot::default()
        });

        let reconciliation = self.reconciler.reconcile(&cached, &live, now);

        for tensor in reconciliation.evictable {
            let evictor = self.evictor.clone();
            let target = tensor.clone();
            match asyncify(move || evictor.evict(&target)).await {
                Ok(Ok(eviction)) if eviction.is_settled() => {
                    self.reconciler.on_evicted(&tensor);
                    if eviction == Eviction::Evicted {
                        tracing::info!("[reclaimer] evict tensor {tensor}");
                    }
                    report.evicted.push(tensor);
                }
                Ok(Ok(_)) => report.skipped.push(tensor),
                Ok(Err(e)) => {
                    tracing::warn!("[reclaimer] {e}, retry in the next cycle");
                    report.failed.push(tensor);
                }
                Err(e) => {
                    tracing::warn!("[reclaimer] eviction task of tensor {tensor} failed: {e}");
                    report.failed.push(tensor);
                }
            }
        }

        report.workloads = workloads.len();
        report.live = live.len();
        report.cached = cached.len();
        report.tracked = self.reconciler.keep_alive().len();

        if report.evicted.is_empty() && report.failed.is_empty() {
            tracing::debug!(
                "[reclaimer] cycle done, workloads: {}, live: {}, cached: {}, unused: {}, new unused: {}, revived: {}, pruned: {}, skipped: {}",
                report.workloads,
                report.live,
                report.cached,
                report.tracked,
                reconciliation.fresh.len(),
                reconciliation.revived,
                reconciliation.pruned,
                report.skipped.len(),
            );
        } else {
            tracing::info!(
                "[reclaimer] cycle done, workloads: {}, live: {}, cached: {}, unused: {}, evicted: {}, skipped: {}, failed: {}",
                report.workloads,
                report.live,
                report.cached,
                report.tracked,
                report.evicted.len(),
                report.skipped.len(),
                report.failed.len(),
            );
        }

        report
    }

    /// Run cycles every cycle period until `shutdown` completes.
    ///
    /// The first cycle starts one period after the call. A cycle that overruns the period delays the next one.
    pub async fn run(mut self, shutdown: impl Future<Output = ()>) {
        let mut interval = tokio::time::interval_at(tokio::time::Instant::now() + self.cycle_period, self.cycle_period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tokio::pin!(shutdown);
        tracing::info!("[reclaimer] start, period: {:?}", self.cycle_period);
        loop {
            tokio::select! {
                biased;
                _ = &mut shutdown => {
                    tracing::info!("[reclaimer] exit");
                    return;
                }
                _ = interval.tick() => {
                    self.run_cycle().await;
                }
            }
        }
    }
}
