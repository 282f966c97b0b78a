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

//! `tensor-gc` reclaims unused tensors from the shared-memory cache of this node.

mod kube;

use std::{path::PathBuf, sync::Arc, time::Duration};

use anyhow::Context;
use bytesize::ByteSize;
use clap::Parser;
use kube::KubeResolver;
use tensor_gc::{read_node_identity, FileResolver, ReclaimerBuilder, WorkloadResolver};

#[derive(Debug, Parser)]
#[command(author, version, about)]
struct Args {
    /// Identity of this node. Read from `--node-name-file` if not set.
    #[arg(long)]
    node_name: Option<String>,

    /// File holding the identity of this node.
    #[arg(long, default_value = "/root/hostname")]
    node_name_file: PathBuf,

    /// Directory with one tensor manifest per installed model.
    #[arg(long, default_value = ReclaimerBuilder::DEFAULT_MODEL_ROOT)]
    model_root: PathBuf,

    /// Shared cache directory.
    #[arg(long, default_value = ReclaimerBuilder::DEFAULT_CACHE_DIR)]
    cache_dir: PathBuf,

    /// Directory of the advisory tensor lock files.
    #[arg(long, default_value = ReclaimerBuilder::DEFAULT_LOCK_DIR)]
    lock_dir: PathBuf,

    /// Period between two reclamation cycles.
    #[arg(long, default_value = "5s")]
    cycle_period: humantime::Duration,

    /// How long a tensor must stay unused before eviction.
    #[arg(long, default_value = "1m")]
    grace_period: humantime::Duration,

    /// How long eviction waits for a reader to release a tensor lock. `0s` waits indefinitely.
    #[arg(long, default_value = "30s")]
    lock_timeout: humantime::Duration,

    /// Evict least recently accessed unused tensors while the cache is above this size, instead of using the
    /// grace period.
    #[arg(long)]
    memory_bound: Option<ByteSize>,

    /// Read the workloads of this node from a file instead of the cluster API.
    #[arg(long)]
    workloads_file: Option<PathBuf>,

    /// Cluster API endpoint, e.g. a `kubectl proxy` sidecar.
    #[arg(long, default_value = "http://127.0.0.1:8001")]
    kube_api: String,

    /// Namespace of the serving workloads.
    #[arg(long, default_value = "openfaasdev")]
    namespace: String,

    /// Timeout of one cluster API request.
    #[arg(long, default_value = "10s")]
    kube_timeout: humantime::Duration,
}

fn init_logger() {
    use tracing_subscriber::{prelude::*, EnvFilter};

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_line_number(true))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();
}

#[cfg(unix)]
async fn shutdown() {
    use tokio::signal::unix::{signal, SignalKind};

    let mut terminate = match signal(SignalKind::terminate()) {
        Ok(terminate) => terminate,
        Err(e) => {
            tracing::warn!("cannot listen to SIGTERM: {e}");
            let _ = tokio::signal::ctrl_c().await;
            return;
        }
    };
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {}
        _ = terminate.recv() => {}
    }
}

#[cfg(not(unix))]
async fn shutdown() {
    let _ = tokio::signal::ctrl_c().await;
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    init_logger();

    let args = Args::parse();

    let node = match args.node_name {
        Some(node) => node,
        None => read_node_identity(&args.node_name_file).context("fail to read node identity")?,
    };

    let resolver: Arc<dyn WorkloadResolver> = match args.workloads_file {
        Some(path) => Arc::new(FileResolver::new(path)),
        None => Arc::new(KubeResolver::new(args.kube_api, args.namespace, args.kube_timeout.into())),
    };

    let lock_timeout: Duration = args.lock_timeout.into();
    let mut builder = ReclaimerBuilder::new(node, resolver)
        .with_model_root(args.model_root)
        .with_cache_dir(args.cache_dir)
        .with_lock_dir(args.lock_dir)
        .with_cycle_period(args.cycle_period.into())
        .with_grace_period(args.grace_period.into())
        .with_lock_timeout((!lock_timeout.is_zero()).then_some(lock_timeout));
    if let Some(bound) = args.memory_bound {
        builder = builder.with_memory_bound(bound.as_u64());
    }

    let reclaimer = builder.build().context("fail to start reclaimer")?;
    reclaimer.run(shutdown()).await;

    Ok(())
}
