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

//! Workload resolver backed by the cluster API.

use std::{collections::HashSet, time::Duration};

use anyhow::anyhow;
use bytes::Bytes;
use futures_core::future::BoxFuture;
use futures_util::FutureExt;
use http_body_util::{BodyExt, Empty};
use hyper::Uri;
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};
use serde::Deserialize;
use tensor_gc::{Error, Result, WorkloadResolver};

/// Lists the pods of one namespace bound to the node.
///
/// Requests go over plain HTTP to an endpoint that already handles authentication, usually a `kubectl proxy`
/// sidecar.
#[derive(Debug, Clone)]
pub struct KubeResolver {
    client: Client<HttpConnector, Empty<Bytes>>,
    api: String,
    namespace: String,
    timeout: Duration,
}

impl KubeResolver {
    pub fn new(api: impl Into<String>, namespace: impl Into<String>, timeout: Duration) -> Self {
        let client = Client::builder(TokioExecutor::new()).build_http();
        Self {
            client,
            api: api.into(),
            namespace: namespace.into(),
            timeout,
        }
    }

    fn pods_uri(&self, node: &str) -> String {
        format!(
            "{}/api/v1/namespaces/{}/pods?fieldSelector=spec.nodeName%3D{}",
            self.api.trim_end_matches('/'),
            self.namespace,
            node
        )
    }
}

impl WorkloadResolver for KubeResolver {
    fn list_current_workloads(&self, node: &str) -> BoxFuture<'static, Result<HashSet<String>>> {
        let client = self.client.clone();
        let uri = self.pods_uri(node);
        let node = node.to_string();
        let timeout = self.timeout;

        async move {
            let uri: Uri = uri.parse().map_err(Error::resolver)?;
            let request = async {
                let response = client.get(uri).await.map_err(Error::resolver)?;
                let status = response.status();
                let body = response.into_body().collect().await.map_err(Error::resolver)?.to_bytes();
                if !status.is_success() {
                    return Err(Error::resolver(anyhow!(
                        "pod listing returned {status}: {}",
                        String::from_utf8_lossy(&body)
                    )));
                }
                parse_pod_list(&body, &node).map_err(Error::resolver)
            };
            tokio::time::timeout(timeout, request)
                .await
                .map_err(|_| Error::resolver(anyhow!("pod listing timed out after {timeout:?}")))?
        }
        .boxed()
    }
}

#[derive(Debug, Deserialize)]
struct PodList {
    #[serde(default)]
    items: Vec<Pod>,
}

#[derive(Debug, Deserialize)]
struct Pod {
    metadata: PodMetadata,
    #[serde(default)]
    spec: PodSpec,
    #[serde(default)]
    status: PodStatus,
}

#[derive(Debug, Deserialize)]
struct PodMetadata {
    name: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PodSpec {
    #[serde(default)]
    node_name: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct PodStatus {
    #[serde(default)]
    phase: Option<String>,
}

/// Names of the pods bound to `node` that have not terminated.
fn parse_pod_list(body: &[u8], node: &str) -> serde_json::Result<HashSet<String>> {
    let list: PodList = serde_json::from_slice(body)?;
    let pods = list
        .items
        .into_iter()
        .filter(|pod| pod.spec.node_name.as_deref() == Some(node))
        .filter(|pod| !matches!(pod.status.phase.as_deref(), Some("Succeeded") | Some("Failed")))
        .map(|pod| pod.metadata.name)
        .collect();
    Ok(pods)
}
