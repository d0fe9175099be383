//! Kubernetes-backed inventory
//!
//! Services are the grouping resources (their `spec.selector`), Pods are
//! the workload instances and Node allocatable resources give host CPU and
//! memory capacity.

use super::{CapacitySource, Inventory};
use crate::config::CapacityDefaults;
use crate::error::{Result, ScoringError};
use crate::models::{HostCapacity, InstanceRef, WorkloadGroup, BYTES_PER_MIB};
use async_trait::async_trait;
use k8s_openapi::api::core::v1::{Node, Pod, Service};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use kube::api::{Api, ListParams};
use kube::Client;
use std::collections::BTreeMap;
use tracing::debug;

/// Inventory reading Services, Pods and Nodes from the Kubernetes API
pub struct KubeInventory {
    client: Client,
    io_capacity: CapacityDefaults,
}

impl KubeInventory {
    pub fn new(client: Client, io_capacity: CapacityDefaults) -> Self {
        Self {
            client,
            io_capacity,
        }
    }

    /// Connect using in-cluster configuration or the local kubeconfig
    pub async fn try_default(io_capacity: CapacityDefaults) -> Result<Self> {
        let client = Client::try_default()
            .await
            .map_err(|e| ScoringError::Inventory(format!("failed to create client: {}", e)))?;
        Ok(Self::new(client, io_capacity))
    }
}

#[async_trait]
impl Inventory for KubeInventory {
    async fn list_groups(&self, namespace: &str) -> Result<Vec<WorkloadGroup>> {
        let services: Api<Service> = Api::namespaced(self.client.clone(), namespace);
        let list = services
            .list(&ListParams::default())
            .await
            .map_err(|e| ScoringError::Inventory(format!("failed to list services: {}", e)))?;

        Ok(list
            .items
            .into_iter()
            .filter_map(|service| {
                let name = service.metadata.name?;
                let selector = service
                    .spec
                    .and_then(|spec| spec.selector)
                    .unwrap_or_default();
                Some(WorkloadGroup {
                    name,
                    namespace: namespace.to_string(),
                    selector,
                })
            })
            .collect())
    }

    async fn list_instances(
        &self,
        namespace: &str,
        selector: &BTreeMap<String, String>,
    ) -> Result<Vec<InstanceRef>> {
        // An empty label selector would select every pod of the namespace
        if selector.is_empty() {
            return Ok(Vec::new());
        }

        let pods: Api<Pod> = Api::namespaced(self.client.clone(), namespace);
        let params = ListParams::default().labels(&format_label_selector(selector));
        let list = pods
            .list(&params)
            .await
            .map_err(|e| ScoringError::Inventory(format!("failed to list pods: {}", e)))?;

        Ok(list
            .items
            .into_iter()
            .filter(|pod| {
                let phase = pod.status.as_ref().and_then(|s| s.phase.as_deref());
                !matches!(phase, Some("Succeeded") | Some("Failed"))
            })
            .filter_map(|pod| {
                Some(InstanceRef {
                    name: pod.metadata.name?,
                    namespace: namespace.to_string(),
                })
            })
            .collect())
    }
}

#[async_trait]
impl CapacitySource for KubeInventory {
    async fn host_capacity(&self, host: &str) -> Result<HostCapacity> {
        let nodes: Api<Node> = Api::all(self.client.clone());
        let node = nodes
            .get(host)
            .await
            .map_err(|e| ScoringError::Inventory(format!("failed to get node {}: {}", host, e)))?;

        let allocatable = node
            .status
            .and_then(|status| status.allocatable)
            .unwrap_or_default();

        let cpu = allocatable
            .get("cpu")
            .and_then(parse_cpu_quantity)
            .ok_or_else(|| {
                ScoringError::Inventory(format!("node {} reports no allocatable cpu", host))
            })?;
        let mem = allocatable
            .get("memory")
            .and_then(parse_memory_quantity)
            .ok_or_else(|| {
                ScoringError::Inventory(format!("node {} reports no allocatable memory", host))
            })?;

        debug!(host = %host, cpu_cores = cpu, memory_mib = mem, "Resolved host capacity");

        Ok(HostCapacity {
            cpu,
            mem,
            io_storage: self.io_capacity.io_storage,
            io_network: self.io_capacity.io_network,
        })
    }
}

/// `k1=v1,k2=v2`, the equality-based selector syntax of the API server
fn format_label_selector(selector: &BTreeMap<String, String>) -> String {
    selector
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join(",")
}

/// Parse a CPU quantity (`"4"`, `"3920m"`, `"0.5"`) into cores
fn parse_cpu_quantity(quantity: &Quantity) -> Option<f64> {
    let raw = quantity.0.trim();
    match raw.strip_suffix('m') {
        Some(millis) => millis.parse::<f64>().ok().map(|m| m / 1000.0),
        None => raw.parse::<f64>().ok(),
    }
}

/// Parse a memory quantity (`"16303896Ki"`, `"8Gi"`, `"1G"`, `"1048576"`) into MiB
fn parse_memory_quantity(quantity: &Quantity) -> Option<f64> {
    const SUFFIXES: &[(&str, f64)] = &[
        ("Ki", 1024.0),
        ("Mi", 1024.0 * 1024.0),
        ("Gi", 1024.0 * 1024.0 * 1024.0),
        ("Ti", 1024.0 * 1024.0 * 1024.0 * 1024.0),
        ("k", 1e3),
        ("M", 1e6),
        ("G", 1e9),
        ("T", 1e12),
    ];

    let raw = quantity.0.trim();
    let (number, multiplier) = SUFFIXES
        .iter()
        .find_map(|(suffix, mult)| raw.strip_suffix(suffix).map(|n| (n, *mult)))
        .unwrap_or((raw, 1.0));

    number
        .parse::<f64>()
        .ok()
        .map(|n| n * multiplier / BYTES_PER_MIB)
}
