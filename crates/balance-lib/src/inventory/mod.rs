//! Cluster inventory: workload groups, their instances and host capacities

mod kubernetes;

pub use kubernetes::KubeInventory;

use crate::error::{Result, ScoringError};
use crate::models::{HostCapacity, InstanceRef, WorkloadGroup, WorkloadInstance};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};

/// Read access to workload grouping resources and their members
#[async_trait]
pub trait Inventory: Send + Sync {
    /// List the grouping resources of a namespace
    async fn list_groups(&self, namespace: &str) -> Result<Vec<WorkloadGroup>>;

    /// List the instances of a namespace whose labels match `selector`
    async fn list_instances(
        &self,
        namespace: &str,
        selector: &BTreeMap<String, String>,
    ) -> Result<Vec<InstanceRef>>;
}

/// Capacity metadata of candidate hosts
#[async_trait]
pub trait CapacitySource: Send + Sync {
    async fn host_capacity(&self, host: &str) -> Result<HostCapacity>;
}

/// In-memory inventory, for tests and statically described clusters
#[derive(Debug, Clone, Default)]
pub struct StaticInventory {
    groups: Vec<WorkloadGroup>,
    instances: Vec<WorkloadInstance>,
    capacities: HashMap<String, HostCapacity>,
    default_capacity: Option<HostCapacity>,
}

impl StaticInventory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_group(mut self, group: WorkloadGroup) -> Self {
        self.groups.push(group);
        self
    }

    pub fn with_instance(mut self, instance: WorkloadInstance) -> Self {
        self.instances.push(instance);
        self
    }

    pub fn with_capacity(mut self, host: impl Into<String>, capacity: HostCapacity) -> Self {
        self.capacities.insert(host.into(), capacity);
        self
    }

    /// Capacity reported for hosts without an explicit entry
    pub fn with_default_capacity(mut self, capacity: HostCapacity) -> Self {
        self.default_capacity = Some(capacity);
        self
    }
}

#[async_trait]
impl Inventory for StaticInventory {
    async fn list_groups(&self, namespace: &str) -> Result<Vec<WorkloadGroup>> {
        Ok(self
            .groups
            .iter()
            .filter(|g| g.namespace == namespace)
            .cloned()
            .collect())
    }

    async fn list_instances(
        &self,
        namespace: &str,
        selector: &BTreeMap<String, String>,
    ) -> Result<Vec<InstanceRef>> {
        Ok(self
            .instances
            .iter()
            .filter(|i| i.namespace == namespace)
            .filter(|i| selector.iter().all(|(k, v)| i.labels.get(k) == Some(v)))
            .map(WorkloadInstance::reference)
            .collect())
    }
}

#[async_trait]
impl CapacitySource for StaticInventory {
    async fn host_capacity(&self, host: &str) -> Result<HostCapacity> {
        self.capacities
            .get(host)
            .copied()
            .or(self.default_capacity)
            .ok_or_else(|| ScoringError::Inventory(format!("unknown host {}", host)))
    }
}
