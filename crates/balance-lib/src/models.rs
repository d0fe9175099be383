//! Core data models for the scoring engine

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Number of bytes in one MiB, used for telemetry unit conversion
pub const BYTES_PER_MIB: f64 = 1024.0 * 1024.0;

/// Resource dimensions tracked by the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Dimension {
    Cpu,
    Memory,
    IoStorage,
    IoNetwork,
}

impl Dimension {
    /// All dimensions in scoring order
    pub const ALL: [Dimension; 4] = [
        Dimension::Cpu,
        Dimension::Memory,
        Dimension::IoStorage,
        Dimension::IoNetwork,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Dimension::Cpu => "cpu",
            Dimension::Memory => "memory",
            Dimension::IoStorage => "io_storage",
            Dimension::IoNetwork => "io_network",
        }
    }
}

impl fmt::Display for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Point-in-time host usage as reported by the telemetry backend
///
/// CPU in cores, memory in MiB, I/O in MiB/s.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct HostUsage {
    pub cpu_used: f64,
    pub mem_used: f64,
    pub io_storage_used: f64,
    pub io_network_used: f64,
}

/// Host capacity from inventory metadata, in the same units as [`HostUsage`]
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HostCapacity {
    pub cpu: f64,
    pub mem: f64,
    pub io_storage: f64,
    pub io_network: f64,
}

/// Usage and capacity of one candidate host
///
/// Usage may exceed capacity on over-committed hosts.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HostUtilization {
    pub cpu_used: f64,
    pub mem_used: f64,
    pub io_storage_used: f64,
    pub io_network_used: f64,
    pub cpu_capacity: f64,
    pub mem_capacity: f64,
    pub io_storage_capacity: f64,
    pub io_network_capacity: f64,
}

impl HostUtilization {
    pub fn new(usage: HostUsage, capacity: HostCapacity) -> Self {
        Self {
            cpu_used: usage.cpu_used,
            mem_used: usage.mem_used,
            io_storage_used: usage.io_storage_used,
            io_network_used: usage.io_network_used,
            cpu_capacity: capacity.cpu,
            mem_capacity: capacity.mem,
            io_storage_capacity: capacity.io_storage,
            io_network_capacity: capacity.io_network,
        }
    }

    /// Returns (usage, capacity) for a dimension
    pub fn dimension(&self, dimension: Dimension) -> (f64, f64) {
        match dimension {
            Dimension::Cpu => (self.cpu_used, self.cpu_capacity),
            Dimension::Memory => (self.mem_used, self.mem_capacity),
            Dimension::IoStorage => (self.io_storage_used, self.io_storage_capacity),
            Dimension::IoNetwork => (self.io_network_used, self.io_network_capacity),
        }
    }
}

/// Utilization of a single workload instance
///
/// CPU in fractional cores, memory in MiB, I/O in MiB/s.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct InstanceUtilization {
    pub cpu_usage: f64,
    pub mem_usage: f64,
    pub io_storage_usage: f64,
    pub io_network_usage: f64,
}

/// Mean utilization ratio of a cohort, each field in [0, 1]
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CohortWorkload {
    pub cpu_fraction: f64,
    pub mem_fraction: f64,
    pub io_storage_fraction: f64,
    pub io_network_fraction: f64,
}

impl CohortWorkload {
    /// Profile used when no cohort member produced a sample
    pub const NEUTRAL: CohortWorkload = CohortWorkload {
        cpu_fraction: 0.5,
        mem_fraction: 0.5,
        io_storage_fraction: 0.5,
        io_network_fraction: 0.5,
    };

    /// Build a profile, clamping every fraction into [0, 1]
    pub fn clamped(cpu: f64, mem: f64, io_storage: f64, io_network: f64) -> Self {
        Self {
            cpu_fraction: clamp_unit(cpu),
            mem_fraction: clamp_unit(mem),
            io_storage_fraction: clamp_unit(io_storage),
            io_network_fraction: clamp_unit(io_network),
        }
    }

    pub fn fraction(&self, dimension: Dimension) -> f64 {
        match dimension {
            Dimension::Cpu => self.cpu_fraction,
            Dimension::Memory => self.mem_fraction,
            Dimension::IoStorage => self.io_storage_fraction,
            Dimension::IoNetwork => self.io_network_fraction,
        }
    }
}

impl Default for CohortWorkload {
    fn default() -> Self {
        Self::NEUTRAL
    }
}

/// Per-dimension importance weights; not required to sum to 1
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WeightVector {
    pub alpha: f64,
    pub beta: f64,
    pub gamma: f64,
    pub delta: f64,
}

impl WeightVector {
    pub fn weight(&self, dimension: Dimension) -> f64 {
        match dimension {
            Dimension::Cpu => self.alpha,
            Dimension::Memory => self.beta,
            Dimension::IoStorage => self.gamma,
            Dimension::IoNetwork => self.delta,
        }
    }

    pub fn sum(&self) -> f64 {
        self.alpha + self.beta + self.gamma + self.delta
    }
}

impl Default for WeightVector {
    fn default() -> Self {
        Self {
            alpha: 0.4,
            beta: 0.3,
            gamma: 0.15,
            delta: 0.15,
        }
    }
}

/// Workload instance being placed (a pod, in Kubernetes terms)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkloadInstance {
    pub name: String,
    pub namespace: String,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
}

impl WorkloadInstance {
    pub fn new(name: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: namespace.into(),
            labels: BTreeMap::new(),
        }
    }

    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }

    pub fn reference(&self) -> InstanceRef {
        InstanceRef {
            name: self.name.clone(),
            namespace: self.namespace.clone(),
        }
    }
}

/// Reference to a cohort member
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct InstanceRef {
    pub name: String,
    pub namespace: String,
}

impl fmt::Display for InstanceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// Selector-based workload group (a Kubernetes Service)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkloadGroup {
    pub name: String,
    pub namespace: String,
    #[serde(default)]
    pub selector: BTreeMap<String, String>,
}

impl WorkloadGroup {
    /// True when the selector is non-empty and every pair is present in `labels`
    pub fn matches(&self, labels: &BTreeMap<String, String>) -> bool {
        !self.selector.is_empty()
            && self
                .selector
                .iter()
                .all(|(key, value)| labels.get(key) == Some(value))
    }
}

/// Entry of the node score list exchanged with the scheduler runtime
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostScore {
    pub host: String,
    pub score: i64,
}

impl HostScore {
    pub fn new(host: impl Into<String>, score: i64) -> Self {
        Self {
            host: host.into(),
            score,
        }
    }
}

pub(crate) fn clamp_unit(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}
