//! Kubernetes scheduler extender serving workload balance scores

pub mod api;
pub mod config;
