//! Short-lived telemetry cache shared by concurrent scoring calls
//!
//! Readers of a fresh entry never wait on each other. A miss takes the
//! per-key fetch gate, so at most one backend fetch per key is in flight and
//! callers queued behind it reuse the stored value. Failures are not cached
//! and leave no entry behind. Past `max_entries`, stale entries go first and
//! then the oldest fresh ones; entries a caller is using are never evicted.

use super::{async_trait, TelemetrySource};
use crate::error::Result;
use crate::models::{HostUtilization, InstanceUtilization};
use crate::observability::EngineMetrics;
use dashmap::DashMap;
use std::fmt::Debug;
use std::future::Future;
use std::hash::Hash;
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::debug;

/// Cache key of a workload instance: (namespace, name)
type InstanceKey = (String, String);

struct Slot<V> {
    value: RwLock<Option<(Instant, V)>>,
    fetch_gate: Mutex<()>,
}

impl<V: Copy> Slot<V> {
    fn new() -> Self {
        Self {
            value: RwLock::new(None),
            fetch_gate: Mutex::new(()),
        }
    }

    fn fresh(&self, ttl: Duration) -> Option<V> {
        let guard = self.value.read().unwrap_or_else(|e| e.into_inner());
        guard
            .as_ref()
            .filter(|(stored_at, _)| stored_at.elapsed() < ttl)
            .map(|(_, value)| *value)
    }

    fn store(&self, value: V) {
        let mut guard = self.value.write().unwrap_or_else(|e| e.into_inner());
        *guard = Some((Instant::now(), value));
    }

    fn stored_at(&self) -> Option<Instant> {
        let guard = self.value.read().unwrap_or_else(|e| e.into_inner());
        guard.as_ref().map(|(stored_at, _)| *stored_at)
    }
}

/// True when only the map holds the slot, i.e. no caller reads or fetches it
fn is_idle<V>(slot: &Arc<Slot<V>>) -> bool {
    Arc::strong_count(slot) == 1
}

/// Entry picked for size-based eviction
enum Evictable {
    Host(String),
    Instance(InstanceKey),
}

/// TTL cache in front of another [`TelemetrySource`]
pub struct CachedTelemetry {
    inner: Arc<dyn TelemetrySource>,
    hosts: DashMap<String, Arc<Slot<HostUtilization>>>,
    instances: DashMap<InstanceKey, Arc<Slot<InstanceUtilization>>>,
    ttl: Duration,
    max_entries: usize,
    metrics: EngineMetrics,
}

impl CachedTelemetry {
    pub fn new(inner: Arc<dyn TelemetrySource>, ttl: Duration, max_entries: usize) -> Self {
        Self {
            inner,
            hosts: DashMap::new(),
            instances: DashMap::new(),
            ttl,
            max_entries: max_entries.max(1),
            metrics: EngineMetrics::new(),
        }
    }

    /// Number of keys currently tracked
    pub fn len(&self) -> usize {
        self.hosts.len() + self.instances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    async fn get_or_fetch<K, V, F>(
        &self,
        slots: &DashMap<K, Arc<Slot<V>>>,
        key: K,
        fetch: F,
    ) -> Result<V>
    where
        K: Eq + Hash + Debug + Clone,
        V: Copy,
        F: Future<Output = Result<V>>,
    {
        let slot = slots
            .entry(key.clone())
            .or_insert_with(|| Arc::new(Slot::new()))
            .clone();

        if let Some(value) = slot.fresh(self.ttl) {
            self.metrics.inc_cache_hits();
            return Ok(value);
        }

        let gate = slot.fetch_gate.lock().await;

        // Another caller may have refreshed the entry while we waited
        if let Some(value) = slot.fresh(self.ttl) {
            self.metrics.inc_cache_hits();
            debug!(key = ?key, "Telemetry fetch coalesced");
            return Ok(value);
        }

        self.metrics.inc_cache_misses();
        let result = fetch.await;
        if let Ok(value) = &result {
            slot.store(*value);
        }
        drop(gate);

        if result.is_err() {
            drop(slot);
            // Nothing was stored; forget the key unless a caller is queued on it
            slots.remove_if(&key, |_, slot| is_idle(slot) && slot.stored_at().is_none());
        }

        self.evict();
        result
    }

    /// Bring the cache back under `max_entries`
    ///
    /// Stale and empty idle entries go first, then the oldest idle ones.
    fn evict(&self) {
        if self.len() <= self.max_entries {
            return;
        }

        let ttl = self.ttl;
        self.hosts
            .retain(|_, slot| !is_idle(slot) || slot.fresh(ttl).is_some());
        self.instances
            .retain(|_, slot| !is_idle(slot) || slot.fresh(ttl).is_some());

        let excess = self.len().saturating_sub(self.max_entries);
        if excess > 0 {
            let mut oldest: Vec<(Instant, Evictable)> = self
                .hosts
                .iter()
                .filter(|entry| is_idle(entry.value()))
                .filter_map(|entry| {
                    let stored_at = entry.value().stored_at()?;
                    Some((stored_at, Evictable::Host(entry.key().clone())))
                })
                .chain(
                    self.instances
                        .iter()
                        .filter(|entry| is_idle(entry.value()))
                        .filter_map(|entry| {
                            let stored_at = entry.value().stored_at()?;
                            Some((stored_at, Evictable::Instance(entry.key().clone())))
                        }),
                )
                .collect();
            oldest.sort_by_key(|(stored_at, _)| *stored_at);

            for (_, key) in oldest.into_iter().take(excess) {
                match key {
                    Evictable::Host(host) => {
                        self.hosts.remove_if(&host, |_, slot| is_idle(slot));
                    }
                    Evictable::Instance(instance) => {
                        self.instances.remove_if(&instance, |_, slot| is_idle(slot));
                    }
                }
            }
        }

        debug!(entries = self.len(), "Evicted telemetry cache entries");
    }
}

#[async_trait]
impl TelemetrySource for CachedTelemetry {
    async fn fetch_host_utilization(&self, host: &str) -> Result<HostUtilization> {
        self.get_or_fetch(
            &self.hosts,
            host.to_string(),
            self.inner.fetch_host_utilization(host),
        )
        .await
    }

    async fn fetch_instance_utilization(
        &self,
        instance: &str,
        namespace: &str,
    ) -> Result<InstanceUtilization> {
        self.get_or_fetch(
            &self.instances,
            (namespace.to_string(), instance.to_string()),
            self.inner.fetch_instance_utilization(instance, namespace),
        )
        .await
    }
}
