//! Registry Cache - point-in-time snapshot of the device registry
//!
//! The admin endpoint resolves a device on every message. Rather than asking
//! the registry each time it reads from a snapshot, and only goes back to the
//! registry when a serial is missing:
//!
//! - **Hit**: served from the current snapshot (may be one refresh stale)
//! - **Miss**: exactly one refresh, then a second lookup
//!
//! A refresh builds a whole new map and swaps it in. Readers holding the old
//! snapshot keep a consistent view; nobody observes a half-updated map.

use std::collections::HashMap;
use std::sync::Arc;

use futures::future::join_all;
use tokio::sync::RwLock;
use tracing::debug;

use adbgate_proto::{DeviceState, DeviceStatus};

use crate::backend::{DeviceRegistry, TargetHandle};

/// Immutable serial → handle map
pub type Snapshot = HashMap<String, TargetHandle>;

/// Pull-through cache over a [`DeviceRegistry`]
///
/// Cheap to clone; clones share the same snapshot.
#[derive(Clone)]
pub struct RegistryCache {
    registry: Arc<dyn DeviceRegistry>,
    snapshot: Arc<RwLock<Arc<Snapshot>>>,
}

impl RegistryCache {
    /// Create a cache with an empty snapshot
    ///
    /// The first lookup populates it.
    pub fn new(registry: Arc<dyn DeviceRegistry>) -> Self {
        Self {
            registry,
            snapshot: Arc::new(RwLock::new(Arc::new(HashMap::new()))),
        }
    }

    /// Look up a serial in the current snapshot only
    pub async fn get(&self, serial: &str) -> Option<TargetHandle> {
        self.snapshot.read().await.get(serial).cloned()
    }

    /// Replace the snapshot with a fresh copy of the registry
    pub async fn refresh(&self) -> Arc<Snapshot> {
        let fresh: Snapshot = self.registry.enumerate().await.into_iter().collect();
        let fresh = Arc::new(fresh);
        *self.snapshot.write().await = fresh.clone();
        debug!(devices = fresh.len(), "Refreshed registry snapshot");
        fresh
    }

    /// Look up a serial, refreshing once on a miss
    pub async fn get_or_refresh(&self, serial: &str) -> Option<TargetHandle> {
        if let Some(handle) = self.get(serial).await {
            return Some(handle);
        }
        debug!(serial = %serial, "Registry snapshot miss, refreshing");
        self.refresh().await.get(serial).cloned()
    }

    /// Refresh, then probe every device's online state
    ///
    /// Probes run concurrently. A failed probe reports the device offline.
    /// Output is sorted by serial.
    pub async fn statuses(&self) -> Vec<DeviceStatus> {
        let snapshot = self.refresh().await;
        let probes = snapshot.iter().map(|(serial, handle)| async move {
            let online = handle.is_online().await.unwrap_or_else(|e| {
                debug!(serial = %serial, error = %e, "Status probe failed");
                false
            });
            DeviceStatus {
                device_serial: serial.clone(),
                status: DeviceState::from(online),
            }
        });

        let mut statuses = join_all(probes).await;
        statuses.sort_by(|a, b| a.device_serial.cmp(&b.device_serial));
        statuses
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{ExecutionError, MockDeviceExecutor, MockDeviceRegistry};

    fn device(online: Result<bool, &'static str>) -> TargetHandle {
        let mut mock = MockDeviceExecutor::new();
        mock.expect_is_online().returning(move || {
            online.map_err(|e| ExecutionError::CommandFailed(e.to_string()))
        });
        Arc::new(mock)
    }

    fn entries(serials: &[&str]) -> Vec<(String, TargetHandle)> {
        serials
            .iter()
            .map(|s| (s.to_string(), device(Ok(true))))
            .collect()
    }

    #[tokio::test]
    async fn test_starts_empty_without_touching_registry() {
        let mut registry = MockDeviceRegistry::new();
        registry.expect_enumerate().never();

        let cache = RegistryCache::new(Arc::new(registry));
        assert!(cache.get("ABC123").await.is_none());
    }

    #[tokio::test]
    async fn test_miss_refreshes_once_then_hits_from_snapshot() {
        let mut registry = MockDeviceRegistry::new();
        registry
            .expect_enumerate()
            .times(1)
            .returning(|| entries(&["ABC123"]));

        let cache = RegistryCache::new(Arc::new(registry));
        assert!(cache.get_or_refresh("ABC123").await.is_some());
        assert!(cache.get_or_refresh("ABC123").await.is_some());
    }

    #[tokio::test]
    async fn test_unknown_serial_refreshes_exactly_once_per_lookup() {
        let mut registry = MockDeviceRegistry::new();
        registry
            .expect_enumerate()
            .times(2)
            .returning(|| entries(&["ABC123"]));

        let cache = RegistryCache::new(Arc::new(registry));
        assert!(cache.get_or_refresh("NOPE").await.is_none());
        assert!(cache.get_or_refresh("NOPE").await.is_none());
    }

    #[tokio::test]
    async fn test_refresh_replaces_snapshot_wholesale() {
        let mut registry = MockDeviceRegistry::new();
        let mut seq = mockall::Sequence::new();
        registry
            .expect_enumerate()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|| entries(&["OLD"]));
        registry
            .expect_enumerate()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|| entries(&["NEW"]));

        let cache = RegistryCache::new(Arc::new(registry));
        let first = cache.refresh().await;
        cache.refresh().await;

        // Earlier readers keep their consistent view
        assert!(first.contains_key("OLD"));
        assert!(cache.get("OLD").await.is_none());
        assert!(cache.get("NEW").await.is_some());
    }

    #[tokio::test]
    async fn test_statuses_one_entry_per_device_sorted() {
        let mut registry = MockDeviceRegistry::new();
        registry.expect_enumerate().returning(|| {
            vec![
                ("B".to_string(), device(Ok(false))),
                ("A".to_string(), device(Ok(true))),
                ("C".to_string(), device(Err("adb server down"))),
                ("A".to_string(), device(Ok(true))),
            ]
        });

        let cache = RegistryCache::new(Arc::new(registry));
        let statuses = cache.statuses().await;

        assert_eq!(
            statuses,
            vec![
                DeviceStatus {
                    device_serial: "A".to_string(),
                    status: DeviceState::Online
                },
                DeviceStatus {
                    device_serial: "B".to_string(),
                    status: DeviceState::Offline
                },
                DeviceStatus {
                    device_serial: "C".to_string(),
                    status: DeviceState::Offline
                },
            ]
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_statuses_unaffected_by_concurrent_lookups() {
        let mut registry = MockDeviceRegistry::new();
        registry
            .expect_enumerate()
            .returning(|| entries(&["A", "B", "C"]));
        let cache = RegistryCache::new(Arc::new(registry));

        // Misses force refreshes while enumeration is running
        let lookups: Vec<_> = (0..32)
            .map(|i| {
                let cache = cache.clone();
                tokio::spawn(async move {
                    let serial = if i % 2 == 0 { "B" } else { "MISSING" };
                    cache.get_or_refresh(serial).await.is_some()
                })
            })
            .collect();
        let enumerations: Vec<_> = (0..4)
            .map(|_| {
                let cache = cache.clone();
                tokio::spawn(async move { cache.statuses().await })
            })
            .collect();

        for (i, lookup) in lookups.into_iter().enumerate() {
            assert_eq!(lookup.await.unwrap(), i % 2 == 0);
        }
        for enumeration in enumerations {
            let serials: Vec<String> = enumeration
                .await
                .unwrap()
                .into_iter()
                .map(|s| s.device_serial)
                .collect();
            assert_eq!(serials, vec!["A", "B", "C"]);
        }
    }
}
