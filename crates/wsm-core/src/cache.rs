use std::{
    collections::HashMap,
    sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard, Weak},
    time::{Duration, Instant},
};

use wsm_types::ServiceStatus;

const DEFAULT_TTL: Duration = Duration::from_secs(5);
const SWEEP_INTERVAL: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy)]
struct CachedStatus {
    status: ServiceStatus,
    pid: u32,
    observed_at: Instant,
}

/// Short-TTL cache of per-service `(status, pid)` observations, bounding the
/// rate of expensive registrar queries. Purely a read-through accelerator: a
/// stale entry is a miss, so expiry never changes correctness, only latency.
///
/// The cache carries its own lock, decoupled from the manager's, so status
/// reads never contend with lifecycle mutations.
#[derive(Debug)]
pub struct StatusCache {
    ttl: Duration,
    inner: RwLock<HashMap<String, CachedStatus>>,
}

impl Default for StatusCache {
    fn default() -> Self {
        Self::new()
    }
}

impl StatusCache {
    #[must_use]
    pub fn new() -> Self {
        Self::with_ttl(DEFAULT_TTL)
    }

    #[must_use]
    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            ttl,
            inner: RwLock::new(HashMap::new()),
        }
    }

    /// Returns the cached `(status, pid)` for the service, or `None` when
    /// absent or older than the TTL.
    pub fn get(&self, service_id: &str) -> Option<(ServiceStatus, u32)> {
        let inner = self.read();
        let cached = inner.get(service_id)?;
        if cached.observed_at.elapsed() > self.ttl {
            return None;
        }
        Some((cached.status, cached.pid))
    }

    pub fn set(&self, service_id: &str, status: ServiceStatus, pid: u32) {
        self.write().insert(
            service_id.to_owned(),
            CachedStatus {
                status,
                pid,
                observed_at: Instant::now(),
            },
        );
    }

    pub fn remove(&self, service_id: &str) {
        self.write().remove(service_id);
    }

    pub fn clear(&self) {
        self.write().clear();
    }

    /// Evicts all entries older than the TTL. Memory hygiene only; `get`
    /// already treats stale entries as misses.
    pub fn clean_expired(&self) {
        let ttl = self.ttl;
        self.write()
            .retain(|_, cached| cached.observed_at.elapsed() <= ttl);
    }

    /// Starts the background sweep. The task holds only a weak reference and
    /// exits once the cache is dropped.
    pub fn spawn_sweeper(cache: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let cache = Arc::downgrade(cache);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(SWEEP_INTERVAL);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            interval.tick().await;
            loop {
                interval.tick().await;
                let Some(cache) = Weak::upgrade(&cache) else {
                    break;
                };
                cache.clean_expired();
            }
        })
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, CachedStatus>> {
        self.inner
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, CachedStatus>> {
        self.inner
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
