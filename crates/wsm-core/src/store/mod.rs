mod memory;
#[cfg(windows)]
mod registry;

pub use memory::MemoryConfigStore;
#[cfg(windows)]
pub use registry::RegistryConfigStore;

use wsm_types::PersistedConfig;

use crate::error::Result;

/// Durable key/value store for per-service launch parameters, keyed by
/// service id. This is the rendezvous channel between the manager and the
/// host: written once at creation time by the manager, read once per host
/// process lifetime by a separately launched host. The two never share
/// memory.
pub trait ConfigStore: Send + Sync {
    /// Persist the launch parameters for a service.
    fn write(&self, service_id: &str, config: &PersistedConfig) -> Result<()>;
    /// Load the launch parameters for a service. Missing optional fields
    /// default; a missing executable path is an error.
    fn read(&self, service_id: &str) -> Result<PersistedConfig>;
    /// Delete the entry. Removing an absent entry succeeds.
    fn remove(&self, service_id: &str) -> Result<()>;
}
