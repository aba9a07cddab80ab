use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use wsm_types::PersistedConfig;

use crate::{
    error::{Error, Result},
    store::ConfigStore,
};

/// In-memory config store. Clones share state, which stands in for the
/// durability of the registry across manager instances in tests.
#[derive(Debug, Default, Clone)]
pub struct MemoryConfigStore {
    entries: Arc<Mutex<HashMap<String, PersistedConfig>>>,
}

impl MemoryConfigStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, service_id: &str) -> bool {
        self.lock().contains_key(service_id)
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, PersistedConfig>> {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl ConfigStore for MemoryConfigStore {
    fn write(&self, service_id: &str, config: &PersistedConfig) -> Result<()> {
        self.lock().insert(service_id.to_owned(), config.clone());
        Ok(())
    }

    fn read(&self, service_id: &str) -> Result<PersistedConfig> {
        self.lock()
            .get(service_id)
            .cloned()
            .ok_or_else(|| Error::store(service_id, "no configuration entry"))
    }

    fn remove(&self, service_id: &str) -> Result<()> {
        self.lock().remove(service_id);
        Ok(())
    }
}
