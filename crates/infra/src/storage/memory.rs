use std::collections::HashMap;

use async_trait::async_trait;
use novem_core::SessionStore;
use novem_domain::Result;
use parking_lot::RwLock;

/// Session store kept in process memory.
#[derive(Debug, Default)]
pub struct MemorySessionStore {
    slots: RwLock<HashMap<String, String>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.slots.read().get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        self.slots.write().insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        self.slots.write().remove(key);
        Ok(())
    }

    async fn set_many(&self, entries: &[(&str, String)]) -> Result<()> {
        let mut slots = self.slots.write();
        for (key, value) in entries {
            slots.insert((*key).to_string(), value.clone());
        }
        Ok(())
    }
}
