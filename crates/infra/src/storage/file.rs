use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use novem_core::SessionStore;
use novem_domain::{NovemError, Result};
use tokio::sync::Mutex;
use tracing::debug;

use crate::errors::InfraError;

/// Session store backed by a single JSON object on disk.
///
/// The file is read lazily on first access and rewritten through a temporary
/// sibling file plus rename, so a crash never leaves a half-written document.
#[derive(Debug)]
pub struct FileSessionStore {
    path: PathBuf,
    cache: Mutex<Option<BTreeMap<String, String>>>,
}

impl FileSessionStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into(), cache: Mutex::new(None) }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read_file(&self) -> Result<BTreeMap<String, String>> {
        let contents = match tokio::fs::read_to_string(&self.path).await {
            Ok(contents) => contents,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Ok(BTreeMap::new());
            }
            Err(err) => return Err(InfraError::from(err).into()),
        };
        if contents.trim().is_empty() {
            return Ok(BTreeMap::new());
        }
        serde_json::from_str(&contents).map_err(|err| {
            NovemError::Storage(format!("session file {} is corrupt: {err}", self.path.display()))
        })
    }

    async fn write_file(&self, slots: &BTreeMap<String, String>) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await.map_err(InfraError::from)?;
        }
        let contents = serde_json::to_vec_pretty(slots).map_err(InfraError::from)?;
        let temp = self.path.with_extension("json.tmp");
        tokio::fs::write(&temp, contents).await.map_err(InfraError::from)?;
        tokio::fs::rename(&temp, &self.path).await.map_err(InfraError::from)?;
        debug!(path = %self.path.display(), slots = slots.len(), "Session file written");
        Ok(())
    }

    /// Apply `change` to the slots and persist them in one write.
    async fn update<F>(&self, change: F) -> Result<()>
    where
        F: FnOnce(&mut BTreeMap<String, String>) + Send,
    {
        let mut cache = self.cache.lock().await;
        let mut slots = match cache.take() {
            Some(slots) => slots,
            None => self.read_file().await?,
        };
        let before = slots.clone();
        change(&mut slots);
        if slots == before {
            *cache = Some(slots);
            return Ok(());
        }
        let written = self.write_file(&slots).await;
        // Keep the previous view when the write failed
        *cache = Some(if written.is_ok() { slots } else { before });
        written
    }
}

#[async_trait]
impl SessionStore for FileSessionStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut cache = self.cache.lock().await;
        if cache.is_none() {
            *cache = Some(self.read_file().await?);
        }
        Ok(cache.as_ref().and_then(|slots| slots.get(key).cloned()))
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        self.update(|slots| {
            slots.insert(key.to_string(), value.to_string());
        })
        .await
    }

    async fn remove(&self, key: &str) -> Result<()> {
        self.update(|slots| {
            slots.remove(key);
        })
        .await
    }

    async fn set_many(&self, entries: &[(&str, String)]) -> Result<()> {
        self.update(|slots| {
            for (key, value) in entries {
                slots.insert((*key).to_string(), value.clone());
            }
        })
        .await
    }

    async fn remove_many(&self, keys: &[&str]) -> Result<()> {
        self.update(|slots| {
            for key in keys {
                slots.remove(*key);
            }
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    fn store_in(dir: &TempDir) -> FileSessionStore {
        FileSessionStore::new(dir.path().join("nested").join("session.json"))
    }

    #[test]
    fn values_survive_a_new_instance() {
        let dir = tempfile::tempdir().unwrap();
        tokio_test::block_on(async {
            let store = store_in(&dir);
            store.set_many(&[("a", "1".into()), ("b", "2".into())]).await.unwrap();
            store.remove("a").await.unwrap();

            let reopened = store_in(&dir);
            assert_eq!(reopened.get("a").await.unwrap(), None);
            assert_eq!(reopened.get("b").await.unwrap().as_deref(), Some("2"));
        });
    }

    #[tokio::test]
    async fn missing_file_reads_as_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);

        assert_eq!(store.get("anything").await.unwrap(), None);
        store.remove_many(&["a", "b"]).await.unwrap();
        assert!(!store.path().exists());
    }

    #[tokio::test]
    async fn corrupt_file_is_a_storage_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");
        std::fs::write(&path, "{ nope").unwrap();

        let err = FileSessionStore::new(&path).get("a").await.unwrap_err();
        assert!(matches!(err, NovemError::Storage(_)));
    }

    #[tokio::test]
    async fn no_temp_file_left_behind() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        store.set("a", "1").await.unwrap();

        let names: Vec<_> = std::fs::read_dir(dir.path().join("nested"))
            .unwrap()
            .map(|entry| entry.unwrap().file_name().into_string().unwrap())
            .collect();
        assert_eq!(names, vec!["session.json"]);
    }
}
