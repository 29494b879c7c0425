use async_trait::async_trait;
use keyring::Entry;
use novem_core::SessionStore;
use novem_domain::{NovemError, Result};
use tracing::debug;

use crate::errors::InfraError;

/// Session store backed by the platform keychain.
///
/// Each slot is one credential entry under `service`. Keychain calls are
/// blocking and run on the blocking pool.
#[derive(Debug, Clone)]
pub struct KeychainSessionStore {
    service: String,
}

impl KeychainSessionStore {
    pub fn new(service: impl Into<String>) -> Self {
        Self { service: service.into() }
    }

    pub fn service(&self) -> &str {
        &self.service
    }

    async fn blocking<T, F>(&self, key: &str, op: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(Entry) -> std::result::Result<T, keyring::Error> + Send + 'static,
    {
        let entry = Entry::new(&self.service, key).map_err(InfraError::from)?;
        tokio::task::spawn_blocking(move || op(entry))
            .await
            .map_err(|err| NovemError::Internal(format!("keychain task failed: {err}")))?
            .map_err(|err| InfraError::from(err).into())
    }
}

#[async_trait]
impl SessionStore for KeychainSessionStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        debug!(service = %self.service, key = %key, "Reading keychain slot");
        self.blocking(key, |entry| match entry.get_password() {
            Ok(value) => Ok(Some(value)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(err) => Err(err),
        })
        .await
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        debug!(service = %self.service, key = %key, "Writing keychain slot");
        let value = value.to_string();
        self.blocking(key, move |entry| entry.set_password(&value)).await
    }

    async fn remove(&self, key: &str) -> Result<()> {
        debug!(service = %self.service, key = %key, "Deleting keychain slot");
        self.blocking(key, |entry| match entry.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(err) => Err(err),
        })
        .await
    }
}
