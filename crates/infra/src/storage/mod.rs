//! Session store adapters
//!
//! - [`MemorySessionStore`]: process-local, nothing survives a restart
//! - [`FileSessionStore`]: one JSON document on disk
//! - [`KeychainSessionStore`]: the platform credential store

mod file;
mod keychain;
mod memory;

use std::path::PathBuf;
use std::sync::Arc;

pub use file::FileSessionStore;
pub use keychain::KeychainSessionStore;
pub use memory::MemorySessionStore;
use novem_core::SessionStore;
use novem_domain::{SessionStoreKind, StorageConfig};

const SESSION_FILE_NAME: &str = "session.json";

/// Build the store selected by configuration.
pub fn build_session_store(config: &StorageConfig) -> Arc<dyn SessionStore> {
    match config.session_store {
        SessionStoreKind::Memory => Arc::new(MemorySessionStore::new()),
        SessionStoreKind::File => {
            let path = config.session_path.clone().unwrap_or_else(default_session_path);
            Arc::new(FileSessionStore::new(path))
        }
        SessionStoreKind::Keychain => Arc::new(KeychainSessionStore::new(&config.keychain_service)),
    }
}

/// `<data dir>/novem/session.json`, or the working directory when the
/// platform has no data dir.
pub fn default_session_path() -> PathBuf {
    dirs::data_local_dir().unwrap_or_else(|| PathBuf::from(".")).join("novem").join(SESSION_FILE_NAME)
}
