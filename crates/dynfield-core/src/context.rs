//! The application context handle.

use std::{
    path::{Path, PathBuf},
    sync::OnceLock,
};

use dynfield_crypto::{CryptoError, MasterKey};
use tracing::debug;

/// Name of the master key file inside the data directory.
const MASTER_KEY_FILE: &str = "master.key";

/// The application-scoped handle needed to open preference stores.
///
/// Owns the on-device data directory and lazily provides the process master
/// key, created on first use as a key file inside that directory. The host
/// application creates one `AppContext` at startup, keeps it alive in an
/// `Arc` for the process lifetime, and hands it to [`crate::on_create`];
/// everything else in the library only ever holds it weakly.
pub struct AppContext {
    data_dir: PathBuf,
    master_key: OnceLock<MasterKey>,
}

impl AppContext {
    /// Creates a context rooted at the given data directory.
    ///
    /// The directory does not need to exist yet; it is created when the
    /// master key or a store file is first written.
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            master_key: OnceLock::new(),
        }
    }

    /// The directory store files and the master key file live in.
    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// The process master key, loaded or created on first access.
    pub fn master_key(&self) -> Result<&MasterKey, CryptoError> {
        if let Some(key) = self.master_key.get() {
            return Ok(key);
        }
        let path = self.data_dir.join(MASTER_KEY_FILE);
        let key = MasterKey::load_or_create(&path)?;
        debug!(path = %path.display(), "master key ready");
        Ok(self.master_key.get_or_init(|| key))
    }
}

impl std::fmt::Debug for AppContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppContext")
            .field("data_dir", &self.data_dir)
            .finish()
    }
}
