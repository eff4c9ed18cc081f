//! Key material for preference stores.
//!
//! The process holds a single [`MasterKey`], persisted as a key file inside
//! the application data directory on first use. Every named store encrypts
//! its document with its own [`StoreKey`], derived from the master key with
//! HKDF-SHA256 using the qualified store name as the `info` input, so stores
//! never share a key and renaming a store invalidates its old document.

use std::{
    fs,
    io::{self, Write},
    path::Path,
};

use hkdf::Hkdf;
use rand::RngCore;
use sha2::Sha256;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::CryptoError;

/// Size of encryption keys in bytes (256 bits).
pub const KEY_SIZE: usize = 32;

/// The process-wide root key.
///
/// Zeroized on drop; never printed.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct MasterKey {
    bytes: [u8; KEY_SIZE],
}

impl MasterKey {
    /// Creates a master key from raw bytes.
    pub fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self { bytes }
    }

    /// Generates a random master key from the OS RNG.
    pub fn generate() -> Self {
        let mut bytes = [0u8; KEY_SIZE];
        rand::rngs::OsRng.fill_bytes(&mut bytes);
        Self { bytes }
    }

    /// Reads the key file at `path`, or generates a fresh key and persists it
    /// there if the file does not exist yet.
    ///
    /// The key file is created with mode `0600` on unix. If two processes (or
    /// threads) race to create it, the loser re-reads the winner's file, so
    /// both end up with the same key.
    pub fn load_or_create(path: &Path) -> Result<Self, CryptoError> {
        match fs::read(path) {
            Ok(bytes) => {
                let bytes: [u8; KEY_SIZE] =
                    bytes
                        .as_slice()
                        .try_into()
                        .map_err(|_| CryptoError::InvalidKeyFile {
                            path: path.to_path_buf(),
                            expected: KEY_SIZE,
                            actual: bytes.len(),
                        })?;
                Ok(Self::from_bytes(bytes))
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                if let Some(parent) = path.parent() {
                    fs::create_dir_all(parent)?;
                }
                let key = Self::generate();
                match write_key_file(path, &key.bytes) {
                    Ok(()) => Ok(key),
                    // Lost the creation race; the existing file wins.
                    Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                        Self::load_or_create(path)
                    }
                    Err(e) => Err(e.into()),
                }
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Derives the encryption key for the store with the given qualified name.
    pub fn derive_store_key(&self, store_name: &str) -> StoreKey {
        let hkdf = Hkdf::<Sha256>::new(None, &self.bytes);
        let mut okm = [0u8; KEY_SIZE];
        hkdf.expand(store_name.as_bytes(), &mut okm)
            .expect("32 bytes is a valid HKDF-SHA256 output length");
        StoreKey { bytes: okm }
    }
}

impl std::fmt::Debug for MasterKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MasterKey")
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}

/// A per-store encryption key derived from the [`MasterKey`].
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct StoreKey {
    bytes: [u8; KEY_SIZE],
}

impl StoreKey {
    pub(crate) fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.bytes
    }
}

impl std::fmt::Debug for StoreKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreKey")
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}

fn write_key_file(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let mut options = fs::OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    let mut file = options.open(path)?;
    file.write_all(bytes)?;
    file.sync_all()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_or_create_persists_and_reloads() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("master.key");

        let first = MasterKey::load_or_create(&path).unwrap();
        let second = MasterKey::load_or_create(&path).unwrap();
        assert_eq!(first.bytes, second.bytes);
    }

    #[test]
    fn load_or_create_creates_missing_directories() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("keys").join("master.key");

        MasterKey::load_or_create(&path).unwrap();
        assert!(path.is_file());
    }

    #[test]
    fn malformed_key_file_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("master.key");
        std::fs::write(&path, b"short").unwrap();

        let err = MasterKey::load_or_create(&path).unwrap_err();
        assert!(matches!(
            err,
            CryptoError::InvalidKeyFile { actual: 5, .. }
        ));
    }

    #[test]
    fn store_keys_are_deterministic_per_name() {
        let master = MasterKey::from_bytes([7u8; KEY_SIZE]);

        let a1 = master.derive_store_key("io.dynfield.settings");
        let a2 = master.derive_store_key("io.dynfield.settings");
        let b = master.derive_store_key("io.dynfield.cache");

        assert_eq!(a1.bytes, a2.bytes);
        assert_ne!(a1.bytes, b.bytes);
    }

    #[test]
    fn debug_output_redacts_key_material() {
        let master = MasterKey::from_bytes([7u8; KEY_SIZE]);
        let rendered = format!("{master:?}");
        assert!(rendered.contains("REDACTED"));
        assert!(!rendered.contains('7'));
    }
}
