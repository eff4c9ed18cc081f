use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while managing keys or sealing store documents.
#[derive(Debug, Error)]
pub enum CryptoError {
    /// The key file on disk does not contain exactly [`KEY_SIZE`](crate::KEY_SIZE) bytes.
    #[error("key file {path} is malformed: expected {expected} bytes, got {actual}")]
    InvalidKeyFile {
        /// Location of the offending key file.
        path: PathBuf,
        /// Expected key length in bytes.
        expected: usize,
        /// Actual file length in bytes.
        actual: usize,
    },

    /// Encryption failed.
    #[error("failed to seal store document")]
    Encrypt,

    /// Decryption failed. The blob is truncated, tampered with, or sealed
    /// under a different key.
    #[error("failed to open store document: wrong key or tampered data")]
    Decrypt,

    /// Reading or writing key material failed.
    #[error("key file io: {0}")]
    Io(#[from] std::io::Error),
}
