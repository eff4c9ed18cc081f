use dynfield_core::ContextError;
use dynfield_crypto::CryptoError;
use thiserror::Error;

/// Errors that can occur while opening or mutating a preference store.
///
/// Reads never fail: a missing or undecodable value substitutes the caller's
/// default (and logs a warning for the undecodable case).
#[derive(Debug, Error)]
pub enum StoreError {
    /// No application context was supplied and none is held process-wide.
    #[error(transparent)]
    Context(#[from] ContextError),

    /// Key material could not be loaded or the store document could not be
    /// sealed or opened.
    #[error(transparent)]
    Crypto(#[from] CryptoError),

    /// The decrypted store document is not a valid preference map.
    #[error("store document is corrupt: {0}")]
    Corrupt(#[from] serde_json::Error),

    /// Reading or writing the store file failed.
    #[error("store file io: {0}")]
    Io(#[from] std::io::Error),
}
