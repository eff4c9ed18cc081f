//! Sealed-blob encryption for store documents.
//!
//! A sealed blob is `nonce(24) || ciphertext+tag`, produced with
//! XChaCha20-Poly1305 under a per-store key. The nonce is random per seal, so
//! every write of a store document produces a fresh blob.

use chacha20poly1305::{
    aead::Aead, AeadCore, Key, KeyInit, XChaCha20Poly1305, XNonce,
};

use crate::{error::CryptoError, key::StoreKey};

/// Size of the nonce prefix in bytes (192 bits for XChaCha20-Poly1305).
pub const NONCE_SIZE: usize = 24;

/// Size of the authentication tag in bytes.
pub const TAG_SIZE: usize = 16;

/// Seals `plaintext` under `key`, returning `nonce || ciphertext+tag`.
pub fn seal(key: &StoreKey, plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
    let cipher = XChaCha20Poly1305::new(Key::from_slice(key.as_bytes()));
    let nonce = XChaCha20Poly1305::generate_nonce(rand::thread_rng());

    let ciphertext = cipher
        .encrypt(&nonce, plaintext)
        .map_err(|_| CryptoError::Encrypt)?;

    let mut blob = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
    blob.extend_from_slice(nonce.as_slice());
    blob.extend_from_slice(&ciphertext);
    Ok(blob)
}

/// Opens a sealed blob, returning the plaintext.
///
/// Fails with [`CryptoError::Decrypt`] for truncated or tampered blobs and
/// for blobs sealed under a different key.
pub fn open(key: &StoreKey, blob: &[u8]) -> Result<Vec<u8>, CryptoError> {
    if blob.len() < NONCE_SIZE + TAG_SIZE {
        return Err(CryptoError::Decrypt);
    }
    let (nonce, ciphertext) = blob.split_at(NONCE_SIZE);

    let cipher = XChaCha20Poly1305::new(Key::from_slice(key.as_bytes()));
    cipher
        .decrypt(XNonce::from_slice(nonce), ciphertext)
        .map_err(|_| CryptoError::Decrypt)
}
