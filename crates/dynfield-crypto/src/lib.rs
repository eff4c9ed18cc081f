#![doc = include_str!("../README.md")]

mod error;
mod key;
mod seal;

pub use error::CryptoError;
pub use key::{MasterKey, StoreKey, KEY_SIZE};
pub use seal::{open, seal, NONCE_SIZE, TAG_SIZE};
