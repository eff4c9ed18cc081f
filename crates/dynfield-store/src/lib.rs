#![doc = include_str!("../README.md")]

mod codec;
mod error;
mod store;
mod value;

pub use codec::{OrdinalEnum, TIMESTAMP_FORMAT};
pub use error::StoreError;
pub use store::{ChangeEvent, ListenerHandle, PreferenceStore, LIBRARY_NAMESPACE};
pub use value::Value;
