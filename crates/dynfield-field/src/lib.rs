#![doc = include_str!("../README.md")]

mod field;
mod live;
mod scope;
mod store_live;

pub use field::Field;
pub use live::{LiveValue, ObserverHandle};
pub use scope::Scope;
pub use store_live::StoreLive;
