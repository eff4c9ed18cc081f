#![doc = include_str!("../README.md")]

mod context;
mod holder;

pub use context::AppContext;
pub use holder::{
    clear_context, context, require_context, set_context, ContextError, ContextHolder,
};

use std::sync::Arc;

/// Seeds the process-wide context slot. Call once at process start, before
/// opening any store without an explicit context.
pub fn on_create(context: &Arc<AppContext>) {
    holder::set_context(Some(context));
}

/// Clears the process-wide context slot. Call at process teardown.
pub fn on_destroy() {
    holder::clear_context();
}
