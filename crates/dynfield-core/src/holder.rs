//! The weak context slot.

use std::sync::{Arc, RwLock, Weak};

use thiserror::Error;

use crate::context::AppContext;

/// Error returned when a required [`AppContext`] is unavailable.
#[derive(Debug, Error)]
pub enum ContextError {
    /// No context has been set, or the one that was set has been dropped.
    #[error("application context has not been set or has been dropped")]
    Missing,
}

/// A slot holding at most one weak reference to an [`AppContext`].
///
/// The slot never extends the context's lifetime: once the host application
/// drops its `Arc`, [`get`](ContextHolder::get) returns `None` and
/// [`require`](ContextHolder::require) fails, regardless of whether
/// [`clear`](ContextHolder::clear) ran.
pub struct ContextHolder {
    slot: RwLock<Option<Weak<AppContext>>>,
}

impl ContextHolder {
    /// Creates an empty holder.
    pub const fn new() -> Self {
        Self {
            slot: RwLock::new(None),
        }
    }

    /// Returns the held context if it is still alive. Never fails.
    pub fn get(&self) -> Option<Arc<AppContext>> {
        self.slot
            .read()
            .expect("context slot lock should not be poisoned")
            .as_ref()
            .and_then(Weak::upgrade)
    }

    /// Returns the held context, or [`ContextError::Missing`] if none is alive.
    pub fn require(&self) -> Result<Arc<AppContext>, ContextError> {
        self.get().ok_or(ContextError::Missing)
    }

    /// Replaces the held reference. `None` is a no-op preserving the
    /// previous value.
    pub fn set(&self, context: Option<&Arc<AppContext>>) {
        let Some(context) = context else { return };
        *self
            .slot
            .write()
            .expect("context slot lock should not be poisoned") = Some(Arc::downgrade(context));
    }

    /// Drops the held reference. Idempotent.
    pub fn clear(&self) {
        *self
            .slot
            .write()
            .expect("context slot lock should not be poisoned") = None;
    }
}

impl Default for ContextHolder {
    fn default() -> Self {
        Self::new()
    }
}

/// The process-wide holder, seeded by [`crate::on_create`].
static HOLDER: ContextHolder = ContextHolder::new();

/// Returns the process-wide context if one is alive.
pub fn context() -> Option<Arc<AppContext>> {
    HOLDER.get()
}

/// Returns the process-wide context, failing if none is alive.
pub fn require_context() -> Result<Arc<AppContext>, ContextError> {
    HOLDER.require()
}

/// Replaces the process-wide context. `None` is a no-op.
pub fn set_context(context: Option<&Arc<AppContext>>) {
    HOLDER.set(context);
}

/// Drops the process-wide context reference. Idempotent.
pub fn clear_context() {
    HOLDER.clear();
}
