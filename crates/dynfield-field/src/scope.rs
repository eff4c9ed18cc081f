//! Lifecycle scopes for subscriptions.

use std::sync::{
    atomic::{AtomicBool, AtomicU64, Ordering},
    Arc, Mutex,
};

static NEXT_SCOPE_ID: AtomicU64 = AtomicU64::new(0);

const POISONED: &str = "scope lock should not be poisoned";

/// A lifecycle token bounding how long observers stay subscribed.
///
/// Observers attached with a scope are detached when the scope ends, either
/// through an explicit [`end`](Scope::end) or when the last clone of the
/// scope is dropped. Clones share the same token; ending any of them ends
/// all of them. Attaching an observer against an already-ended scope is
/// refused.
#[derive(Clone)]
pub struct Scope {
    inner: Arc<ScopeInner>,
}

struct ScopeInner {
    id: u64,
    ended: AtomicBool,
    on_end: Mutex<Vec<Box<dyn FnOnce() + Send>>>,
}

impl Scope {
    /// Creates a fresh, un-ended scope.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(ScopeInner {
                id: NEXT_SCOPE_ID.fetch_add(1, Ordering::Relaxed),
                ended: AtomicBool::new(false),
                on_end: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Ends the scope, detaching every observer attached through it.
    /// Idempotent; detach callbacks run exactly once.
    pub fn end(&self) {
        self.inner.finish();
    }

    /// Whether the scope has ended.
    pub fn is_ended(&self) -> bool {
        self.inner.ended.load(Ordering::SeqCst)
    }

    pub(crate) fn id(&self) -> u64 {
        self.inner.id
    }

    /// Registers a callback to run when the scope ends. Returns `false`
    /// (without registering) if the scope has already ended.
    pub(crate) fn on_end(&self, callback: Box<dyn FnOnce() + Send>) -> bool {
        let mut callbacks = self.inner.on_end.lock().expect(POISONED);
        // Checked under the lock: `finish` flips the flag before draining,
        // so seeing `false` here means the drain has not happened yet and
        // the callback will be picked up.
        if self.inner.ended.load(Ordering::SeqCst) {
            return false;
        }
        callbacks.push(callback);
        true
    }
}

impl ScopeInner {
    fn finish(&self) {
        if self.ended.swap(true, Ordering::SeqCst) {
            return;
        }
        let callbacks = std::mem::take(&mut *self.on_end.lock().expect(POISONED));
        for callback in callbacks {
            callback();
        }
    }
}

impl Drop for ScopeInner {
    fn drop(&mut self) {
        self.finish();
    }
}

impl Default for Scope {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Scope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scope")
            .field("id", &self.inner.id)
            .field("ended", &self.is_ended())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use super::*;

    #[test]
    fn end_runs_callbacks_exactly_once() {
        let scope = Scope::new();
        let calls = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&calls);
        assert!(scope.on_end(Box::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        })));

        scope.end();
        scope.end();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(scope.is_ended());
    }

    #[test]
    fn callbacks_after_end_are_refused() {
        let scope = Scope::new();
        scope.end();
        assert!(!scope.on_end(Box::new(|| ())));
    }

    #[test]
    fn clones_share_the_token() {
        let scope = Scope::new();
        let clone = scope.clone();
        assert_eq!(scope.id(), clone.id());

        clone.end();
        assert!(scope.is_ended());
    }

    #[test]
    fn dropping_the_last_clone_ends_the_scope() {
        let calls = Arc::new(AtomicUsize::new(0));
        {
            let scope = Scope::new();
            let counter = Arc::clone(&calls);
            scope.on_end(Box::new(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            }));
            let _clone = scope.clone();
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
