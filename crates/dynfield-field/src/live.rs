//! Typed observable values.

use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc, Mutex,
};

use dynfield_store::{ChangeEvent, ListenerHandle, PreferenceStore};

use crate::scope::Scope;

const POISONED: &str = "live value lock should not be poisoned";

/// Identifies an attached observer, for [`LiveValue::remove_observer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObserverHandle(u64);

type Observer<T> = dyn Fn(&T) + Send + Sync;

struct ObserverEntry<T> {
    id: u64,
    scope: Option<u64>,
    once: bool,
    observer: Arc<Observer<T>>,
}

/// A store-backed value's upstream: how to re-read it, and the live
/// store-listener registration while the value is active.
struct LiveSource<T> {
    store: Arc<PreferenceStore>,
    key: String,
    read: Box<dyn Fn(&PreferenceStore) -> T + Send + Sync>,
    subscription: Mutex<Option<ListenerHandle>>,
}

/// A typed observable value.
///
/// Two flavors share this type: a plain mutable cell
/// ([`cell`](LiveValue::cell)) published through
/// [`set_value`](LiveValue::set_value), and a store-backed value
/// ([`backed`](LiveValue::backed)) bound to a `(store, key, default)` triple.
///
/// A store-backed value is *active* while it has at least one observer.
/// Gaining the first observer re-reads the persisted value synchronously
/// before anyone is notified, then registers a store change listener; a
/// matching change re-reads and republishes to observers in registration
/// order, synchronously on the writing thread; losing the last observer
/// deregisters the listener. Changes committed while inactive are not
/// replayed — the next activation simply reads fresh. A newly attached
/// observer is always delivered the current value at attach time.
///
/// There is no write path on a store-backed value: it couples to the store
/// only through the change-listener side-channel, so writes that bypass the
/// owning field are still observed.
pub struct LiveValue<T> {
    source: Option<LiveSource<T>>,
    value: Mutex<Option<T>>,
    observers: Mutex<Vec<ObserverEntry<T>>>,
    next_observer_id: AtomicU64,
}

impl<T: Clone + Send + Sync + 'static> LiveValue<T> {
    /// Creates a plain mutable cell, optionally seeded with an initial value.
    pub fn cell(initial: Option<T>) -> Arc<Self> {
        Arc::new(Self {
            source: None,
            value: Mutex::new(initial),
            observers: Mutex::new(Vec::new()),
            next_observer_id: AtomicU64::new(0),
        })
    }

    /// Creates a value backed by a store key. `read` performs the typed,
    /// default-substituting read; it runs at activation and after every
    /// matching change notification.
    pub fn backed(
        store: Arc<PreferenceStore>,
        key: impl Into<String>,
        read: impl Fn(&PreferenceStore) -> T + Send + Sync + 'static,
    ) -> Arc<Self> {
        Arc::new(Self {
            source: Some(LiveSource {
                store,
                key: key.into(),
                read: Box::new(read),
                subscription: Mutex::new(None),
            }),
            value: Mutex::new(None),
            observers: Mutex::new(Vec::new()),
            next_observer_id: AtomicU64::new(0),
        })
    }

    /// The current value, if one has been published or read yet.
    pub fn value(&self) -> Option<T> {
        self.value.lock().expect(POISONED).clone()
    }

    /// Whether any observer is attached.
    pub fn has_observers(&self) -> bool {
        !self.observers.lock().expect(POISONED).is_empty()
    }

    /// Publishes a value to the cell and to every observer.
    ///
    /// Meant for plain cells; on a store-backed value the published value is
    /// transient and will be overwritten by the next store re-read.
    pub fn set_value(&self, value: T) {
        self.publish(value);
    }

    /// Attaches `observer` for the lifetime of `scope`. Returns `None` if
    /// the scope has already ended. The observer is delivered the current
    /// value synchronously before this returns.
    pub fn observe(
        self: &Arc<Self>,
        scope: &Scope,
        observer: impl Fn(&T) + Send + Sync + 'static,
    ) -> Option<ObserverHandle> {
        self.attach(Some(scope), false, Arc::new(observer))
    }

    /// Attaches `observer` for exactly one delivery, then detaches it.
    ///
    /// Activation publishes synchronously, so for store-backed values the
    /// single delivery happens before this returns.
    pub fn observe_once(
        self: &Arc<Self>,
        scope: &Scope,
        observer: impl Fn(&T) + Send + Sync + 'static,
    ) -> Option<ObserverHandle> {
        self.attach(Some(scope), true, Arc::new(observer))
    }

    /// Attaches `observer` without any lifecycle scoping. The caller is
    /// responsible for a matching [`remove_observer`](Self::remove_observer),
    /// otherwise the value stays active indefinitely.
    pub fn observe_forever(
        self: &Arc<Self>,
        observer: impl Fn(&T) + Send + Sync + 'static,
    ) -> ObserverHandle {
        self.attach(None, false, Arc::new(observer))
            .expect("unscoped observers are always attached")
    }

    /// Detaches one observer. Unknown handles are ignored. May deactivate
    /// the value if this was the last observer.
    pub fn remove_observer(&self, handle: ObserverHandle) {
        let became_inactive = {
            let mut observers = self.observers.lock().expect(POISONED);
            let before = observers.len();
            observers.retain(|entry| entry.id != handle.0);
            observers.len() != before && observers.is_empty()
        };
        if became_inactive {
            self.deactivate();
        }
    }

    /// Detaches every observer attached through `scope`.
    pub fn remove_scope(&self, scope: &Scope) {
        let scope_id = scope.id();
        let became_inactive = {
            let mut observers = self.observers.lock().expect(POISONED);
            let before = observers.len();
            observers.retain(|entry| entry.scope != Some(scope_id));
            observers.len() != before && observers.is_empty()
        };
        if became_inactive {
            self.deactivate();
        }
    }

    fn attach(
        self: &Arc<Self>,
        scope: Option<&Scope>,
        once: bool,
        observer: Arc<Observer<T>>,
    ) -> Option<ObserverHandle> {
        if scope.is_some_and(Scope::is_ended) {
            return None;
        }
        let id = self.next_observer_id.fetch_add(1, Ordering::Relaxed);
        let handle = ObserverHandle(id);

        let became_active = {
            let mut observers = self.observers.lock().expect(POISONED);
            let was_inactive = observers.is_empty();
            observers.push(ObserverEntry {
                id,
                scope: scope.map(Scope::id),
                once,
                observer: Arc::clone(&observer),
            });
            was_inactive
        };
        if became_active {
            self.activate();
        }

        if let Some(scope) = scope {
            let weak = Arc::downgrade(self);
            let registered = scope.on_end(Box::new(move || {
                if let Some(live) = weak.upgrade() {
                    live.remove_observer(handle);
                }
            }));
            if !registered {
                // The scope ended while we were attaching.
                self.remove_observer(handle);
                return None;
            }
        }

        let current = self.value.lock().expect(POISONED).clone();
        if let Some(current) = current {
            observer(&current);
            if once {
                self.remove_observer(handle);
            }
        }
        Some(handle)
    }

    /// First observer attached: read fresh from the store, then start
    /// listening for changes.
    fn activate(self: &Arc<Self>) {
        let Some(source) = &self.source else { return };
        let fresh = (source.read)(&source.store);
        *self.value.lock().expect(POISONED) = Some(fresh);

        let weak = Arc::downgrade(self);
        let key = source.key.clone();
        let handle = source.store.subscribe(move |event| {
            let matches = match event {
                ChangeEvent::Key(changed) => *changed == key,
                ChangeEvent::Cleared => true,
            };
            if !matches {
                return;
            }
            if let Some(live) = weak.upgrade() {
                live.refresh();
            }
        });
        *source.subscription.lock().expect(POISONED) = Some(handle);
    }

    fn deactivate(&self) {
        let Some(source) = &self.source else { return };
        if let Some(handle) = source.subscription.lock().expect(POISONED).take() {
            source.store.unsubscribe(handle);
        }
    }

    fn refresh(&self) {
        let Some(source) = &self.source else { return };
        let fresh = (source.read)(&source.store);
        self.publish(fresh);
    }

    fn publish(&self, value: T) {
        *self.value.lock().expect(POISONED) = Some(value.clone());

        // Snapshot so observers can attach, detach, or write back into the
        // store without deadlocking.
        let snapshot: Vec<(u64, bool, Arc<Observer<T>>)> = self
            .observers
            .lock()
            .expect(POISONED)
            .iter()
            .map(|entry| (entry.id, entry.once, Arc::clone(&entry.observer)))
            .collect();

        let mut spent = Vec::new();
        for (id, once, observer) in snapshot {
            observer(&value);
            if once {
                spent.push(id);
            }
        }
        for id in spent {
            self.remove_observer(ObserverHandle(id));
        }
    }
}

impl<T> std::fmt::Debug for LiveValue<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = if self.source.is_some() { "backed" } else { "cell" };
        f.debug_struct("LiveValue").field("kind", &kind).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn collected<T: Clone + Send + Sync + 'static>() -> (Arc<Mutex<Vec<T>>>, impl Fn(&T) + Send + Sync + 'static)
    {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        (seen, move |value: &T| sink.lock().expect("test lock").push(value.clone()))
    }

    #[test]
    fn a_seeded_cell_delivers_its_value_at_attach() {
        let cell = LiveValue::cell(Some(10));
        let (seen, observer) = collected();

        let scope = Scope::new();
        cell.observe(&scope, observer).unwrap();
        assert_eq!(*seen.lock().expect("test lock"), vec![10]);
    }

    #[test]
    fn an_unseeded_cell_delivers_nothing_until_set() {
        let cell = LiveValue::cell(None);
        let (seen, observer) = collected();

        let scope = Scope::new();
        cell.observe(&scope, observer).unwrap();
        assert!(seen.lock().expect("test lock").is_empty());

        cell.set_value(1);
        cell.set_value(2);
        assert_eq!(*seen.lock().expect("test lock"), vec![1, 2]);
    }

    #[test]
    fn observers_are_notified_in_registration_order() {
        let cell = LiveValue::cell(None);
        let order = Arc::new(Mutex::new(Vec::new()));

        let scope = Scope::new();
        let first = Arc::clone(&order);
        cell.observe(&scope, move |v: &i32| first.lock().expect("test lock").push(("a", *v)));
        let second = Arc::clone(&order);
        cell.observe(&scope, move |v: &i32| second.lock().expect("test lock").push(("b", *v)));

        cell.set_value(5);
        assert_eq!(
            *order.lock().expect("test lock"),
            vec![("a", 5), ("b", 5)]
        );
    }

    #[test]
    fn observe_once_detaches_after_one_delivery() {
        let cell = LiveValue::cell(None);
        let (seen, observer) = collected();

        let scope = Scope::new();
        cell.observe_once(&scope, observer).unwrap();
        cell.set_value(1);
        cell.set_value(2);

        assert_eq!(*seen.lock().expect("test lock"), vec![1]);
        assert!(!cell.has_observers());
    }

    #[test]
    fn observe_once_on_a_seeded_cell_fires_immediately() {
        let cell = LiveValue::cell(Some(9));
        let (seen, observer) = collected();

        let scope = Scope::new();
        cell.observe_once(&scope, observer).unwrap();
        cell.set_value(10);

        assert_eq!(*seen.lock().expect("test lock"), vec![9]);
    }

    #[test]
    fn removed_observers_receive_nothing() {
        let cell = LiveValue::cell(None);
        let (seen, observer) = collected();

        let handle = cell.observe_forever(observer);
        cell.set_value(1);
        cell.remove_observer(handle);
        cell.set_value(2);

        assert_eq!(*seen.lock().expect("test lock"), vec![1]);
    }

    #[test]
    fn ending_a_scope_detaches_its_observers() {
        let cell = LiveValue::cell(None);
        let (seen, observer) = collected();

        let scope = Scope::new();
        cell.observe(&scope, observer).unwrap();
        cell.set_value(1);
        scope.end();
        cell.set_value(2);

        assert_eq!(*seen.lock().expect("test lock"), vec![1]);
        assert!(!cell.has_observers());
    }

    #[test]
    fn observing_an_ended_scope_is_refused() {
        let cell = LiveValue::cell(Some(1));
        let scope = Scope::new();
        scope.end();

        let (seen, observer) = collected::<i32>();
        assert!(cell.observe(&scope, observer).is_none());
        assert!(seen.lock().expect("test lock").is_empty());
        assert!(!cell.has_observers());
    }

    #[test]
    fn remove_scope_detaches_only_that_scope() {
        let cell = LiveValue::cell(None);
        let (seen_a, observer_a) = collected();
        let (seen_b, observer_b) = collected();

        let scope_a = Scope::new();
        let scope_b = Scope::new();
        cell.observe(&scope_a, observer_a).unwrap();
        cell.observe(&scope_b, observer_b).unwrap();

        cell.remove_scope(&scope_a);
        cell.set_value(3);

        assert!(seen_a.lock().expect("test lock").is_empty());
        assert_eq!(*seen_b.lock().expect("test lock"), vec![3]);
    }
}
