//! The generic observable field.

use std::sync::{Arc, Mutex};

use crate::{
    live::{LiveValue, ObserverHandle},
    scope::Scope,
};

const POISONED: &str = "field lock should not be poisoned";

type GetFn<T> = dyn Fn(Option<&Arc<LiveValue<T>>>, Option<&T>) -> Option<T> + Send + Sync;
type SetFn<T> = dyn Fn(Option<&Arc<LiveValue<T>>>, T) + Send + Sync;
type CleanFn<T> = dyn Fn(Option<&Arc<LiveValue<T>>>, Option<&T>) + Send + Sync;
type LiveFn<T> =
    dyn Fn(Option<&Arc<LiveValue<T>>>, Option<&T>) -> Option<Arc<LiveValue<T>>> + Send + Sync;

/// A persisted setting exposed as one generic value wrapper.
///
/// A field owns nothing but strategies: a getter, a setter, a cleaner, and an
/// observable provider, each handed the field's optional cell and default.
/// Declarations configure exactly one strategy set binding the field to a
/// specific store key and type, then use the field for the rest of the
/// process lifetime.
///
/// Unconfigured operations degrade softly instead of failing:
/// [`get`](Field::get) returns `None`, [`update`](Field::update) and
/// [`clear`](Field::clear) are no-ops, and the subscription methods do
/// nothing without a configured provider. A partially configured field is
/// usable but silently inert for its unconfigured operations.
///
/// Configuration is expected to complete before first use; the provided
/// observable is cached on first access, so reconfiguring the provider
/// afterwards has no effect.
pub struct Field<T> {
    cell: Option<Arc<LiveValue<T>>>,
    default: Option<T>,
    getter: Option<Box<GetFn<T>>>,
    setter: Option<Box<SetFn<T>>>,
    cleaner: Option<Box<CleanFn<T>>>,
    provider: Option<Box<LiveFn<T>>>,
    live: Mutex<Option<Arc<LiveValue<T>>>>,
}

impl<T: Clone + Send + Sync + 'static> Field<T> {
    /// Creates a field with no cell and no default.
    pub fn new() -> Self {
        Self {
            cell: None,
            default: None,
            getter: None,
            setter: None,
            cleaner: None,
            provider: None,
            live: Mutex::new(None),
        }
    }

    /// Creates a field with a default value.
    pub fn with_default(default: T) -> Self {
        let mut field = Self::new();
        field.default = Some(default);
        field
    }

    /// Creates a field around an externally supplied cell.
    pub fn with_cell(cell: Arc<LiveValue<T>>, default: Option<T>) -> Self {
        let mut field = Self::new();
        field.cell = Some(cell);
        field.default = default;
        field
    }

    /// Configures the read strategy.
    pub fn configure_get(
        mut self,
        getter: impl Fn(Option<&Arc<LiveValue<T>>>, Option<&T>) -> Option<T> + Send + Sync + 'static,
    ) -> Self {
        self.getter = Some(Box::new(getter));
        self
    }

    /// Configures the write strategy.
    pub fn configure_set(
        mut self,
        setter: impl Fn(Option<&Arc<LiveValue<T>>>, T) + Send + Sync + 'static,
    ) -> Self {
        self.setter = Some(Box::new(setter));
        self
    }

    /// Configures the clear strategy.
    pub fn configure_cleaner(
        mut self,
        cleaner: impl Fn(Option<&Arc<LiveValue<T>>>, Option<&T>) + Send + Sync + 'static,
    ) -> Self {
        self.cleaner = Some(Box::new(cleaner));
        self
    }

    /// Configures the observable provider.
    pub fn configure_live(
        mut self,
        provider: impl Fn(Option<&Arc<LiveValue<T>>>, Option<&T>) -> Option<Arc<LiveValue<T>>>
            + Send
            + Sync
            + 'static,
    ) -> Self {
        self.provider = Some(Box::new(provider));
        self
    }

    /// Reads the current value through the getter strategy, or `None` when
    /// no getter is configured. Synchronous.
    pub fn get(&self) -> Option<T> {
        self.getter
            .as_ref()
            .and_then(|getter| getter(self.cell.as_ref(), self.default.as_ref()))
    }

    /// Persists a value through the setter strategy; a no-op when no setter
    /// is configured. Any live observable on the same key picks the change
    /// up through the store's notification side-channel.
    pub fn update(&self, value: T) -> &Self {
        if let Some(setter) = &self.setter {
            setter(self.cell.as_ref(), value);
        }
        self
    }

    /// Evaluates `producer` and forwards to [`update`](Self::update).
    pub fn update_with(&self, producer: impl FnOnce() -> T) -> &Self {
        self.update(producer())
    }

    /// Clears the persisted value through the cleaner strategy; a no-op when
    /// no cleaner is configured.
    pub fn clear(&self) {
        if let Some(cleaner) = &self.cleaner {
            cleaner(self.cell.as_ref(), self.default.as_ref());
        }
    }

    /// The field's backing observable: created through the provider on first
    /// access and cached for every later call, so all subscription methods
    /// share one observable (and one activation lifecycle).
    pub fn live(&self) -> Option<Arc<LiveValue<T>>> {
        let mut live = self.live.lock().expect(POISONED);
        if live.is_none() {
            *live = self
                .provider
                .as_ref()
                .and_then(|provider| provider(self.cell.as_ref(), self.default.as_ref()));
        }
        live.clone()
    }

    /// Observes the field for the lifetime of `scope`. Delivers the current
    /// persisted value synchronously, then every subsequent change.
    ///
    /// Returns `None` when no provider is configured or the scope has ended.
    pub fn observe(
        &self,
        scope: &Scope,
        observer: impl Fn(&T) + Send + Sync + 'static,
    ) -> Option<ObserverHandle> {
        self.live().and_then(|live| live.observe(scope, observer))
    }

    /// Observes the field for exactly one delivery (the current persisted
    /// value), then detaches automatically.
    pub fn fetch(
        &self,
        scope: &Scope,
        observer: impl Fn(&T) + Send + Sync + 'static,
    ) -> Option<ObserverHandle> {
        self.live()
            .and_then(|live| live.observe_once(scope, observer))
    }

    /// Observes the field without lifecycle scoping. The caller must pair
    /// this with [`remove_observer`](Self::remove_observer), otherwise the
    /// backing value stays active indefinitely.
    pub fn observe_forever(
        &self,
        observer: impl Fn(&T) + Send + Sync + 'static,
    ) -> Option<ObserverHandle> {
        self.live().map(|live| live.observe_forever(observer))
    }

    /// Detaches one observer from the backing observable.
    pub fn remove_observer(&self, handle: ObserverHandle) {
        if let Some(live) = self.live() {
            live.remove_observer(handle);
        }
    }

    /// Detaches every observer attached through `scope`.
    pub fn remove_scope(&self, scope: &Scope) {
        if let Some(live) = self.live() {
            live.remove_scope(scope);
        }
    }
}

impl<T: Clone + Send + Sync + 'static> Default for Field<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> std::fmt::Debug for Field<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Field")
            .field("getter", &self.getter.is_some())
            .field("setter", &self.setter.is_some())
            .field("cleaner", &self.cleaner.is_some())
            .field("provider", &self.provider.is_some())
            .finish()
    }
}
