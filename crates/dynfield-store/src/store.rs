//! The encrypted preference store.

use std::{
    collections::{BTreeMap, BTreeSet},
    fs,
    io::{self, Write},
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, Mutex, Weak,
    },
};

use chrono::NaiveDateTime;
use dynfield_core::AppContext;
use dynfield_crypto::StoreKey;
use tracing::{debug, warn};

use crate::{
    codec::{self, OrdinalEnum},
    error::StoreError,
    value::Value,
};

/// Namespace prefix for store names opened through [`PreferenceStore::open`].
pub const LIBRARY_NAMESPACE: &str = "io.dynfield";

/// File extension of store documents inside the data directory.
const STORE_FILE_EXTENSION: &str = "pref";

const POISONED: &str = "store lock should not be poisoned";

/// A change committed to a store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeEvent {
    /// A single entry was written or removed.
    Key(String),
    /// The whole store was cleared.
    Cleared,
}

/// Identifies a registered change listener, for [`PreferenceStore::unsubscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListenerHandle(u64);

type ChangeListener = dyn Fn(&ChangeEvent) + Send + Sync;

struct ListenerEntry {
    id: u64,
    listener: Arc<ChangeListener>,
}

/// Open stores, shared per store file so every opener in the process sees the
/// same instance (and therefore the same listener list).
static REGISTRY: Mutex<BTreeMap<PathBuf, Weak<PreferenceStore>>> = Mutex::new(BTreeMap::new());

/// A named, encrypted, file-backed map from string keys to typed values.
///
/// Every successful mutation re-seals the whole document and replaces the
/// store file atomically, then invokes the registered change listeners
/// synchronously on the writing thread, in registration order. Typed reads
/// never fail: a missing entry, an entry of the wrong type, an out-of-range
/// enum ordinal, or malformed timestamp text all substitute the caller's
/// default (the undecodable cases log a warning).
pub struct PreferenceStore {
    name: String,
    path: PathBuf,
    key: StoreKey,
    entries: Mutex<BTreeMap<String, Value>>,
    listeners: Mutex<Vec<ListenerEntry>>,
    next_listener_id: AtomicU64,
}

impl PreferenceStore {
    /// Opens (or creates) the store `{LIBRARY_NAMESPACE}.{name}`.
    ///
    /// With `context: None` the process-wide context is used; opening fails
    /// with [`StoreError::Context`] when none is alive. `clean_on_open`
    /// erases all entries immediately after opening.
    pub fn open(
        context: Option<&Arc<AppContext>>,
        name: &str,
        clean_on_open: bool,
    ) -> Result<Arc<Self>, StoreError> {
        Self::open_at(context, &format!("{LIBRARY_NAMESPACE}.{name}"), clean_on_open)
    }

    /// Like [`open`](Self::open), but uses `name` as-is without the library
    /// namespace prefix.
    pub fn open_unqualified(
        context: Option<&Arc<AppContext>>,
        name: &str,
        clean_on_open: bool,
    ) -> Result<Arc<Self>, StoreError> {
        Self::open_at(context, name, clean_on_open)
    }

    fn open_at(
        context: Option<&Arc<AppContext>>,
        qualified: &str,
        clean_on_open: bool,
    ) -> Result<Arc<Self>, StoreError> {
        let context = match context {
            Some(context) => Arc::clone(context),
            None => dynfield_core::require_context()?,
        };
        let path = context
            .data_dir()
            .join(format!("{qualified}.{STORE_FILE_EXTENSION}"));

        let store = {
            let mut registry = REGISTRY.lock().expect(POISONED);
            registry.retain(|_, weak| weak.strong_count() > 0);
            match registry.get(&path).and_then(Weak::upgrade) {
                Some(existing) => existing,
                None => {
                    let key = context.master_key()?.derive_store_key(qualified);
                    let entries = load_document(&path, &key)?;
                    debug!(store = qualified, entries = entries.len(), "opened preference store");
                    let store = Arc::new(Self {
                        name: qualified.to_string(),
                        path: path.clone(),
                        key,
                        entries: Mutex::new(entries),
                        listeners: Mutex::new(Vec::new()),
                        next_listener_id: AtomicU64::new(0),
                    });
                    registry.insert(path, Arc::downgrade(&store));
                    store
                }
            }
        };

        if clean_on_open {
            store.clear()?;
        }
        Ok(store)
    }

    /// The qualified store name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The store file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether the store has an entry for `key`.
    pub fn contains(&self, key: &str) -> bool {
        self.entries.lock().expect(POISONED).contains_key(key)
    }

    /// All keys currently present, in sorted order.
    pub fn keys(&self) -> Vec<String> {
        self.entries.lock().expect(POISONED).keys().cloned().collect()
    }

    /// Registers a change listener.
    ///
    /// The listener runs synchronously on whichever thread commits a change,
    /// after the change is durable, once per successful mutation. Listeners
    /// are invoked in registration order.
    pub fn subscribe(
        &self,
        listener: impl Fn(&ChangeEvent) + Send + Sync + 'static,
    ) -> ListenerHandle {
        let id = self.next_listener_id.fetch_add(1, Ordering::Relaxed);
        self.listeners.lock().expect(POISONED).push(ListenerEntry {
            id,
            listener: Arc::new(listener),
        });
        ListenerHandle(id)
    }

    /// Removes a change listener. Unknown handles are ignored.
    pub fn unsubscribe(&self, handle: ListenerHandle) {
        self.listeners
            .lock()
            .expect(POISONED)
            .retain(|entry| entry.id != handle.0);
    }

    // ---- typed reads ------------------------------------------------------

    /// Reads an integer, or `default` when absent or undecodable.
    pub fn get_int(&self, key: &str, default: i32) -> i32 {
        self.read(key, "int", |value| match value {
            Value::Int(v) => Some(*v),
            _ => None,
        })
        .unwrap_or(default)
    }

    /// Reads a long, or `default` when absent or undecodable.
    pub fn get_long(&self, key: &str, default: i64) -> i64 {
        self.read(key, "long", |value| match value {
            Value::Long(v) => Some(*v),
            _ => None,
        })
        .unwrap_or(default)
    }

    /// Reads a float, or `default` when absent or undecodable.
    pub fn get_float(&self, key: &str, default: f32) -> f32 {
        self.read(key, "float", |value| match value {
            Value::Float(v) => Some(*v),
            _ => None,
        })
        .unwrap_or(default)
    }

    /// Reads a boolean, or `default` when absent or undecodable.
    pub fn get_bool(&self, key: &str, default: bool) -> bool {
        self.read(key, "bool", |value| match value {
            Value::Bool(v) => Some(*v),
            _ => None,
        })
        .unwrap_or(default)
    }

    /// Reads a string, or `default` when absent or undecodable.
    pub fn get_string(&self, key: &str, default: &str) -> String {
        self.read(key, "string", |value| match value {
            Value::String(v) => Some(v.clone()),
            _ => None,
        })
        .unwrap_or_else(|| default.to_string())
    }

    /// Reads a string set, or `default` when absent or undecodable.
    pub fn get_string_set(&self, key: &str, default: &BTreeSet<String>) -> BTreeSet<String> {
        self.read(key, "string_set", |value| match value {
            Value::StringSet(v) => Some(v.clone()),
            _ => None,
        })
        .unwrap_or_else(|| default.clone())
    }

    /// Reads an enum stored as its ordinal, or `default` when absent,
    /// undecodable, or out of range for `E`'s declared values.
    pub fn get_enum<E: OrdinalEnum>(&self, key: &str, default: E) -> E {
        let Some(ordinal) = self.read(key, "int", |value| match value {
            Value::Int(v) => Some(*v),
            _ => None,
        }) else {
            return default;
        };
        if ordinal < 0 {
            return default;
        }
        match E::from_ordinal(ordinal) {
            Some(value) => value,
            None => {
                warn!(
                    store = %self.name,
                    key,
                    ordinal,
                    declared = E::VALUES.len(),
                    "stored enum ordinal is out of range, substituting default"
                );
                default
            }
        }
    }

    /// Reads a fixed-pattern timestamp, or `default` when absent or
    /// unparseable.
    pub fn get_timestamp(&self, key: &str, default: NaiveDateTime) -> NaiveDateTime {
        let Some(text) = self.read(key, "string", |value| match value {
            Value::String(v) => Some(v.clone()),
            _ => None,
        }) else {
            return default;
        };
        codec::decode_timestamp(key, &text).unwrap_or(default)
    }

    fn read<T>(
        &self,
        key: &str,
        expected: &'static str,
        decode: impl FnOnce(&Value) -> Option<T>,
    ) -> Option<T> {
        let entries = self.entries.lock().expect(POISONED);
        let value = entries.get(key)?;
        let decoded = decode(value);
        if decoded.is_none() {
            warn!(
                store = %self.name,
                key,
                expected,
                actual = value.kind(),
                "preference has unexpected type, substituting default"
            );
        }
        decoded
    }

    // ---- typed writes -----------------------------------------------------

    /// Writes an integer.
    pub fn put_int(&self, key: &str, value: i32) -> Result<(), StoreError> {
        self.commit_put(key, Value::Int(value))
    }

    /// Writes a long.
    pub fn put_long(&self, key: &str, value: i64) -> Result<(), StoreError> {
        self.commit_put(key, Value::Long(value))
    }

    /// Writes a float.
    pub fn put_float(&self, key: &str, value: f32) -> Result<(), StoreError> {
        self.commit_put(key, Value::Float(value))
    }

    /// Writes a boolean.
    pub fn put_bool(&self, key: &str, value: bool) -> Result<(), StoreError> {
        self.commit_put(key, Value::Bool(value))
    }

    /// Writes a string.
    pub fn put_string(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.commit_put(key, Value::String(value.to_string()))
    }

    /// Writes a string set.
    pub fn put_string_set(&self, key: &str, value: BTreeSet<String>) -> Result<(), StoreError> {
        self.commit_put(key, Value::StringSet(value))
    }

    /// Writes an enum as its zero-based ordinal.
    pub fn put_enum<E: OrdinalEnum>(&self, key: &str, value: E) -> Result<(), StoreError> {
        self.commit_put(key, Value::Int(value.ordinal()))
    }

    /// Writes a timestamp as fixed-pattern text.
    pub fn put_timestamp(&self, key: &str, value: &NaiveDateTime) -> Result<(), StoreError> {
        self.commit_put(key, Value::String(codec::encode_timestamp(value)))
    }

    /// Removes an entry. Removing an absent key is a no-op and notifies no
    /// one.
    pub fn remove(&self, key: &str) -> Result<(), StoreError> {
        {
            let mut entries = self.entries.lock().expect(POISONED);
            let Some(previous) = entries.remove(key) else {
                return Ok(());
            };
            if let Err(e) = self.persist(&entries) {
                entries.insert(key.to_string(), previous);
                return Err(e);
            }
        }
        self.notify(&ChangeEvent::Key(key.to_string()));
        Ok(())
    }

    /// Removes every entry.
    pub fn clear(&self) -> Result<(), StoreError> {
        {
            let mut entries = self.entries.lock().expect(POISONED);
            let previous = std::mem::take(&mut *entries);
            if let Err(e) = self.persist(&entries) {
                *entries = previous;
                return Err(e);
            }
        }
        self.notify(&ChangeEvent::Cleared);
        Ok(())
    }

    fn commit_put(&self, key: &str, value: Value) -> Result<(), StoreError> {
        {
            let mut entries = self.entries.lock().expect(POISONED);
            let previous = entries.insert(key.to_string(), value);
            if let Err(e) = self.persist(&entries) {
                // Roll back so memory and disk stay consistent.
                match previous {
                    Some(previous) => entries.insert(key.to_string(), previous),
                    None => entries.remove(key),
                };
                return Err(e);
            }
        }
        self.notify(&ChangeEvent::Key(key.to_string()));
        Ok(())
    }

    /// Seals the document and replaces the store file atomically. Called with
    /// the entries lock held so concurrent writers serialize their file
    /// replacements.
    fn persist(&self, entries: &BTreeMap<String, Value>) -> Result<(), StoreError> {
        let plaintext = serde_json::to_vec(entries)?;
        let blob = dynfield_crypto::seal(&self.key, &plaintext)?;

        let dir = self.path.parent().unwrap_or_else(|| Path::new("."));
        fs::create_dir_all(dir)?;
        let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
        tmp.write_all(&blob)?;
        tmp.as_file().sync_all()?;
        tmp.persist(&self.path)
            .map_err(|e| StoreError::Io(e.error))?;
        Ok(())
    }

    fn notify(&self, event: &ChangeEvent) {
        // Snapshot so listeners can re-enter the store (or mutate the
        // listener list) without deadlocking.
        let listeners: Vec<Arc<ChangeListener>> = self
            .listeners
            .lock()
            .expect(POISONED)
            .iter()
            .map(|entry| Arc::clone(&entry.listener))
            .collect();
        for listener in listeners {
            listener(event);
        }
    }
}

impl std::fmt::Debug for PreferenceStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PreferenceStore")
            .field("name", &self.name)
            .field("path", &self.path)
            .finish()
    }
}

fn load_document(path: &Path, key: &StoreKey) -> Result<BTreeMap<String, Value>, StoreError> {
    let blob = match fs::read(path) {
        Ok(blob) => blob,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(BTreeMap::new()),
        Err(e) => return Err(e.into()),
    };
    let plaintext = dynfield_crypto::open(key, &blob)?;
    Ok(serde_json::from_slice(&plaintext)?)
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use super::*;

    fn open_store(dir: &Path, name: &str) -> Arc<PreferenceStore> {
        let context = Arc::new(AppContext::new(dir));
        PreferenceStore::open(Some(&context), name, false).unwrap()
    }

    #[derive(Clone, Copy, PartialEq, Debug)]
    enum Phase {
        First,
        Second,
        Third,
    }

    impl OrdinalEnum for Phase {
        const VALUES: &'static [Self] = &[Phase::First, Phase::Second, Phase::Third];
    }

    #[test]
    fn typed_values_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(dir.path(), "roundtrip");

        store.put_int("int", -3).unwrap();
        store.put_long("long", 1 << 40).unwrap();
        store.put_float("float", 2.5).unwrap();
        store.put_bool("bool", true).unwrap();
        store.put_string("string", "abc").unwrap();
        store
            .put_string_set("set", BTreeSet::from(["a".to_string(), "b".to_string()]))
            .unwrap();

        assert_eq!(store.get_int("int", 0), -3);
        assert_eq!(store.get_long("long", 0), 1 << 40);
        assert_eq!(store.get_float("float", 0.0), 2.5);
        assert!(store.get_bool("bool", false));
        assert_eq!(store.get_string("string", ""), "abc");
        assert_eq!(
            store.get_string_set("set", &BTreeSet::new()),
            BTreeSet::from(["a".to_string(), "b".to_string()])
        );
    }

    #[test]
    fn absent_keys_yield_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(dir.path(), "defaults");

        assert_eq!(store.get_int("missing", 7), 7);
        assert_eq!(store.get_string("missing", "fallback"), "fallback");
        assert!(!store.contains("missing"));
    }

    #[test]
    fn wrong_typed_entries_yield_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(dir.path(), "mistyped");

        store.put_string("key", "not a number").unwrap();
        assert_eq!(store.get_int("key", 5), 5);
        assert!(store.get_bool("key", true));
    }

    #[test]
    fn enums_store_ordinals_and_fall_back_when_out_of_range() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(dir.path(), "enums");

        store.put_enum("phase", Phase::Second).unwrap();
        assert_eq!(store.get_int("phase", -1), 1);
        assert_eq!(store.get_enum("phase", Phase::First), Phase::Second);

        // Corrupt the stored ordinal past the declared values.
        store.put_int("phase", 7).unwrap();
        assert_eq!(store.get_enum("phase", Phase::First), Phase::First);
    }

    #[test]
    fn timestamps_fall_back_on_malformed_text() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(dir.path(), "timestamps");
        let default = chrono::NaiveDate::from_ymd_opt(2000, 1, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        let value = chrono::NaiveDate::from_ymd_opt(2024, 5, 17)
            .unwrap()
            .and_hms_opt(9, 30, 5)
            .unwrap();

        store.put_timestamp("at", &value).unwrap();
        assert_eq!(store.get_timestamp("at", default), value);

        store.put_string("at", "not a timestamp").unwrap();
        assert_eq!(store.get_timestamp("at", default), default);
    }

    #[test]
    fn remove_restores_default_reads() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(dir.path(), "remove");

        store.put_string("name", "abc").unwrap();
        store.remove("name").unwrap();
        assert_eq!(store.get_string("name", ""), "");
    }

    #[test]
    fn listeners_receive_the_changed_key_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(dir.path(), "listeners");

        let events = Arc::new(Mutex::new(Vec::new()));
        let first = Arc::clone(&events);
        store.subscribe(move |event| first.lock().unwrap().push(("first", event.clone())));
        let second = Arc::clone(&events);
        store.subscribe(move |event| second.lock().unwrap().push(("second", event.clone())));

        store.put_int("hits", 1).unwrap();
        store.clear().unwrap();

        let events = events.lock().unwrap();
        assert_eq!(
            *events,
            vec![
                ("first", ChangeEvent::Key("hits".to_string())),
                ("second", ChangeEvent::Key("hits".to_string())),
                ("first", ChangeEvent::Cleared),
                ("second", ChangeEvent::Cleared),
            ]
        );
    }

    #[test]
    fn unsubscribed_listeners_are_not_called() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(dir.path(), "unsubscribe");

        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let handle = store.subscribe(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        store.put_int("n", 1).unwrap();
        store.unsubscribe(handle);
        store.put_int("n", 2).unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn removing_an_absent_key_notifies_no_one() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(dir.path(), "absent-remove");

        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        store.subscribe(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        store.remove("never-written").unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn listeners_may_reenter_the_store() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(dir.path(), "reentrant");

        let seen = Arc::new(Mutex::new(Vec::new()));
        let reader = Arc::clone(&store);
        let sink = Arc::clone(&seen);
        store.subscribe(move |event| {
            if let ChangeEvent::Key(key) = event {
                sink.lock().unwrap().push(reader.get_int(key, -1));
            }
        });

        store.put_int("depth", 9).unwrap();
        assert_eq!(*seen.lock().unwrap(), vec![9]);
    }

    #[test]
    fn same_name_opens_share_one_instance() {
        let dir = tempfile::tempdir().unwrap();
        let context = Arc::new(AppContext::new(dir.path()));

        let a = PreferenceStore::open(Some(&context), "shared", false).unwrap();
        let b = PreferenceStore::open(Some(&context), "shared", false).unwrap();
        assert!(Arc::ptr_eq(&a, &b));

        let c = PreferenceStore::open(Some(&context), "other", false).unwrap();
        assert!(!Arc::ptr_eq(&a, &c));
    }

    #[test]
    fn open_qualifies_names_with_the_library_namespace() {
        let dir = tempfile::tempdir().unwrap();
        let context = Arc::new(AppContext::new(dir.path()));

        let qualified = PreferenceStore::open(Some(&context), "settings", false).unwrap();
        assert_eq!(qualified.name(), "io.dynfield.settings");

        let raw = PreferenceStore::open_unqualified(Some(&context), "settings", false).unwrap();
        assert_eq!(raw.name(), "settings");
        assert!(!Arc::ptr_eq(&qualified, &raw));
    }

    #[test]
    fn clean_on_open_erases_existing_entries() {
        let dir = tempfile::tempdir().unwrap();
        let context = Arc::new(AppContext::new(dir.path()));

        let store = PreferenceStore::open(Some(&context), "cleaned", false).unwrap();
        store.put_int("n", 1).unwrap();
        drop(store);

        let store = PreferenceStore::open(Some(&context), "cleaned", true).unwrap();
        assert_eq!(store.get_int("n", 0), 0);
    }

    #[test]
    fn open_without_context_fails_when_none_is_set() {
        // The process-wide holder is untouched by the other tests, which all
        // pass their context explicitly.
        let err = PreferenceStore::open(None, "orphan", false).unwrap_err();
        assert!(matches!(err, StoreError::Context(_)));
    }
}
