//! Store-backed live value constructors.

use std::{collections::BTreeSet, sync::Arc};

use chrono::NaiveDateTime;
use dynfield_store::{OrdinalEnum, PreferenceStore};

use crate::live::LiveValue;

/// Per-type [`LiveValue`] constructors on a shared store.
///
/// Each value is bound to a `(store, key, default)` triple and follows the
/// store's decode rules: missing, mistyped, or undecodable entries read as
/// the default.
pub trait StoreLive {
    /// An observable integer preference.
    fn live_int(&self, key: &str, default: i32) -> Arc<LiveValue<i32>>;
    /// An observable long preference.
    fn live_long(&self, key: &str, default: i64) -> Arc<LiveValue<i64>>;
    /// An observable float preference.
    fn live_float(&self, key: &str, default: f32) -> Arc<LiveValue<f32>>;
    /// An observable boolean preference.
    fn live_bool(&self, key: &str, default: bool) -> Arc<LiveValue<bool>>;
    /// An observable string preference.
    fn live_string(&self, key: &str, default: &str) -> Arc<LiveValue<String>>;
    /// An observable string-set preference.
    fn live_string_set(
        &self,
        key: &str,
        default: &BTreeSet<String>,
    ) -> Arc<LiveValue<BTreeSet<String>>>;
    /// An observable enum preference, stored as its ordinal.
    fn live_enum<E>(&self, key: &str, default: E) -> Arc<LiveValue<E>>
    where
        E: OrdinalEnum + Send + Sync + 'static;
    /// An observable fixed-pattern timestamp preference.
    fn live_timestamp(&self, key: &str, default: NaiveDateTime) -> Arc<LiveValue<NaiveDateTime>>;
}

impl StoreLive for Arc<PreferenceStore> {
    fn live_int(&self, key: &str, default: i32) -> Arc<LiveValue<i32>> {
        let read_key = key.to_string();
        LiveValue::backed(Arc::clone(self), key, move |store| {
            store.get_int(&read_key, default)
        })
    }

    fn live_long(&self, key: &str, default: i64) -> Arc<LiveValue<i64>> {
        let read_key = key.to_string();
        LiveValue::backed(Arc::clone(self), key, move |store| {
            store.get_long(&read_key, default)
        })
    }

    fn live_float(&self, key: &str, default: f32) -> Arc<LiveValue<f32>> {
        let read_key = key.to_string();
        LiveValue::backed(Arc::clone(self), key, move |store| {
            store.get_float(&read_key, default)
        })
    }

    fn live_bool(&self, key: &str, default: bool) -> Arc<LiveValue<bool>> {
        let read_key = key.to_string();
        LiveValue::backed(Arc::clone(self), key, move |store| {
            store.get_bool(&read_key, default)
        })
    }

    fn live_string(&self, key: &str, default: &str) -> Arc<LiveValue<String>> {
        let read_key = key.to_string();
        let default = default.to_string();
        LiveValue::backed(Arc::clone(self), key, move |store| {
            store.get_string(&read_key, &default)
        })
    }

    fn live_string_set(
        &self,
        key: &str,
        default: &BTreeSet<String>,
    ) -> Arc<LiveValue<BTreeSet<String>>> {
        let read_key = key.to_string();
        let default = default.clone();
        LiveValue::backed(Arc::clone(self), key, move |store| {
            store.get_string_set(&read_key, &default)
        })
    }

    fn live_enum<E>(&self, key: &str, default: E) -> Arc<LiveValue<E>>
    where
        E: OrdinalEnum + Send + Sync + 'static,
    {
        let read_key = key.to_string();
        LiveValue::backed(Arc::clone(self), key, move |store| {
            store.get_enum(&read_key, default)
        })
    }

    fn live_timestamp(&self, key: &str, default: NaiveDateTime) -> Arc<LiveValue<NaiveDateTime>> {
        let read_key = key.to_string();
        LiveValue::backed(Arc::clone(self), key, move |store| {
            store.get_timestamp(&read_key, default)
        })
    }
}
