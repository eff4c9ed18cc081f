#![doc = include_str!("../README.md")]

use std::{collections::BTreeSet, sync::Arc};

use chrono::{DateTime, NaiveDateTime};
use dynfield_core::AppContext;
use dynfield_field::{Field, StoreLive};
use dynfield_store::{OrdinalEnum, PreferenceStore, StoreError};
use tracing::warn;

/// Name of the preference store backing [`AppSettings`].
const STORE_NAME: &str = "settings";

/// The application color theme.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Theme {
    /// Follow the system setting.
    System,
    /// Always light.
    Light,
    /// Always dark.
    Dark,
}

impl OrdinalEnum for Theme {
    const VALUES: &'static [Self] = &[Theme::System, Theme::Light, Theme::Dark];
}

/// The application's declared settings.
///
/// Every field is wired with all four strategies against the shared
/// `settings` store, so reads are synchronous, writes notify live observers,
/// and clears restore the declared default.
pub struct AppSettings {
    store: Arc<PreferenceStore>,
    /// The user-visible display name. Defaults to the empty string.
    pub display_name: Field<String>,
    /// How many times the application has been launched.
    pub launch_count: Field<i32>,
    /// Whether crash reports may be uploaded. Defaults to on.
    pub crash_reporting: Field<bool>,
    /// The selected color theme.
    pub theme: Field<Theme>,
    /// When the application was last opened.
    pub last_opened_at: Field<NaiveDateTime>,
    /// Tags the user pinned to the top of their overview.
    pub pinned_tags: Field<BTreeSet<String>>,
}

impl AppSettings {
    /// Opens the settings against the process-wide context.
    ///
    /// Requires [`dynfield_core::on_create`] to have run; fails with
    /// [`StoreError::Context`] otherwise.
    pub fn open() -> Result<Self, StoreError> {
        Ok(Self::from_store(PreferenceStore::open(
            None, STORE_NAME, false,
        )?))
    }

    /// Opens the settings against an explicit context.
    pub fn open_with(context: &Arc<AppContext>) -> Result<Self, StoreError> {
        Ok(Self::from_store(PreferenceStore::open(
            Some(context),
            STORE_NAME,
            false,
        )?))
    }

    /// The backing store, for callers that need raw access.
    pub fn store(&self) -> &Arc<PreferenceStore> {
        &self.store
    }

    fn from_store(store: Arc<PreferenceStore>) -> Self {
        let display_name = {
            let get = Arc::clone(&store);
            let set = Arc::clone(&store);
            let wipe = Arc::clone(&store);
            let live = Arc::clone(&store);
            Field::with_default(String::new())
                .configure_get(move |_, default| {
                    Some(get.get_string(
                        "display_name",
                        default.map(String::as_str).unwrap_or_default(),
                    ))
                })
                .configure_set(move |_, value| {
                    log_write_error("display_name", set.put_string("display_name", &value));
                })
                .configure_cleaner(move |_, _| {
                    log_write_error("display_name", wipe.remove("display_name"));
                })
                .configure_live(move |_, default| {
                    Some(live.live_string(
                        "display_name",
                        default.map(String::as_str).unwrap_or_default(),
                    ))
                })
        };

        let launch_count = {
            let get = Arc::clone(&store);
            let set = Arc::clone(&store);
            let wipe = Arc::clone(&store);
            let live = Arc::clone(&store);
            Field::with_default(0)
                .configure_get(move |_, default| {
                    Some(get.get_int("launch_count", default.copied().unwrap_or(0)))
                })
                .configure_set(move |_, value| {
                    log_write_error("launch_count", set.put_int("launch_count", value));
                })
                .configure_cleaner(move |_, _| {
                    log_write_error("launch_count", wipe.remove("launch_count"));
                })
                .configure_live(move |_, default| {
                    Some(live.live_int("launch_count", default.copied().unwrap_or(0)))
                })
        };

        let crash_reporting = {
            let get = Arc::clone(&store);
            let set = Arc::clone(&store);
            let wipe = Arc::clone(&store);
            let live = Arc::clone(&store);
            Field::with_default(true)
                .configure_get(move |_, default| {
                    Some(get.get_bool("crash_reporting", default.copied().unwrap_or(true)))
                })
                .configure_set(move |_, value| {
                    log_write_error("crash_reporting", set.put_bool("crash_reporting", value));
                })
                .configure_cleaner(move |_, _| {
                    log_write_error("crash_reporting", wipe.remove("crash_reporting"));
                })
                .configure_live(move |_, default| {
                    Some(live.live_bool("crash_reporting", default.copied().unwrap_or(true)))
                })
        };

        let theme = {
            let get = Arc::clone(&store);
            let set = Arc::clone(&store);
            let wipe = Arc::clone(&store);
            let live = Arc::clone(&store);
            Field::with_default(Theme::System)
                .configure_get(move |_, default| {
                    Some(get.get_enum("theme", default.copied().unwrap_or(Theme::System)))
                })
                .configure_set(move |_, value| {
                    log_write_error("theme", set.put_enum("theme", value));
                })
                .configure_cleaner(move |_, _| {
                    log_write_error("theme", wipe.remove("theme"));
                })
                .configure_live(move |_, default| {
                    Some(live.live_enum("theme", default.copied().unwrap_or(Theme::System)))
                })
        };

        let last_opened_at = {
            let epoch = DateTime::UNIX_EPOCH.naive_utc();
            let get = Arc::clone(&store);
            let set = Arc::clone(&store);
            let wipe = Arc::clone(&store);
            let live = Arc::clone(&store);
            Field::with_default(epoch)
                .configure_get(move |_, default| {
                    Some(get.get_timestamp("last_opened_at", default.copied().unwrap_or(epoch)))
                })
                .configure_set(move |_, value| {
                    log_write_error("last_opened_at", set.put_timestamp("last_opened_at", &value));
                })
                .configure_cleaner(move |_, _| {
                    log_write_error("last_opened_at", wipe.remove("last_opened_at"));
                })
                .configure_live(move |_, default| {
                    Some(live.live_timestamp("last_opened_at", default.copied().unwrap_or(epoch)))
                })
        };

        let pinned_tags = {
            let get = Arc::clone(&store);
            let set = Arc::clone(&store);
            let wipe = Arc::clone(&store);
            let live = Arc::clone(&store);
            Field::with_default(BTreeSet::new())
                .configure_get(move |_, default| {
                    Some(get.get_string_set("pinned_tags", default.unwrap_or(&BTreeSet::new())))
                })
                .configure_set(move |_, value| {
                    log_write_error("pinned_tags", set.put_string_set("pinned_tags", value));
                })
                .configure_cleaner(move |_, _| {
                    log_write_error("pinned_tags", wipe.remove("pinned_tags"));
                })
                .configure_live(move |_, default| {
                    Some(live.live_string_set("pinned_tags", default.unwrap_or(&BTreeSet::new())))
                })
        };

        Self {
            store,
            display_name,
            launch_count,
            crash_reporting,
            theme,
            last_opened_at,
            pinned_tags,
        }
    }
}

impl std::fmt::Debug for AppSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppSettings")
            .field("store", &self.store.name())
            .finish()
    }
}

/// Persistence is fire-and-forget from the field's point of view: failures
/// are logged, never raised.
fn log_write_error(key: &'static str, result: Result<(), StoreError>) {
    if let Err(error) = result {
        warn!(key, %error, "failed to persist setting");
    }
}
