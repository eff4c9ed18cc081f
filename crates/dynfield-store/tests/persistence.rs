//! On-disk behavior of preference stores: durability, encryption at rest,
//! and corruption handling.

use std::{fs, sync::Arc};

use dynfield_core::AppContext;
use dynfield_store::{PreferenceStore, StoreError};

#[test]
fn values_survive_a_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let context = Arc::new(AppContext::new(dir.path()));

    let store = PreferenceStore::open(Some(&context), "durable", false).unwrap();
    store.put_string("display_name", "Mara").unwrap();
    store.put_int("launch_count", 12).unwrap();
    drop(store);

    let store = PreferenceStore::open(Some(&context), "durable", false).unwrap();
    assert_eq!(store.get_string("display_name", ""), "Mara");
    assert_eq!(store.get_int("launch_count", 0), 12);
}

#[test]
fn store_files_do_not_leak_plaintext() {
    let dir = tempfile::tempdir().unwrap();
    let context = Arc::new(AppContext::new(dir.path()));

    let store = PreferenceStore::open(Some(&context), "sealed", false).unwrap();
    store.put_string("secret", "hunter2-plaintext-marker").unwrap();

    let blob = fs::read(store.path()).unwrap();
    let haystack = String::from_utf8_lossy(&blob);
    assert!(!haystack.contains("hunter2-plaintext-marker"));
    assert!(!haystack.contains("secret"));
}

#[test]
fn a_tampered_store_file_fails_to_open() {
    let dir = tempfile::tempdir().unwrap();
    let context = Arc::new(AppContext::new(dir.path()));

    let store = PreferenceStore::open(Some(&context), "tampered", false).unwrap();
    store.put_bool("flag", true).unwrap();
    let path = store.path().to_path_buf();
    drop(store);

    let mut blob = fs::read(&path).unwrap();
    let last = blob.len() - 1;
    blob[last] = blob[last].wrapping_add(1);
    fs::write(&path, &blob).unwrap();

    let err = PreferenceStore::open(Some(&context), "tampered", false).unwrap_err();
    assert!(matches!(err, StoreError::Crypto(_)));
}

#[test]
fn stores_in_different_directories_are_independent() {
    let dir_a = tempfile::tempdir().unwrap();
    let dir_b = tempfile::tempdir().unwrap();
    let context_a = Arc::new(AppContext::new(dir_a.path()));
    let context_b = Arc::new(AppContext::new(dir_b.path()));

    let a = PreferenceStore::open(Some(&context_a), "settings", false).unwrap();
    let b = PreferenceStore::open(Some(&context_b), "settings", false).unwrap();
    assert!(!Arc::ptr_eq(&a, &b));

    a.put_int("n", 1).unwrap();
    assert_eq!(b.get_int("n", 0), 0);
}
