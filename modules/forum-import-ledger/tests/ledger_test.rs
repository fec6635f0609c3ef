//! Ledger behavior against the in-memory store. No database required.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use forum_import_common::EntityType;
use forum_import_ledger::{ImportOutcome, ImportRecord, ImportStore, Ledger, MemoryImportStore};

async fn ledger_with_origin() -> (Arc<MemoryImportStore>, Ledger) {
    let store = Arc::new(MemoryImportStore::new());
    let origin = store.create_origin("Example", 10).await.unwrap();
    let ledger = Ledger::new(store.clone(), origin.origin_id);
    (store, ledger)
}

// =========================================================================
// record / resolve
// =========================================================================

#[tokio::test]
async fn resolve_is_none_before_import() {
    let (_store, ledger) = ledger_with_origin().await;
    assert_eq!(ledger.resolve(EntityType::Profile, 5), None);
    assert!(!ledger.is_imported(EntityType::Profile, 5));
}

#[tokio::test]
async fn record_import_is_visible_to_resolve() {
    let (store, ledger) = ledger_with_origin().await;

    ledger.record_import(EntityType::Profile, 5, 500).await.unwrap();

    assert_eq!(ledger.resolve(EntityType::Profile, 5), Some(500));
    assert_eq!(store.append_count(), 1);
}

#[tokio::test]
async fn partitions_are_independent_per_entity_type() {
    let (_store, ledger) = ledger_with_origin().await;

    ledger.record_import(EntityType::Profile, 7, 70).await.unwrap();
    ledger.record_import(EntityType::Comment, 7, 700).await.unwrap();

    assert_eq!(ledger.resolve(EntityType::Profile, 7), Some(70));
    assert_eq!(ledger.resolve(EntityType::Comment, 7), Some(700));
    assert_eq!(ledger.resolve(EntityType::Forum, 7), None);
}

#[tokio::test]
async fn duplicate_record_fails_without_touching_store() {
    let (store, ledger) = ledger_with_origin().await;
    ledger.record_import(EntityType::Forum, 3, 30).await.unwrap();

    let err = ledger.record_import(EntityType::Forum, 3, 31).await.unwrap_err();

    assert!(err.is_duplicate());
    assert_eq!(ledger.resolve(EntityType::Forum, 3), Some(30));
    assert_eq!(store.append_count(), 1);
}

#[tokio::test]
async fn failed_store_write_does_not_update_cache() {
    let (store, ledger) = ledger_with_origin().await;
    store.fail_appends(true);

    let err = ledger.record_import(EntityType::Conversation, 9, 90).await.unwrap_err();

    assert!(!err.is_duplicate());
    assert_eq!(ledger.resolve(EntityType::Conversation, 9), None);

    store.fail_appends(false);
    ledger.record_import(EntityType::Conversation, 9, 91).await.unwrap();
    assert_eq!(ledger.resolve(EntityType::Conversation, 9), Some(91));
}

#[tokio::test]
async fn store_duplicate_is_reported_even_when_cache_is_cold() {
    let store = Arc::new(MemoryImportStore::new());
    let origin = store.create_origin("Example", 10).await.unwrap();
    store
        .append_import_record(&ImportRecord::new(origin.origin_id, EntityType::Role, 1, 11))
        .await
        .unwrap();

    // Not preloaded: the cache does not know about the row.
    let ledger = Ledger::new(store.clone(), origin.origin_id);
    let err = ledger.record_import(EntityType::Role, 1, 12).await.unwrap_err();

    assert!(err.is_duplicate());
    assert_eq!(ledger.resolve(EntityType::Role, 1), None);
}

// =========================================================================
// import_once
// =========================================================================

#[tokio::test]
async fn import_once_creates_then_returns_existing() {
    let (store, ledger) = ledger_with_origin().await;
    let creates = AtomicUsize::new(0);

    let first = ledger
        .import_once(EntityType::Comment, 42, || async {
            creates.fetch_add(1, Ordering::SeqCst);
            Ok(4200)
        })
        .await
        .unwrap();
    let second = ledger
        .import_once(EntityType::Comment, 42, || async {
            creates.fetch_add(1, Ordering::SeqCst);
            Ok(4201)
        })
        .await
        .unwrap();

    assert_eq!(first, ImportOutcome::Created(4200));
    assert_eq!(second, ImportOutcome::Existing(4200));
    assert_eq!(second.new_id(), 4200);
    assert_eq!(creates.load(Ordering::SeqCst), 1);
    assert_eq!(store.records().len(), 1);
}

#[tokio::test]
async fn import_once_propagates_create_failure() {
    let (store, ledger) = ledger_with_origin().await;

    let result = ledger
        .import_once(EntityType::Huddle, 8, || async {
            Err::<i64, _>(anyhow::anyhow!("destination down"))
        })
        .await;

    assert!(result.is_err());
    assert_eq!(ledger.resolve(EntityType::Huddle, 8), None);
    assert_eq!(store.append_count(), 0);
}

// =========================================================================
// deleted placeholder
// =========================================================================

#[tokio::test]
async fn deleted_placeholder_resolves_zero_without_durable_write() {
    let (store, ledger) = ledger_with_origin().await;

    ledger.record_deleted_placeholder(EntityType::Profile, 999);

    assert_eq!(ledger.resolve(EntityType::Profile, 0), Some(999));
    assert_eq!(ledger.resolve_or_deleted(EntityType::Profile, 12345), Some(999));
    assert_eq!(store.append_count(), 0);
}

#[tokio::test]
async fn resolve_or_deleted_prefers_real_mapping() {
    let (_store, ledger) = ledger_with_origin().await;
    ledger.record_deleted_placeholder(EntityType::Profile, 999);
    ledger.record_import(EntityType::Profile, 4, 40).await.unwrap();

    assert_eq!(ledger.resolve_or_deleted(EntityType::Profile, 4), Some(40));
}

// =========================================================================
// preload / resumability
// =========================================================================

#[tokio::test]
async fn preload_replays_only_this_origin() {
    let store = Arc::new(MemoryImportStore::new());
    let a = store.create_origin("A", 1).await.unwrap();
    let b = store.create_origin("B", 2).await.unwrap();

    {
        let ledger_a = Ledger::new(store.clone(), a.origin_id);
        ledger_a.record_import(EntityType::Profile, 1, 10).await.unwrap();
        ledger_a.record_import(EntityType::Forum, 2, 20).await.unwrap();
        let ledger_b = Ledger::new(store.clone(), b.origin_id);
        ledger_b.record_import(EntityType::Profile, 1, 99).await.unwrap();
    }

    let resumed = Ledger::new(store.clone(), a.origin_id);
    let loaded = resumed.preload().await.unwrap();

    assert_eq!(loaded, 2);
    assert_eq!(resumed.resolve(EntityType::Profile, 1), Some(10));
    assert_eq!(resumed.resolve(EntityType::Forum, 2), Some(20));
}

#[tokio::test]
async fn remaining_is_list_minus_resolved() {
    let store = Arc::new(MemoryImportStore::new());
    let origin = store.create_origin("Example", 10).await.unwrap();
    {
        let first_run = Ledger::new(store.clone(), origin.origin_id);
        for id in [2, 5] {
            first_run.record_import(EntityType::Profile, id, id * 100).await.unwrap();
        }
    }

    let ledger = Ledger::new(store.clone(), origin.origin_id);
    ledger.preload().await.unwrap();

    assert_eq!(ledger.remaining(EntityType::Profile, &[2, 5, 9, 11]), vec![9, 11]);
    assert_eq!(ledger.remaining(EntityType::Forum, &[2, 5]), vec![2, 5]);
}

#[tokio::test]
async fn concurrent_records_land_in_every_partition() {
    let (store, ledger) = ledger_with_origin().await;
    let ledger = Arc::new(ledger);

    let mut handles = Vec::new();
    for entity in [EntityType::Profile, EntityType::Comment, EntityType::Follow] {
        for id in 1..=20 {
            let ledger = ledger.clone();
            handles.push(tokio::spawn(async move {
                ledger.record_import(entity, id, id + 1000).await
            }));
        }
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    assert_eq!(store.append_count(), 60);
    assert_eq!(ledger.len(EntityType::Comment), 20);
    assert_eq!(ledger.resolve(EntityType::Follow, 20), Some(1020));
}
