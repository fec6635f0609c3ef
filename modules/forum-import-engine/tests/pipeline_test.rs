//! End-to-end orchestration against an in-memory store and destination.

use std::path::Path;
use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use forum_import_common::{ConcurrencyConfig, EntityType, SiteConfig};
use forum_import_engine::{
    Destination, ImportContext, ImportOptions, ItemImporter, Pipeline, PipelineError,
    PipelineState, SiteHandle, Stage,
};
use forum_import_ledger::{ImportStore, MemoryImportStore};
use forum_import_source::SourceRecord;
use serde_json::json;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

const DESTINATION_ID: i64 = 7;
const DELETED_PROFILE_ID: i64 = 999;

/// Records every create and hands out sequential IDs.
#[derive(Default)]
struct FakeDestination {
    next_id: AtomicI64,
    site: Mutex<Option<SiteHandle>>,
    created: Mutex<Vec<(EntityType, i64)>>,
    fail_on: Mutex<Option<(EntityType, i64)>>,
}

impl FakeDestination {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            next_id: AtomicI64::new(1000),
            ..Default::default()
        })
    }

    fn fail_on(&self, target: Option<(EntityType, i64)>) {
        *self.fail_on.lock().unwrap() = target;
    }

    fn created(&self, entity: EntityType) -> Vec<i64> {
        self.created
            .lock()
            .unwrap()
            .iter()
            .filter(|(e, _)| *e == entity)
            .map(|(_, id)| *id)
            .collect()
    }
}

#[async_trait]
impl Destination for FakeDestination {
    async fn prepare_site(&self, _site: &SiteConfig, _admin: &SourceRecord) -> anyhow::Result<SiteHandle> {
        let mut site = self.site.lock().unwrap();
        if let Some(existing) = *site {
            return Ok(SiteHandle {
                created: false,
                ..existing
            });
        }
        let handle = SiteHandle {
            destination_id: DESTINATION_ID,
            admin_profile_id: self.next_id.fetch_add(1, Ordering::SeqCst),
            created: true,
        };
        *site = Some(handle);
        Ok(handle)
    }

    async fn create_deleted_profile(&self, _site: &SiteHandle) -> anyhow::Result<i64> {
        Ok(DELETED_PROFILE_ID)
    }

    async fn create(&self, ctx: &ImportContext, record: &SourceRecord) -> anyhow::Result<i64> {
        assert_eq!(ctx.entity(), record.entity);
        if *self.fail_on.lock().unwrap() == Some((record.entity, record.legacy_id)) {
            anyhow::bail!("destination rejected {} {}", record.entity, record.legacy_id);
        }
        self.created
            .lock()
            .unwrap()
            .push((record.entity, record.legacy_id));
        Ok(self.next_id.fetch_add(1, Ordering::SeqCst))
    }
}

fn write(root: &Path, relative: &str, body: serde_json::Value) {
    let path = root.join(relative);
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, serde_json::to_vec(&body).unwrap()).unwrap();
}

fn export() -> TempDir {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();
    for id in [5, 2, 9] {
        write(root, &format!("profiles/{id}.json"), json!({ "id": id }));
    }
    write(root, "forums/1.json", json!({ "id": 1 }));
    write(root, "forums/2.json", json!({ "id": 2 }));
    write(root, "conversations/1.json", json!({ "id": 1, "forumId": 1 }));
    write(root, "comments/1.json", json!({ "id": 1 }));
    write(root, "comments/2.json", json!({ "id": 2, "inReplyTo": 1 }));
    write(root, "follows/1.json", json!({ "id": 1 }));
    write(root, "roles/1.json", json!({ "id": 1 }));
    dir
}

fn site(owner_id: i64) -> SiteConfig {
    SiteConfig {
        name: "Test forum".to_string(),
        description: String::new(),
        subdomain_key: "test".to_string(),
        owner_id,
    }
}

fn pipeline(dir: &TempDir, store: &Arc<MemoryImportStore>, destination: &Arc<FakeDestination>) -> Pipeline {
    Pipeline::new(site(2), dir.path(), store.clone(), destination.clone()).with_concurrency(
        ConcurrencyConfig {
            accounts: Some(2),
            ..Default::default()
        },
    )
}

fn profile_records(store: &MemoryImportStore) -> Vec<i64> {
    store
        .records()
        .iter()
        .filter(|r| r.entity == EntityType::Profile)
        .map(|r| r.legacy_id)
        .collect()
}

#[tokio::test]
async fn rerun_performs_no_new_writes() {
    let dir = export();
    let store = Arc::new(MemoryImportStore::new());
    let destination = FakeDestination::new();

    let first = pipeline(&dir, &store, &destination)
        .import(ImportOptions::default())
        .await
        .unwrap();

    assert!(!first.resumed);
    assert_eq!(first.state, PipelineState::RelationshipsImported);
    assert_eq!(profile_records(&store), vec![2, 5, 9]);
    // The owner is mapped during setup, not created by the accounts stage.
    assert_eq!(destination.created(EntityType::Profile), vec![5, 9]);
    let writes = store.append_count();

    let second = pipeline(&dir, &store, &destination)
        .import(ImportOptions::default())
        .await
        .unwrap();

    assert!(second.resumed);
    assert_eq!(second.origin_id, first.origin_id);
    assert_eq!(store.append_count(), writes);
    assert_eq!(profile_records(&store), vec![2, 5, 9]);
    assert!(second.stages.iter().all(|s| s.dispatched == 0));
}

#[tokio::test]
async fn finalization_only_runs_when_requested() {
    let dir = export();
    let store = Arc::new(MemoryImportStore::new());
    let destination = FakeDestination::new();

    let summary = pipeline(&dir, &store, &destination)
        .import(ImportOptions { finalize: false })
        .await
        .unwrap();

    assert!(destination.created(EntityType::Role).is_empty());
    assert!(summary.stages.iter().all(|s| s.stage != Stage::Finalization));
    assert!(!store.origins()[0].is_finalized());

    let summary = pipeline(&dir, &store, &destination)
        .import(ImportOptions { finalize: true })
        .await
        .unwrap();

    assert_eq!(summary.state, PipelineState::Finalized);
    assert_eq!(destination.created(EntityType::Role), vec![1]);
    assert!(store.origins()[0].is_finalized());
}

#[tokio::test]
async fn finalizing_twice_is_refused() {
    let dir = export();
    let store = Arc::new(MemoryImportStore::new());
    let destination = FakeDestination::new();

    pipeline(&dir, &store, &destination)
        .import(ImportOptions { finalize: true })
        .await
        .unwrap();
    let err = pipeline(&dir, &store, &destination)
        .import(ImportOptions { finalize: true })
        .await
        .unwrap_err();

    assert!(matches!(err, PipelineError::AlreadyFinalized(_)));
    assert_eq!(destination.created(EntityType::Role), vec![1]);
}

#[tokio::test]
async fn failed_stage_stops_later_stages_and_resumes() {
    let dir = export();
    let store = Arc::new(MemoryImportStore::new());
    let destination = FakeDestination::new();
    destination.fail_on(Some((EntityType::Forum, 2)));

    let err = pipeline(&dir, &store, &destination)
        .import(ImportOptions::default())
        .await
        .unwrap_err();

    match &err {
        PipelineError::StageFailed { stage, failures } => {
            assert_eq!(*stage, Stage::Containers);
            assert_eq!(failures.len(), 1);
            assert_eq!(failures[0].legacy_id, 2);
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(err.failures().len(), 1);
    assert!(destination.created(EntityType::Conversation).is_empty());

    destination.fail_on(None);
    let summary = pipeline(&dir, &store, &destination)
        .import(ImportOptions::default())
        .await
        .unwrap();

    assert_eq!(summary.state, PipelineState::RelationshipsImported);
    // Forum 1 was already recorded and is not created again.
    let mut forums = destination.created(EntityType::Forum);
    forums.sort();
    assert_eq!(forums, vec![1, 2]);
    assert_eq!(destination.created(EntityType::Comment).len(), 2);
}

#[tokio::test]
async fn missing_owner_is_fatal() {
    let dir = export();
    let store = Arc::new(MemoryImportStore::new());
    let destination = FakeDestination::new();

    let err = Pipeline::new(site(42), dir.path(), store.clone(), destination.clone())
        .import(ImportOptions::default())
        .await
        .unwrap_err();

    assert!(matches!(err, PipelineError::AdminNotFound(42)));
    assert!(store.origins().is_empty());
}

#[tokio::test]
async fn malformed_manifest_fails_before_any_write() {
    let dir = export();
    std::fs::write(dir.path().join("comments/index.json"), "not json").unwrap();
    let store = Arc::new(MemoryImportStore::new());
    let destination = FakeDestination::new();

    let err = pipeline(&dir, &store, &destination)
        .import(ImportOptions::default())
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        PipelineError::Index {
            entity: EntityType::Comment,
            ..
        }
    ));
    assert!(store.origins().is_empty());
    assert!(destination.created(EntityType::Profile).is_empty());
}

#[tokio::test]
async fn duplicate_emails_import_in_a_second_pass() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();
    for id in 1..=5 {
        write(root, &format!("profiles/{id}.json"), json!({ "id": id }));
    }
    write(
        root,
        "profiles/index.json",
        json!({
            "files": [
                { "id": 1, "path": "1.json", "email": "owner@example.com" },
                { "id": 2, "path": "2.json", "email": "b@example.com" },
                { "id": 3, "path": "3.json", "email": "OWNER@example.com" },
                { "id": 4, "path": "4.json", "email": "B@example.com" },
                { "id": 5, "path": "5.json", "email": "c@example.com" }
            ]
        }),
    );
    let store = Arc::new(MemoryImportStore::new());
    let destination = FakeDestination::new();

    let summary = Pipeline::new(site(1), root, store.clone(), destination.clone())
        .import(ImportOptions::default())
        .await
        .unwrap();

    let accounts = &summary.stages[0];
    assert_eq!(accounts.stage, Stage::Accounts);
    assert_eq!(accounts.passes, 2);
    assert_eq!(accounts.concurrency, 50);

    let order = destination.created(EntityType::Profile);
    let position = |id: i64| order.iter().position(|x| *x == id).unwrap();
    for first in [2, 5] {
        for duplicate in [3, 4] {
            assert!(position(first) < position(duplicate), "{order:?}");
        }
    }
}

#[tokio::test]
async fn accounts_without_manifest_run_serially() {
    let dir = export();
    let store = Arc::new(MemoryImportStore::new());
    let destination = FakeDestination::new();

    let summary = pipeline(&dir, &store, &destination)
        .import(ImportOptions::default())
        .await
        .unwrap();

    assert_eq!(summary.stages[0].concurrency, 1);
    assert_eq!(summary.stages[0].passes, 1);
}

struct CountingImporter {
    calls: AtomicUsize,
}

#[async_trait]
impl ItemImporter for CountingImporter {
    async fn import(&self, ctx: &ImportContext, legacy_id: i64) -> anyhow::Result<()> {
        assert_eq!(ctx.entity(), EntityType::Follow);
        ctx.ledger.record_import(EntityType::Follow, legacy_id, 1).await?;
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[tokio::test]
async fn stage_importer_can_be_replaced() {
    let dir = export();
    let store = Arc::new(MemoryImportStore::new());
    let destination = FakeDestination::new();
    let follows = Arc::new(CountingImporter {
        calls: AtomicUsize::new(0),
    });

    pipeline(&dir, &store, &destination)
        .with_importer(Stage::Relationships, follows.clone())
        .import(ImportOptions::default())
        .await
        .unwrap();

    assert_eq!(follows.calls.load(Ordering::SeqCst), 1);
    assert!(destination.created(EntityType::Follow).is_empty());
}

#[tokio::test]
async fn deleted_placeholder_resolves_unknown_authors() {
    let dir = export();
    let store = Arc::new(MemoryImportStore::new());
    let destination = FakeDestination::new();
    let seen = Arc::new(Mutex::new(Vec::new()));

    struct AuthorProbe(Arc<Mutex<Vec<i64>>>);

    #[async_trait]
    impl ItemImporter for AuthorProbe {
        async fn import(&self, ctx: &ImportContext, _legacy_id: i64) -> anyhow::Result<()> {
            self.0.lock().unwrap().push(ctx.author(Some(12345)));
            self.0.lock().unwrap().push(ctx.author(Some(2)));
            Ok(())
        }
    }

    pipeline(&dir, &store, &destination)
        .with_importer(Stage::Threads, Arc::new(AuthorProbe(seen.clone())))
        .import(ImportOptions::default())
        .await
        .unwrap();

    let seen = seen.lock().unwrap().clone();
    assert_eq!(seen[0], DELETED_PROFILE_ID);
    assert_ne!(seen[1], DELETED_PROFILE_ID);
    // The placeholder never reaches durable storage.
    assert!(store.records().iter().all(|r| r.legacy_id != 0));
}

#[tokio::test]
async fn shutdown_interrupts_the_run() {
    let dir = export();
    let store = Arc::new(MemoryImportStore::new());
    let destination = FakeDestination::new();
    let shutdown = CancellationToken::new();
    shutdown.cancel();

    let err = pipeline(&dir, &store, &destination)
        .with_shutdown(shutdown)
        .import(ImportOptions::default())
        .await
        .unwrap_err();

    assert!(matches!(err, PipelineError::Interrupted(Stage::Accounts)));
    assert!(destination.created(EntityType::Profile).is_empty());
    // Setup work is durable even though no stage finished.
    assert!(store.find_origin(DESTINATION_ID).await.unwrap().is_some());
}
