//! The idempotency ledger: durable store plus per-type cache.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, RwLock};

use forum_import_common::{EntityMap, EntityType, DELETED_LEGACY_ID};
use tracing::{debug, info, warn};

use crate::error::{LedgerError, Result};
use crate::store::ImportStore;
use crate::types::ImportRecord;

type Partition = RwLock<HashMap<i64, i64>>;

/// Single source of truth for "has legacy item X of type T been imported,
/// and to what new ID".
///
/// Scoped to one origin. The cache is partitioned by entity type, each
/// partition behind its own lock, so workers importing comments never wait on
/// workers resolving profiles. Locks are held only for the map access, never
/// across a store call.
pub struct Ledger {
    origin_id: i64,
    store: Arc<dyn ImportStore>,
    cache: EntityMap<Partition>,
}

/// Result of [`Ledger::import_once`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportOutcome {
    /// Already recorded; the create closure was not called.
    Existing(i64),
    /// Created and recorded by this call.
    Created(i64),
}

impl ImportOutcome {
    pub fn new_id(self) -> i64 {
        match self {
            ImportOutcome::Existing(id) | ImportOutcome::Created(id) => id,
        }
    }
}

impl Ledger {
    pub fn new(store: Arc<dyn ImportStore>, origin_id: i64) -> Self {
        Self {
            origin_id,
            store,
            cache: EntityMap::default(),
        }
    }

    pub fn origin_id(&self) -> i64 {
        self.origin_id
    }

    /// Replay every durable record for this origin into the cache.
    ///
    /// Linear in the number of prior imports. Run once, before any stage.
    pub async fn preload(&self) -> Result<usize> {
        let expected = self.store.count_import_records(self.origin_id).await?;
        info!(origin_id = self.origin_id, records = expected, "Mapping existing records...");

        let records = self.store.list_import_records(self.origin_id).await?;
        let mut loaded = 0;
        for record in &records {
            if record.origin_id != self.origin_id {
                continue;
            }
            self.cache_insert(record.entity, record.legacy_id, record.new_id);
            loaded += 1;
        }

        info!(origin_id = self.origin_id, loaded, "Prior imports loaded");
        Ok(loaded)
    }

    /// New ID for a legacy item, or `None` if it was never imported.
    pub fn resolve(&self, entity: EntityType, legacy_id: i64) -> Option<i64> {
        let partition = self.cache[entity]
            .read()
            .unwrap_or_else(|e| e.into_inner());
        partition.get(&legacy_id).copied()
    }

    pub fn is_imported(&self, entity: EntityType, legacy_id: i64) -> bool {
        self.resolve(entity, legacy_id).is_some()
    }

    /// Like [`resolve`](Self::resolve), falling back to the deleted placeholder
    /// registered for `entity`.
    pub fn resolve_or_deleted(&self, entity: EntityType, legacy_id: i64) -> Option<i64> {
        self.resolve(entity, legacy_id)
            .or_else(|| self.resolve(entity, DELETED_LEGACY_ID))
    }

    /// Durably record a mapping, then cache it.
    ///
    /// Fails without side effects if the key is already known. A failed store
    /// write leaves the cache untouched.
    pub async fn record_import(&self, entity: EntityType, legacy_id: i64, new_id: i64) -> Result<()> {
        if self.is_imported(entity, legacy_id) {
            return Err(LedgerError::Duplicate {
                origin_id: self.origin_id,
                entity,
                legacy_id,
            });
        }

        let record = ImportRecord::new(self.origin_id, entity, legacy_id, new_id);
        self.store.append_import_record(&record).await?;
        self.cache_insert(entity, legacy_id, new_id);

        debug!(%entity, legacy_id, new_id, "Recorded import");
        Ok(())
    }

    /// Map the reserved legacy ID 0 of `entity` to `new_id`.
    ///
    /// Cache only. The placeholder is re-established on every start.
    pub fn record_deleted_placeholder(&self, entity: EntityType, new_id: i64) {
        self.cache_insert(entity, DELETED_LEGACY_ID, new_id);
    }

    /// Resolve `legacy_id`, or run `create` and record the ID it returns.
    ///
    /// A second call for the same key is a no-op returning the recorded ID.
    pub async fn import_once<F, Fut>(
        &self,
        entity: EntityType,
        legacy_id: i64,
        create: F,
    ) -> Result<ImportOutcome>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = anyhow::Result<i64>>,
    {
        if let Some(existing) = self.resolve(entity, legacy_id) {
            return Ok(ImportOutcome::Existing(existing));
        }

        let new_id = create().await?;
        match self.record_import(entity, legacy_id, new_id).await {
            Ok(()) => Ok(ImportOutcome::Created(new_id)),
            Err(e) if e.is_duplicate() => match self.resolve(entity, legacy_id) {
                // Another worker recorded it between our lookup and our write.
                Some(existing) => {
                    warn!(%entity, legacy_id, existing, discarded = new_id, "Lost import race");
                    Ok(ImportOutcome::Existing(existing))
                }
                None => Err(e),
            },
            Err(e) => Err(e),
        }
    }

    /// The IDs of `ids` that have not been imported yet, order preserved.
    pub fn remaining(&self, entity: EntityType, ids: &[i64]) -> Vec<i64> {
        let partition = self.cache[entity]
            .read()
            .unwrap_or_else(|e| e.into_inner());
        ids.iter()
            .copied()
            .filter(|id| !partition.contains_key(id))
            .collect()
    }

    /// Number of cached mappings for `entity`, placeholders included.
    pub fn len(&self, entity: EntityType) -> usize {
        self.cache[entity]
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .len()
    }

    pub fn store(&self) -> &Arc<dyn ImportStore> {
        &self.store
    }

    fn cache_insert(&self, entity: EntityType, legacy_id: i64, new_id: i64) {
        let mut partition = self.cache[entity]
            .write()
            .unwrap_or_else(|e| e.into_inner());
        partition.insert(legacy_id, new_id);
    }
}
