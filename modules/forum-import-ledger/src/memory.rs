//! In-memory [`ImportStore`] for tests. No database required.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;

use crate::error::{LedgerError, Result};
use crate::store::ImportStore;
use crate::types::{ImportOrigin, ImportRecord};

/// Thread-safe, write-counting store. Enforces the same uniqueness rules as
/// the Postgres schema.
#[derive(Default)]
pub struct MemoryImportStore {
    state: Mutex<MemoryState>,
    appends: AtomicUsize,
    fail_appends: AtomicBool,
}

#[derive(Default)]
struct MemoryState {
    origins: Vec<ImportOrigin>,
    records: BTreeMap<(i64, i64, i64), ImportRecord>,
}

impl MemoryImportStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of successful `append_import_record` calls.
    pub fn append_count(&self) -> usize {
        self.appends.load(Ordering::SeqCst)
    }

    /// While set, every append fails with a non-duplicate error.
    pub fn fail_appends(&self, fail: bool) {
        self.fail_appends.store(fail, Ordering::SeqCst);
    }

    /// All records, ordered by key.
    pub fn records(&self) -> Vec<ImportRecord> {
        self.state().records.values().copied().collect()
    }

    pub fn origins(&self) -> Vec<ImportOrigin> {
        self.state().origins.clone()
    }

    fn state(&self) -> std::sync::MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl ImportStore for MemoryImportStore {
    async fn create_origin(&self, title: &str, destination_id: i64) -> Result<ImportOrigin> {
        let mut state = self.state();
        if state.origins.iter().any(|o| o.destination_id == destination_id) {
            return Err(anyhow::anyhow!("origin for destination {destination_id} already exists").into());
        }
        let origin = ImportOrigin {
            origin_id: state.origins.len() as i64 + 1,
            title: title.to_string(),
            destination_id,
            created_at: Utc::now(),
            finalized_at: None,
        };
        state.origins.push(origin.clone());
        Ok(origin)
    }

    async fn find_origin(&self, destination_id: i64) -> Result<Option<ImportOrigin>> {
        let state = self.state();
        Ok(state
            .origins
            .iter()
            .find(|o| o.destination_id == destination_id)
            .cloned())
    }

    async fn mark_finalized(&self, origin_id: i64) -> Result<()> {
        let mut state = self.state();
        let origin = state
            .origins
            .iter_mut()
            .find(|o| o.origin_id == origin_id)
            .ok_or(LedgerError::OriginNotFound(origin_id))?;
        origin.finalized_at = Some(Utc::now());
        Ok(())
    }

    async fn append_import_record(&self, record: &ImportRecord) -> Result<()> {
        if self.fail_appends.load(Ordering::SeqCst) {
            return Err(anyhow::anyhow!("simulated storage failure").into());
        }

        let key = (record.origin_id, record.entity.item_type_id(), record.legacy_id);
        let mut state = self.state();
        if state.records.contains_key(&key) {
            return Err(LedgerError::Duplicate {
                origin_id: record.origin_id,
                entity: record.entity,
                legacy_id: record.legacy_id,
            });
        }
        state.records.insert(key, *record);
        self.appends.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn list_import_records(&self, origin_id: i64) -> Result<Vec<ImportRecord>> {
        let state = self.state();
        Ok(state
            .records
            .values()
            .filter(|r| r.origin_id == origin_id)
            .copied()
            .collect())
    }

    async fn count_import_records(&self, origin_id: i64) -> Result<i64> {
        let state = self.state();
        Ok(state
            .records
            .values()
            .filter(|r| r.origin_id == origin_id)
            .count() as i64)
    }
}
