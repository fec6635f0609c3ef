use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;
use forum_import_ledger::ImportOutcome;
use tracing::debug;

use crate::context::ImportContext;
use crate::traits::{Destination, ItemImporter};

/// Default importer: load the record, create it at the destination, record
/// the mapping. Already-recorded items are skipped without reading the file.
pub struct RecordImporter {
    destination: Arc<dyn Destination>,
}

impl RecordImporter {
    pub fn new(destination: Arc<dyn Destination>) -> Self {
        Self { destination }
    }
}

#[async_trait]
impl ItemImporter for RecordImporter {
    async fn import(&self, ctx: &ImportContext, legacy_id: i64) -> anyhow::Result<()> {
        let entity = ctx.entity();
        if let Some(new_id) = ctx.ledger.resolve(entity, legacy_id) {
            debug!(%entity, legacy_id, new_id, "Already imported, skipping");
            return Ok(());
        }

        let record = ctx
            .index
            .load(entity, legacy_id)
            .await
            .with_context(|| format!("Failed to load {entity} {legacy_id}"))?;

        let outcome = ctx
            .ledger
            .import_once(entity, legacy_id, || self.destination.create(ctx, &record))
            .await
            .with_context(|| format!("Failed to import {entity} {legacy_id}"))?;

        if let ImportOutcome::Created(new_id) = outcome {
            debug!(%entity, legacy_id, new_id, "Imported");
        }
        Ok(())
    }
}
