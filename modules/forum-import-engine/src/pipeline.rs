//! Stage orchestration: bootstrap, then each stage in order.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;

use forum_import_common::{ConcurrencyConfig, EntityType, FileConfig, SiteConfig};
use forum_import_ledger::{ImportStore, Ledger};
use forum_import_source::{IndexError, IndexSource, SourceIndex, TypeIndex};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::context::ImportContext;
use crate::error::PipelineError;
use crate::importer::RecordImporter;
use crate::progress::Progress;
use crate::scheduler::{TaskFailure, TaskPool};
use crate::stage::{PipelineState, Stage};
use crate::traits::{Destination, ItemImporter};

#[derive(Debug, Clone, Copy, Default)]
pub struct ImportOptions {
    /// Run the irreversible finalization stage after the content stages.
    pub finalize: bool,
}

/// What one stage did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageReport {
    pub stage: Stage,
    /// Records found in the export.
    pub indexed: usize,
    /// Records handed to the scheduler after ledger filtering.
    pub dispatched: usize,
    pub passes: usize,
    pub concurrency: usize,
}

impl StageReport {
    pub fn skipped(&self) -> usize {
        self.indexed - self.dispatched
    }
}

#[derive(Debug, Clone)]
pub struct ImportSummary {
    pub origin_id: i64,
    pub destination_id: i64,
    /// True when an existing origin was picked up instead of created.
    pub resumed: bool,
    pub state: PipelineState,
    pub stages: Vec<StageReport>,
}

/// Drives an export through every stage into a [`Destination`].
pub struct Pipeline {
    site: SiteConfig,
    export_root: PathBuf,
    concurrency: ConcurrencyConfig,
    store: Arc<dyn ImportStore>,
    destination: Arc<dyn Destination>,
    importers: HashMap<Stage, Arc<dyn ItemImporter>>,
    progress: Arc<Progress>,
    shutdown: CancellationToken,
}

struct Session {
    ctx: ImportContext,
    resumed: bool,
    finalized: bool,
}

impl Pipeline {
    pub fn new(
        site: SiteConfig,
        export_root: impl Into<PathBuf>,
        store: Arc<dyn ImportStore>,
        destination: Arc<dyn Destination>,
    ) -> Self {
        Self {
            site,
            export_root: export_root.into(),
            concurrency: ConcurrencyConfig::default(),
            store,
            destination,
            importers: HashMap::new(),
            progress: Arc::new(Progress::new()),
            shutdown: CancellationToken::new(),
        }
    }

    pub fn from_config(
        config: &FileConfig,
        store: Arc<dyn ImportStore>,
        destination: Arc<dyn Destination>,
    ) -> Self {
        Self::new(
            config.site.clone(),
            config.export.root_path.clone(),
            store,
            destination,
        )
        .with_concurrency(config.concurrency.clone())
    }

    pub fn with_concurrency(mut self, concurrency: ConcurrencyConfig) -> Self {
        self.concurrency = concurrency;
        self
    }

    /// Replace the default [`RecordImporter`] for one stage.
    pub fn with_importer(mut self, stage: Stage, importer: Arc<dyn ItemImporter>) -> Self {
        self.importers.insert(stage, importer);
        self
    }

    /// Cancelling `token` stops the current stage and fails the run with
    /// [`PipelineError::Interrupted`]. Finished work stays recorded.
    pub fn with_shutdown(mut self, token: CancellationToken) -> Self {
        self.shutdown = token;
        self
    }

    pub fn progress(&self) -> Arc<Progress> {
        self.progress.clone()
    }

    /// Run the import. Safe to call again after any failure; completed work
    /// is skipped.
    pub async fn import(&self, options: ImportOptions) -> Result<ImportSummary, PipelineError> {
        let index = Arc::new(SourceIndex::new(self.export_root.clone()));
        let session = self.bootstrap(index).await?;
        let ctx = &session.ctx;

        if options.finalize && session.finalized {
            return Err(PipelineError::AlreadyFinalized(ctx.origin_id));
        }

        let mut state = PipelineState::Pending;
        let mut stages = Vec::with_capacity(Stage::ORDER.len());

        for stage in Stage::ORDER {
            if stage == Stage::Finalization && !options.finalize {
                info!("Content import complete; finalization not requested");
                break;
            }

            let report = self.run_stage(ctx, stage).await?;
            state = stage.completed_state();
            info!(
                stage = %stage,
                indexed = report.indexed,
                imported = report.dispatched,
                skipped = report.skipped(),
                "Stage complete"
            );
            stages.push(report);
        }

        if state == PipelineState::Finalized {
            ctx.ledger.store().mark_finalized(ctx.origin_id).await?;
            info!(origin_id = ctx.origin_id, "Import finalized");
        }

        Ok(ImportSummary {
            origin_id: ctx.origin_id,
            destination_id: ctx.destination_id,
            resumed: session.resumed,
            state,
            stages,
        })
    }

    // -----------------------------------------------------------------------
    // Bootstrap
    // -----------------------------------------------------------------------

    async fn bootstrap(&self, index: Arc<SourceIndex>) -> Result<Session, PipelineError> {
        // A bad export must fail the run before anything is written.
        for entity in EntityType::ALL {
            build_type(&index, entity).await?;
        }

        let owner_id = self.site.owner_id;
        let admin = match index.load(EntityType::Profile, owner_id).await {
            Ok(record) => record,
            Err(IndexError::MissingRecord { .. }) => {
                return Err(PipelineError::AdminNotFound(owner_id))
            }
            Err(source) => {
                return Err(PipelineError::Index {
                    entity: EntityType::Profile,
                    source,
                })
            }
        };

        let site = self
            .destination
            .prepare_site(&self.site, &admin)
            .await
            .map_err(PipelineError::Setup)?;
        if site.created {
            info!(destination_id = site.destination_id, "Created destination site");
        }

        let (origin, resumed) = match self.store.find_origin(site.destination_id).await? {
            Some(origin) => {
                info!(origin_id = origin.origin_id, "Resuming import");
                (origin, true)
            }
            None => {
                let origin = self
                    .store
                    .create_origin(&self.site.name, site.destination_id)
                    .await?;
                info!(origin_id = origin.origin_id, "Created import origin");
                (origin, false)
            }
        };

        let ledger = Arc::new(Ledger::new(self.store.clone(), origin.origin_id));
        ledger.preload().await?;

        if !ledger.is_imported(EntityType::Profile, owner_id) {
            ledger
                .record_import(EntityType::Profile, owner_id, site.admin_profile_id)
                .await?;
        }

        let deleted_profile_id = self
            .destination
            .create_deleted_profile(&site)
            .await
            .map_err(PipelineError::Setup)?;
        ledger.record_deleted_placeholder(EntityType::Profile, deleted_profile_id);

        Ok(Session {
            ctx: ImportContext {
                stage: Stage::Accounts,
                origin_id: origin.origin_id,
                destination_id: site.destination_id,
                admin_profile_id: site.admin_profile_id,
                deleted_profile_id,
                ledger,
                index,
            },
            resumed,
            finalized: origin.is_finalized(),
        })
    }

    // -----------------------------------------------------------------------
    // Stages
    // -----------------------------------------------------------------------

    async fn run_stage(&self, base: &ImportContext, stage: Stage) -> Result<StageReport, PipelineError> {
        let entity = stage.entity();
        let type_index = base.index.get(entity).ok_or_else(|| PipelineError::Index {
            entity,
            source: IndexError::NotIndexed(entity),
        })?;

        let indexed = type_index.len();
        let ids = if stage.is_repeatable() {
            base.ledger.remaining(entity, type_index.ids())
        } else {
            type_index.ids().to_vec()
        };
        let dispatched = ids.len();

        let mut concurrency = stage.concurrency(&self.concurrency);
        let passes = if stage == Stage::Accounts {
            if type_index.source() != IndexSource::Manifest {
                concurrency = 1;
            }
            account_passes(type_index, ids)
        } else {
            vec![ids]
        };

        info!(
            stage = %stage,
            indexed,
            skipped = indexed - dispatched,
            concurrency,
            "Starting stage"
        );

        let ctx = Arc::new(base.for_stage(stage));
        let importer = self.importer_for(stage);
        let pool = TaskPool::new(concurrency)
            .with_progress(self.progress.clone())
            .with_shutdown(self.shutdown.clone());

        let mut failures: Vec<TaskFailure> = Vec::new();
        let mut pass_count = 0;
        for pass in passes.into_iter().filter(|p| !p.is_empty()) {
            pass_count += 1;
            let importer = importer.clone();
            failures.extend(
                pool.run(pass, ctx.clone(), move |ctx, legacy_id| {
                    let importer = importer.clone();
                    async move { importer.import(&ctx, legacy_id).await }
                })
                .await,
            );
            if !failures.is_empty() || self.shutdown.is_cancelled() {
                break;
            }
        }

        if !failures.is_empty() {
            for failure in &failures {
                error!(
                    stage = %stage,
                    legacy_id = failure.legacy_id,
                    error = %format!("{:#}", failure.error),
                    "Import failed"
                );
            }
            return Err(PipelineError::StageFailed { stage, failures });
        }
        if self.shutdown.is_cancelled() {
            warn!(stage = %stage, "Shutdown requested, stopping");
            return Err(PipelineError::Interrupted(stage));
        }

        Ok(StageReport {
            stage,
            indexed,
            dispatched,
            passes: pass_count,
            concurrency,
        })
    }

    fn importer_for(&self, stage: Stage) -> Arc<dyn ItemImporter> {
        match self.importers.get(&stage) {
            Some(importer) => importer.clone(),
            None => Arc::new(RecordImporter::new(self.destination.clone())),
        }
    }
}

/// Index `entity` off the async runtime. A no-op once built.
async fn build_type(index: &Arc<SourceIndex>, entity: EntityType) -> Result<(), PipelineError> {
    if index.is_built(entity) {
        return Ok(());
    }
    let index = index.clone();
    tokio::task::spawn_blocking(move || index.build(entity).map(|_| ()))
        .await
        .map_err(|e| PipelineError::Setup(e.into()))?
        .map_err(|source| PipelineError::Index { entity, source })
}

/// Split pending profile IDs into first-seen e-mails and later duplicates.
///
/// "First seen" is decided over every indexed profile in ascending order,
/// not only the pending ones, so a resumed run keeps the same split.
fn account_passes(index: &TypeIndex, pending: Vec<i64>) -> Vec<Vec<i64>> {
    if index.source() != IndexSource::Manifest {
        return vec![pending];
    }

    let mut seen = HashSet::new();
    let mut duplicates = HashSet::new();
    for &id in index.ids() {
        if let Some(email) = index.email(id) {
            if !seen.insert(email.to_lowercase()) {
                duplicates.insert(id);
            }
        }
    }

    let (second, first): (Vec<i64>, Vec<i64>) =
        pending.into_iter().partition(|id| duplicates.contains(id));
    vec![first, second]
}
