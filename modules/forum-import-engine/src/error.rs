use forum_import_common::EntityType;
use forum_import_ledger::LedgerError;
use forum_import_source::IndexError;

use crate::scheduler::TaskFailure;
use crate::stage::Stage;

/// Per-item failures raised by the scheduler itself, before or around the
/// import function.
#[derive(Debug, thiserror::Error)]
pub enum TaskError {
    #[error("legacy ID {0} is not a valid identifier")]
    InvalidLegacyId(i64),

    #[error("import of legacy ID {legacy_id} panicked: {message}")]
    Panicked { legacy_id: i64, message: String },
}

/// Run-ending errors. Anything here stops the pipeline before the next stage.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("Site owner {0} was not found among the exported profiles")]
    AdminNotFound(i64),

    #[error("Import origin {0} is already finalized")]
    AlreadyFinalized(i64),

    #[error("Failed to index {entity} records: {source}")]
    Index {
        entity: EntityType,
        #[source]
        source: IndexError,
    },

    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),

    #[error("Setup failed: {0:#}")]
    Setup(#[source] anyhow::Error),

    #[error("Stage {stage} failed: {} item(s) could not be imported", .failures.len())]
    StageFailed {
        stage: Stage,
        failures: Vec<TaskFailure>,
    },

    #[error("Import interrupted during stage {0}")]
    Interrupted(Stage),
}

impl PipelineError {
    /// Item failures carried by a failed stage. Empty for other errors.
    pub fn failures(&self) -> &[TaskFailure] {
        match self {
            PipelineError::StageFailed { failures, .. } => failures,
            _ => &[],
        }
    }
}
