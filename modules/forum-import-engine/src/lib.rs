//! Resumable, staged migration engine.
//!
//! The [`Pipeline`] walks the fixed stage order, feeding each stage's legacy
//! IDs through a bounded [`TaskPool`]. Per-item work is delegated to an
//! [`ItemImporter`]; the default [`RecordImporter`] loads the record from the
//! export and hands it to a [`Destination`], recording the result in the
//! idempotency ledger so a re-run skips it.

pub mod context;
pub mod error;
pub mod importer;
pub mod pipeline;
pub mod progress;
pub mod scheduler;
pub mod stage;
pub mod threading;
pub mod traits;

pub use context::ImportContext;
pub use error::{PipelineError, TaskError};
pub use importer::RecordImporter;
pub use pipeline::{ImportOptions, ImportSummary, Pipeline, StageReport};
pub use progress::{Progress, ProgressSnapshot};
pub use scheduler::{run_tasks, TaskFailure, TaskPool};
pub use stage::{PipelineState, Stage};
pub use threading::{reply_parent, ReplyParent};
pub use traits::{Destination, ItemImporter, SiteHandle};
