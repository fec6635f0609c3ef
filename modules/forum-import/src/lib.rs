pub mod staging;
pub mod ticker;

pub use staging::{resolve_refs, StagingDestination};
pub use ticker::ProgressTicker;
