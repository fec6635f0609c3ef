//! Catalog of the legacy export on disk.
//!
//! For each entity type the index knows every legacy ID (ascending) and where
//! that record's JSON lives. Records themselves are read lazily, one at a
//! time, by the import workers.

pub mod error;
pub mod index;
pub mod manifest;
pub mod record;
pub mod walk;

pub use error::{IndexError, Result};
pub use index::{build_index, IndexSource, SourceIndex, TypeIndex};
pub use manifest::{Manifest, ManifestEntry, MANIFEST_FILE};
pub use record::SourceRecord;
pub use walk::legacy_id_from_path;
