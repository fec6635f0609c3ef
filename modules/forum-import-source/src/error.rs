use std::path::PathBuf;

use forum_import_common::EntityType;

/// Result type alias for index operations.
pub type Result<T> = std::result::Result<T, IndexError>;

#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    #[error("Failed to read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to walk export tree: {0}")]
    Walk(#[from] walkdir::Error),

    #[error("Malformed manifest {}: {source}", .path.display())]
    Manifest {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Malformed record {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("{0} records have not been indexed")]
    NotIndexed(EntityType),

    #[error("No {entity} record with legacy ID {legacy_id} in the export")]
    MissingRecord { entity: EntityType, legacy_id: i64 },
}
