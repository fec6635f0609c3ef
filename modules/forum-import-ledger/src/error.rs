use forum_import_common::EntityType;

/// Result type alias for ledger operations.
pub type Result<T> = std::result::Result<T, LedgerError>;

#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("{entity} {legacy_id} is already recorded for origin {origin_id}")]
    Duplicate {
        origin_id: i64,
        entity: EntityType,
        legacy_id: i64,
    },

    #[error("Import origin {0} not found")]
    OriginNotFound(i64),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl LedgerError {
    pub fn is_duplicate(&self) -> bool {
        matches!(self, LedgerError::Duplicate { .. })
    }
}
