use chrono::{DateTime, Utc};
use forum_import_common::EntityType;

/// One migration run: a single export imported into a single destination.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportOrigin {
    pub origin_id: i64,
    pub title: String,
    pub destination_id: i64,
    pub created_at: DateTime<Utc>,
    pub finalized_at: Option<DateTime<Utc>>,
}

impl ImportOrigin {
    pub fn is_finalized(&self) -> bool {
        self.finalized_at.is_some()
    }
}

/// A durable `legacy ID → new ID` mapping. Written once, never updated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImportRecord {
    pub origin_id: i64,
    pub entity: EntityType,
    pub legacy_id: i64,
    pub new_id: i64,
}

impl ImportRecord {
    pub fn new(origin_id: i64, entity: EntityType, legacy_id: i64, new_id: i64) -> Self {
        Self {
            origin_id,
            entity,
            legacy_id,
            new_id,
        }
    }
}
