use std::sync::Arc;

use forum_import_common::EntityType;
use forum_import_ledger::Ledger;
use forum_import_source::SourceIndex;

use crate::stage::Stage;

/// Shared, read-only context handed to every task of a stage.
#[derive(Clone)]
pub struct ImportContext {
    pub stage: Stage,
    pub origin_id: i64,
    /// Destination-side site the origin imports into.
    pub destination_id: i64,
    /// New profile ID of the site owner.
    pub admin_profile_id: i64,
    /// New profile ID standing in for deleted legacy users.
    pub deleted_profile_id: i64,
    pub ledger: Arc<Ledger>,
    pub index: Arc<SourceIndex>,
}

impl ImportContext {
    /// Entity type the current stage imports.
    pub fn entity(&self) -> EntityType {
        self.stage.entity()
    }

    pub fn for_stage(&self, stage: Stage) -> Self {
        Self {
            stage,
            ..self.clone()
        }
    }

    /// New profile ID for a legacy author, falling back to the deleted-user
    /// placeholder.
    pub fn author(&self, legacy_id: Option<i64>) -> i64 {
        legacy_id
            .and_then(|id| self.ledger.resolve(EntityType::Profile, id))
            .unwrap_or(self.deleted_profile_id)
    }
}
