use async_trait::async_trait;
use forum_import_common::SiteConfig;
use forum_import_source::SourceRecord;

use crate::context::ImportContext;

/// Destination site as resolved or created during setup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SiteHandle {
    pub destination_id: i64,
    pub admin_profile_id: i64,
    /// True when this run created the site.
    pub created: bool,
}

/// The system being imported into.
///
/// Implementations own the field-level mapping of each record type. They
/// never touch the ledger; the engine records whatever ID they return.
#[async_trait]
pub trait Destination: Send + Sync {
    /// Find the site described by `site`, or create it owned by `admin`.
    async fn prepare_site(&self, site: &SiteConfig, admin: &SourceRecord) -> anyhow::Result<SiteHandle>;

    /// Return the profile used for authors who no longer exist, creating it
    /// if needed. Must be idempotent.
    async fn create_deleted_profile(&self, site: &SiteHandle) -> anyhow::Result<i64>;

    /// Create the destination object for `record` and return its new ID.
    async fn create(&self, ctx: &ImportContext, record: &SourceRecord) -> anyhow::Result<i64>;
}

/// Per-item work of one stage.
#[async_trait]
pub trait ItemImporter: Send + Sync {
    async fn import(&self, ctx: &ImportContext, legacy_id: i64) -> anyhow::Result<()>;
}
