//! Durable storage for import origins and import records.
//!
//! Every call is atomic on its own. Uniqueness of
//! `(origin_id, item_type_id, old_id)` is enforced by the primary key, which
//! is what ultimately makes a re-run safe.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use forum_import_common::EntityType;
use sqlx::PgPool;
use tracing::warn;

use crate::error::{LedgerError, Result};
use crate::types::{ImportOrigin, ImportRecord};

/// Implemented by [`PgImportStore`] (production) and
/// [`MemoryImportStore`](crate::MemoryImportStore) (tests).
#[async_trait]
pub trait ImportStore: Send + Sync {
    /// Record that an import into `destination_id` is starting.
    async fn create_origin(&self, title: &str, destination_id: i64) -> Result<ImportOrigin>;

    /// The origin of a previous, possibly interrupted, import into `destination_id`.
    async fn find_origin(&self, destination_id: i64) -> Result<Option<ImportOrigin>>;

    /// Stamp the origin as finalized. Fails if the origin does not exist.
    async fn mark_finalized(&self, origin_id: i64) -> Result<()>;

    /// Append one mapping. Returns [`LedgerError::Duplicate`] if the key exists.
    async fn append_import_record(&self, record: &ImportRecord) -> Result<()>;

    /// Every mapping recorded for `origin_id`.
    async fn list_import_records(&self, origin_id: i64) -> Result<Vec<ImportRecord>>;

    async fn count_import_records(&self, origin_id: i64) -> Result<i64>;
}

// ---------------------------------------------------------------------------
// Postgres
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct PgImportStore {
    pool: PgPool,
}

#[derive(Debug, sqlx::FromRow)]
struct OriginRow {
    origin_id: i64,
    title: String,
    destination_id: i64,
    created_at: DateTime<Utc>,
    finalized_at: Option<DateTime<Utc>>,
}

impl From<OriginRow> for ImportOrigin {
    fn from(row: OriginRow) -> Self {
        ImportOrigin {
            origin_id: row.origin_id,
            title: row.title,
            destination_id: row.destination_id,
            created_at: row.created_at,
            finalized_at: row.finalized_at,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct ImportRecordRow {
    item_type_id: i64,
    old_id: i64,
    item_id: i64,
}

impl PgImportStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl ImportStore for PgImportStore {
    async fn create_origin(&self, title: &str, destination_id: i64) -> Result<ImportOrigin> {
        let row = sqlx::query_as::<_, OriginRow>(
            r#"
            INSERT INTO import_origins (title, destination_id)
            VALUES ($1, $2)
            RETURNING origin_id, title, destination_id, created_at, finalized_at
            "#,
        )
        .bind(title)
        .bind(destination_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(row.into())
    }

    async fn find_origin(&self, destination_id: i64) -> Result<Option<ImportOrigin>> {
        let row = sqlx::query_as::<_, OriginRow>(
            r#"
            SELECT origin_id, title, destination_id, created_at, finalized_at
            FROM import_origins
            WHERE destination_id = $1
            "#,
        )
        .bind(destination_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(Into::into))
    }

    async fn mark_finalized(&self, origin_id: i64) -> Result<()> {
        let result = sqlx::query(
            "UPDATE import_origins SET finalized_at = now() WHERE origin_id = $1",
        )
        .bind(origin_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(LedgerError::OriginNotFound(origin_id));
        }
        Ok(())
    }

    async fn append_import_record(&self, record: &ImportRecord) -> Result<()> {
        let result = sqlx::query(
            r#"
            INSERT INTO imported_items (origin_id, item_type_id, old_id, item_id)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(record.origin_id)
        .bind(record.entity.item_type_id())
        .bind(record.legacy_id)
        .bind(record.new_id)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(db)) if db.is_unique_violation() => {
                Err(LedgerError::Duplicate {
                    origin_id: record.origin_id,
                    entity: record.entity,
                    legacy_id: record.legacy_id,
                })
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn list_import_records(&self, origin_id: i64) -> Result<Vec<ImportRecord>> {
        let rows = sqlx::query_as::<_, ImportRecordRow>(
            r#"
            SELECT item_type_id, old_id, item_id
            FROM imported_items
            WHERE origin_id = $1
            "#,
        )
        .bind(origin_id)
        .fetch_all(&self.pool)
        .await?;

        let mut records = Vec::with_capacity(rows.len());
        for row in rows {
            let Some(entity) = EntityType::from_item_type_id(row.item_type_id) else {
                warn!(
                    origin_id,
                    item_type_id = row.item_type_id,
                    old_id = row.old_id,
                    "Skipping import record with unknown item type"
                );
                continue;
            };
            records.push(ImportRecord::new(origin_id, entity, row.old_id, row.item_id));
        }

        Ok(records)
    }

    async fn count_import_records(&self, origin_id: i64) -> Result<i64> {
        let count = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM imported_items WHERE origin_id = $1",
        )
        .bind(origin_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(count)
    }
}
