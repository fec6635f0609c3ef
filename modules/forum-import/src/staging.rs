//! Postgres staging destination.
//!
//! Each record lands in `staged_items` as its raw JSON body plus a `refs`
//! object holding the new IDs of everything it points at, so the whole
//! pipeline can run end to end before the production schema exists.

use anyhow::Context;
use async_trait::async_trait;
use forum_import_common::{EntityType, SiteConfig, DELETED_LEGACY_ID};
use forum_import_engine::{reply_parent, Destination, ImportContext, ReplyParent, SiteHandle};
use forum_import_source::SourceRecord;
use serde_json::{json, Map, Value};
use sqlx::PgPool;
use tracing::{info, warn};

pub struct StagingDestination {
    pool: PgPool,
}

impl StagingDestination {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct SiteRow {
    site_id: i64,
    admin_profile_id: Option<i64>,
}

/// A field of a record that names another imported item.
struct Reference {
    name: &'static str,
    pointer: &'static str,
    target: EntityType,
}

const FORUM: Reference = Reference {
    name: "forum",
    pointer: "/forumId",
    target: EntityType::Forum,
};

const CONVERSATION: Reference = Reference {
    name: "conversation",
    pointer: "/association/onId",
    target: EntityType::Conversation,
};

/// Required references per type. Authors are handled separately since they
/// always resolve.
fn references(entity: EntityType) -> &'static [Reference] {
    match entity {
        EntityType::Conversation => &[FORUM],
        EntityType::Comment => &[CONVERSATION],
        EntityType::Profile
        | EntityType::Forum
        | EntityType::Huddle
        | EntityType::Attachment
        | EntityType::Follow
        | EntityType::Role => &[],
    }
}

fn has_author(entity: EntityType) -> bool {
    !matches!(entity, EntityType::Profile | EntityType::Role)
}

/// New IDs for everything `record` refers to.
///
/// Fails when a required reference was never imported. Unknown authors map
/// to the deleted-user placeholder; unresolved reply parents are kept as
/// legacy IDs and the comment is stored as a root.
pub fn resolve_refs(ctx: &ImportContext, record: &SourceRecord) -> anyhow::Result<Value> {
    let mut refs = Map::new();

    if has_author(record.entity) {
        refs.insert("author".into(), json!(ctx.author(record.id_at("/author"))));
    }

    for reference in references(record.entity) {
        let legacy = record.id_at(reference.pointer).with_context(|| {
            format!(
                "{} {} has no {}",
                record.entity, record.legacy_id, reference.pointer
            )
        })?;
        let new_id = ctx.ledger.resolve(reference.target, legacy).with_context(|| {
            format!(
                "{} {} references {} {} which has not been imported",
                record.entity, record.legacy_id, reference.target, legacy
            )
        })?;
        refs.insert(reference.name.into(), json!(new_id));
    }

    if record.entity == EntityType::Comment {
        match reply_parent(&ctx.ledger, record.legacy_id, record.id_at("/inReplyTo")) {
            ReplyParent::Root => {}
            ReplyParent::Parent(parent) => {
                refs.insert("inReplyTo".into(), json!(parent));
            }
            ReplyParent::Unresolved(legacy) => {
                warn!(
                    comment = record.legacy_id,
                    in_reply_to = legacy,
                    "Reply parent not imported, storing as root"
                );
                refs.insert("unresolvedInReplyTo".into(), json!(legacy));
            }
        }
    }

    Ok(Value::Object(refs))
}

async fn insert_item<'e, E>(
    executor: E,
    site_id: i64,
    entity: EntityType,
    legacy_id: i64,
    body: &Value,
    refs: &Value,
) -> sqlx::Result<i64>
where
    E: sqlx::PgExecutor<'e>,
{
    sqlx::query_scalar::<_, i64>(
        r#"
        INSERT INTO staged_items (site_id, item_type_id, legacy_id, body, refs)
        VALUES ($1, $2, $3, $4, $5)
        RETURNING item_id
        "#,
    )
    .bind(site_id)
    .bind(entity.item_type_id())
    .bind(legacy_id)
    .bind(body)
    .bind(refs)
    .fetch_one(executor)
    .await
}

#[async_trait]
impl Destination for StagingDestination {
    async fn prepare_site(&self, site: &SiteConfig, admin: &SourceRecord) -> anyhow::Result<SiteHandle> {
        let key = site.subdomain_key.to_lowercase();

        let existing = sqlx::query_as::<_, SiteRow>(
            "SELECT site_id, admin_profile_id FROM staged_sites WHERE subdomain_key = $1",
        )
        .bind(&key)
        .fetch_optional(&self.pool)
        .await?;

        if let Some(row) = existing {
            let admin_profile_id = row
                .admin_profile_id
                .with_context(|| format!("Staged site {} has no administrator", row.site_id))?;
            return Ok(SiteHandle {
                destination_id: row.site_id,
                admin_profile_id,
                created: false,
            });
        }

        let mut tx = self.pool.begin().await?;

        let site_id = sqlx::query_scalar::<_, i64>(
            r#"
            INSERT INTO staged_sites (subdomain_key, title, description, owner_legacy_id)
            VALUES ($1, $2, $3, $4)
            RETURNING site_id
            "#,
        )
        .bind(&key)
        .bind(&site.name)
        .bind(&site.description)
        .bind(site.owner_id)
        .fetch_one(&mut *tx)
        .await?;

        let admin_profile_id = insert_item(
            &mut *tx,
            site_id,
            EntityType::Profile,
            admin.legacy_id,
            &admin.body,
            &json!({}),
        )
        .await?;

        sqlx::query("UPDATE staged_sites SET admin_profile_id = $2 WHERE site_id = $1")
            .bind(site_id)
            .bind(admin_profile_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        info!(site_id, subdomain_key = %key, "Staged site created");

        Ok(SiteHandle {
            destination_id: site_id,
            admin_profile_id,
            created: true,
        })
    }

    async fn create_deleted_profile(&self, site: &SiteHandle) -> anyhow::Result<i64> {
        let mut tx = self.pool.begin().await?;

        let existing = sqlx::query_scalar::<_, Option<i64>>(
            "SELECT deleted_profile_id FROM staged_sites WHERE site_id = $1 FOR UPDATE",
        )
        .bind(site.destination_id)
        .fetch_one(&mut *tx)
        .await?;

        if let Some(id) = existing {
            tx.commit().await?;
            return Ok(id);
        }

        let id = insert_item(
            &mut *tx,
            site.destination_id,
            EntityType::Profile,
            DELETED_LEGACY_ID,
            &json!({ "name": "deleted" }),
            &json!({}),
        )
        .await?;

        sqlx::query("UPDATE staged_sites SET deleted_profile_id = $2 WHERE site_id = $1")
            .bind(site.destination_id)
            .bind(id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(id)
    }

    async fn create(&self, ctx: &ImportContext, record: &SourceRecord) -> anyhow::Result<i64> {
        let refs = resolve_refs(ctx, record)?;
        let id = insert_item(
            &self.pool,
            ctx.destination_id,
            record.entity,
            record.legacy_id,
            &record.body,
            &refs,
        )
        .await?;
        Ok(id)
    }
}
