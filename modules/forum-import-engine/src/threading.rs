//! Reply-threading policy for posts.

use forum_import_common::EntityType;
use forum_import_ledger::Ledger;

/// Where an imported post attaches in its thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyParent {
    /// Top-level post.
    Root,
    /// Reply to the post with this new ID.
    Parent(i64),
    /// The legacy parent was never imported. Callers store the post as a
    /// root and keep the legacy ID for later repair.
    Unresolved(i64),
}

impl ReplyParent {
    /// New parent ID to store, if any.
    pub fn new_id(self) -> Option<i64> {
        match self {
            ReplyParent::Parent(id) => Some(id),
            ReplyParent::Root | ReplyParent::Unresolved(_) => None,
        }
    }
}

/// Resolve the parent of post `legacy_id` that claims to reply to
/// `in_reply_to`.
///
/// Legacy IDs are assigned in creation order, so a parent can never have an
/// ID at or above its child's. Such links, and non-positive ones, are
/// treated as absent.
pub fn reply_parent(ledger: &Ledger, legacy_id: i64, in_reply_to: Option<i64>) -> ReplyParent {
    let Some(parent) = in_reply_to else {
        return ReplyParent::Root;
    };
    if parent <= 0 || parent >= legacy_id {
        return ReplyParent::Root;
    }
    match ledger.resolve(EntityType::Comment, parent) {
        Some(new_id) => ReplyParent::Parent(new_id),
        None => ReplyParent::Unresolved(parent),
    }
}
