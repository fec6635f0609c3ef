//! The closed set of legacy entity types handled by the importer.
//!
//! Every per-type table (item type IDs, export directories, cache partitions)
//! is an exhaustive `match`, so adding a variant fails the build until each
//! mapping is filled in.

use std::fmt;
use std::ops::Index;

use serde::{Deserialize, Serialize};

/// Legacy ID reserved for "deleted / unknown" references in the export.
/// The destination cannot store zero, so the ledger maps it to a placeholder.
pub const DELETED_LEGACY_ID: i64 = 0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    Profile,
    Forum,
    Conversation,
    Comment,
    Huddle,
    Attachment,
    Follow,
    Role,
}

impl EntityType {
    pub const COUNT: usize = 8;

    pub const ALL: [EntityType; Self::COUNT] = [
        EntityType::Profile,
        EntityType::Forum,
        EntityType::Conversation,
        EntityType::Comment,
        EntityType::Huddle,
        EntityType::Attachment,
        EntityType::Follow,
        EntityType::Role,
    ];

    /// Position in [`EntityType::ALL`]. Used to address per-type arrays.
    pub fn index(self) -> usize {
        match self {
            EntityType::Profile => 0,
            EntityType::Forum => 1,
            EntityType::Conversation => 2,
            EntityType::Comment => 3,
            EntityType::Huddle => 4,
            EntityType::Attachment => 5,
            EntityType::Follow => 6,
            EntityType::Role => 7,
        }
    }

    /// Stable integer persisted in `imported_items.item_type_id`.
    pub fn item_type_id(self) -> i64 {
        match self {
            EntityType::Forum => 2,
            EntityType::Profile => 3,
            EntityType::Comment => 4,
            EntityType::Huddle => 5,
            EntityType::Conversation => 6,
            EntityType::Role => 16,
            EntityType::Follow => 18,
            EntityType::Attachment => 20,
        }
    }

    pub fn from_item_type_id(id: i64) -> Option<Self> {
        Self::ALL.into_iter().find(|e| e.item_type_id() == id)
    }

    /// Subdirectory of the export root holding this type's records.
    pub fn export_dir(self) -> &'static str {
        match self {
            EntityType::Profile => "profiles",
            EntityType::Forum => "forums",
            EntityType::Conversation => "conversations",
            EntityType::Comment => "comments",
            EntityType::Huddle => "messages",
            EntityType::Attachment => "attachments",
            EntityType::Follow => "follows",
            EntityType::Role => "roles",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            EntityType::Profile => "profile",
            EntityType::Forum => "forum",
            EntityType::Conversation => "conversation",
            EntityType::Comment => "comment",
            EntityType::Huddle => "huddle",
            EntityType::Attachment => "attachment",
            EntityType::Follow => "follow",
            EntityType::Role => "role",
        }
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One value per entity type, addressed without hashing.
#[derive(Debug)]
pub struct EntityMap<T> {
    slots: [T; EntityType::COUNT],
}

impl<T> EntityMap<T> {
    pub fn new(mut init: impl FnMut(EntityType) -> T) -> Self {
        Self {
            slots: EntityType::ALL.map(&mut init),
        }
    }

    pub fn get(&self, entity: EntityType) -> &T {
        &self.slots[entity.index()]
    }

    pub fn get_mut(&mut self, entity: EntityType) -> &mut T {
        &mut self.slots[entity.index()]
    }

    pub fn iter(&self) -> impl Iterator<Item = (EntityType, &T)> {
        EntityType::ALL.into_iter().zip(self.slots.iter())
    }
}

impl<T: Default> Default for EntityMap<T> {
    fn default() -> Self {
        Self::new(|_| T::default())
    }
}

impl<T> Index<EntityType> for EntityMap<T> {
    type Output = T;

    fn index(&self, entity: EntityType) -> &T {
        self.get(entity)
    }
}
