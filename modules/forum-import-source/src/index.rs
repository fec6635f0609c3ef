use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use forum_import_common::{EntityMap, EntityType};
use tracing::{info, warn};

use crate::error::{IndexError, Result};
use crate::manifest::{Manifest, MANIFEST_FILE};
use crate::record::SourceRecord;
use crate::walk::walk_records;

/// How a [`TypeIndex`] was discovered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexSource {
    Manifest,
    Walk,
    /// The export has no directory for this type.
    Missing,
}

/// Every known record of one entity type.
#[derive(Debug)]
pub struct TypeIndex {
    entity: EntityType,
    source: IndexSource,
    ids: Vec<i64>,
    locations: HashMap<i64, PathBuf>,
    emails: HashMap<i64, String>,
}

impl TypeIndex {
    fn new(
        entity: EntityType,
        source: IndexSource,
        locations: HashMap<i64, PathBuf>,
        emails: HashMap<i64, String>,
    ) -> Self {
        let mut ids: Vec<i64> = locations.keys().copied().collect();
        ids.sort_unstable();
        Self {
            entity,
            source,
            ids,
            locations,
            emails,
        }
    }

    pub fn entity(&self) -> EntityType {
        self.entity
    }

    pub fn source(&self) -> IndexSource {
        self.source
    }

    /// All legacy IDs, strictly ascending.
    pub fn ids(&self) -> &[i64] {
        &self.ids
    }

    pub fn locate(&self, legacy_id: i64) -> Option<&Path> {
        self.locations.get(&legacy_id).map(PathBuf::as_path)
    }

    /// E-mail recorded for `legacy_id` in the manifest, if any.
    pub fn email(&self, legacy_id: i64) -> Option<&str> {
        self.emails.get(&legacy_id).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

/// Build the index of `entity` under the export at `root`.
///
/// Uses `<root>/<type dir>/index.json` when present, otherwise walks the
/// type's directory. A malformed manifest is an error; a malformed path is not.
pub fn build_index(root: &Path, entity: EntityType) -> Result<TypeIndex> {
    let type_root = root.join(entity.export_dir());

    if !type_root.is_dir() {
        warn!(%entity, path = %type_root.display(), "Export has no directory for type");
        return Ok(TypeIndex::new(entity, IndexSource::Missing, HashMap::new(), HashMap::new()));
    }

    if let Some(manifest) = Manifest::load(&type_root.join(MANIFEST_FILE))? {
        let mut locations = HashMap::with_capacity(manifest.files.len());
        let mut emails = HashMap::new();
        for file in manifest.files {
            if file.id <= 0 {
                warn!(%entity, id = file.id, "Manifest entry has a reserved ID, skipping");
                continue;
            }
            if let Some(email) = file.email {
                emails.insert(file.id, email);
            }
            locations.insert(file.id, type_root.join(&file.path));
        }

        let index = TypeIndex::new(entity, IndexSource::Manifest, locations, emails);
        info!(%entity, records = index.len(), "Indexed from manifest");
        return Ok(index);
    }

    let locations = walk_records(&type_root)?;
    let index = TypeIndex::new(entity, IndexSource::Walk, locations, HashMap::new());
    info!(%entity, records = index.len(), "Indexed by directory walk");
    Ok(index)
}

/// Catalog of an export, one [`TypeIndex`] per entity type.
///
/// Each type is built at most once; after that it is read-only and shared
/// freely between workers.
#[derive(Debug)]
pub struct SourceIndex {
    root: PathBuf,
    types: EntityMap<OnceLock<TypeIndex>>,
}

impl SourceIndex {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            types: EntityMap::default(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Index `entity` if it has not been indexed yet.
    pub fn build(&self, entity: EntityType) -> Result<&TypeIndex> {
        let slot = self.types.get(entity);
        if let Some(index) = slot.get() {
            return Ok(index);
        }
        let index = build_index(&self.root, entity)?;
        // A concurrent builder may have won; either result is equivalent.
        Ok(slot.get_or_init(|| index))
    }

    pub fn is_built(&self, entity: EntityType) -> bool {
        self.types.get(entity).get().is_some()
    }

    pub fn get(&self, entity: EntityType) -> Option<&TypeIndex> {
        self.types.get(entity).get()
    }

    /// Ascending legacy IDs of `entity`. Empty if not built.
    pub fn list_ids(&self, entity: EntityType) -> &[i64] {
        self.get(entity).map(TypeIndex::ids).unwrap_or(&[])
    }

    pub fn locate(&self, entity: EntityType, legacy_id: i64) -> Option<&Path> {
        self.get(entity)?.locate(legacy_id)
    }

    /// Read and parse one record.
    pub async fn load(&self, entity: EntityType, legacy_id: i64) -> Result<SourceRecord> {
        let index = self.get(entity).ok_or(IndexError::NotIndexed(entity))?;
        let path = index
            .locate(legacy_id)
            .ok_or(IndexError::MissingRecord { entity, legacy_id })?;
        SourceRecord::read(entity, legacy_id, path).await
    }
}
