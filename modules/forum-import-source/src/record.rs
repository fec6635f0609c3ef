use std::path::{Path, PathBuf};

use forum_import_common::EntityType;
use serde::de::DeserializeOwned;

use crate::error::{IndexError, Result};

/// One legacy record as read from the export. The body is kept as raw JSON;
/// its field-level schema belongs to whoever imports it.
#[derive(Debug, Clone)]
pub struct SourceRecord {
    pub entity: EntityType,
    pub legacy_id: i64,
    pub location: PathBuf,
    pub body: serde_json::Value,
}

impl SourceRecord {
    pub async fn read(entity: EntityType, legacy_id: i64, path: &Path) -> Result<Self> {
        let bytes = tokio::fs::read(path).await.map_err(|source| IndexError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let body = serde_json::from_slice(&bytes).map_err(|source| IndexError::Parse {
            path: path.to_path_buf(),
            source,
        })?;

        Ok(Self {
            entity,
            legacy_id,
            location: path.to_path_buf(),
            body,
        })
    }

    /// Deserialize the body into a typed record.
    pub fn parse<T: DeserializeOwned>(&self) -> Result<T> {
        T::deserialize(&self.body).map_err(|source| IndexError::Parse {
            path: self.location.clone(),
            source,
        })
    }

    /// Integer field at a JSON pointer such as `/association/onId`.
    pub fn id_at(&self, pointer: &str) -> Option<i64> {
        self.body.pointer(pointer).and_then(serde_json::Value::as_i64)
    }
}
