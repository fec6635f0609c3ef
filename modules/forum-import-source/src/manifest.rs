//! Optional `index.json` manifest: the fast path that avoids walking
//! directories with hundreds of thousands of files.

use std::path::Path;

use serde::Deserialize;

use crate::error::{IndexError, Result};

/// File name looked up at the root of each entity type's directory.
pub const MANIFEST_FILE: &str = "index.json";

#[derive(Debug, Clone, Deserialize)]
pub struct Manifest {
    #[serde(default)]
    pub files: Vec<ManifestEntry>,
}

/// One exported record. Fields beyond these are ignored.
#[derive(Debug, Clone, Deserialize)]
pub struct ManifestEntry {
    pub id: i64,
    /// Location of the record, relative to the entity type's directory.
    #[serde(alias = "relativePath")]
    pub path: String,
    #[serde(default)]
    pub email: Option<String>,
}

impl Manifest {
    /// Read the manifest at `path`. `Ok(None)` when the file does not exist.
    pub fn load(path: &Path) -> Result<Option<Manifest>> {
        let bytes = match std::fs::read(path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(IndexError::Io {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };

        let manifest = serde_json::from_slice(&bytes).map_err(|source| IndexError::Manifest {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Some(manifest))
    }
}
