//! Directory-walk fallback.
//!
//! Record IDs are encoded in the path: `comments/321/321/1.json` holds
//! comment 3213211.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use tracing::warn;
use walkdir::WalkDir;

use crate::error::Result;
use crate::manifest::MANIFEST_FILE;

const RECORD_EXTENSION: &str = "json";

/// Derive the legacy ID of the record at `path` under `type_root`.
///
/// Strips the type root and the extension, drops path separators and parses
/// what is left. `None` if the remainder is not a positive integer.
pub fn legacy_id_from_path(type_root: &Path, path: &Path) -> Option<i64> {
    let relative = path.strip_prefix(type_root).ok()?;
    let stem = relative.with_extension("");

    let mut digits = String::new();
    for component in stem.components() {
        digits.push_str(component.as_os_str().to_str()?);
    }

    match digits.parse::<i64>() {
        Ok(id) if id > 0 => Some(id),
        _ => None,
    }
}

/// Walk `type_root` and map every record file to its legacy ID.
///
/// Files whose ID cannot be derived are logged and skipped.
pub(crate) fn walk_records(type_root: &Path) -> Result<HashMap<i64, PathBuf>> {
    let mut locations = HashMap::new();

    for entry in WalkDir::new(type_root).follow_links(true) {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        if path.extension().and_then(|ext| ext.to_str()) != Some(RECORD_EXTENSION) {
            continue;
        }
        if entry.depth() == 1 && entry.file_name() == MANIFEST_FILE {
            continue;
        }

        let Some(id) = legacy_id_from_path(type_root, path) else {
            warn!(path = %path.display(), "Cannot derive legacy ID from path, skipping");
            continue;
        };

        if let Some(previous) = locations.insert(id, path.to_path_buf()) {
            warn!(
                id,
                kept = %path.display(),
                dropped = %previous.display(),
                "Two files map to the same legacy ID"
            );
        }
    }

    Ok(locations)
}
