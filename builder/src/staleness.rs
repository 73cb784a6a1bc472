// Licensed under the Apache-2.0 license

//! Decides whether a filesystem image is older than the tree it was built
//! from. Only modification times are compared; touching a file without
//! changing it still forces a rebuild.

use std::fs;
use std::io;
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use log::{debug, warn};
use walkdir::WalkDir;

use crate::error::{BuildError, Result};

/// Most recent modification time of any file under `dir`.
///
/// Returns `UNIX_EPOCH` when the tree holds no files or does not exist, so an
/// existing image is never considered stale because of an empty tree.
pub fn newest_mtime(dir: &Path) -> Result<SystemTime> {
    if !dir.is_dir() {
        warn!("Asset directory {} does not exist", dir.display());
        return Ok(UNIX_EPOCH);
    }

    let walk_context = || format!("scanning {}", dir.display());
    let mut newest = UNIX_EPOCH;
    for entry in WalkDir::new(dir).follow_links(true) {
        let entry = entry.map_err(|e| BuildError::io(walk_context())(io::Error::from(e)))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let modified = entry
            .metadata()
            .map_err(|e| BuildError::io(walk_context())(io::Error::from(e)))?
            .modified()
            .map_err(BuildError::io(format!(
                "reading mtime of {}",
                entry.path().display()
            )))?;
        newest = newest.max(modified);
    }
    Ok(newest)
}

/// True when `image` is missing or any file under `source_dir` was modified
/// strictly after it.
pub fn needs_rebuild(image: &Path, source_dir: &Path) -> Result<bool> {
    let image_mtime = match fs::metadata(image) {
        Ok(meta) if meta.is_file() => meta.modified().map_err(BuildError::io(format!(
            "reading mtime of {}",
            image.display()
        )))?,
        Ok(_) => return Ok(true),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            debug!("{} does not exist yet", image.display());
            return Ok(true);
        }
        Err(e) => {
            return Err(BuildError::io(format!("reading metadata of {}", image.display()))(e))
        }
    };
    Ok(newest_mtime(source_dir)? > image_mtime)
}
