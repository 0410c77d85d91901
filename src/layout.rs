//! Archive-side directories. Everything here creates or clears generated
//! output; nothing here ever removes an archived clip.

use std::path::{Path, PathBuf};

use crate::config::THUMBS_DIR_NAME;
use crate::error::{ArchiveError, Result};

pub fn ensure_archive_root(archive_base: &Path, library_name: &str) -> Result<PathBuf> {
    let root = archive_base.join(library_name);
    if !root.is_dir() {
        tracing::info!(path = %root.display(), "creating archive root");
    }
    std::fs::create_dir_all(&root).map_err(|source| ArchiveError::ArchiveRoot {
        path: root.clone(),
        source,
    })?;
    Ok(root)
}

pub fn ensure_collection_dir(archive_root: &Path, collection_name: &str) -> Result<PathBuf> {
    let dir = archive_root.join(collection_name);
    if !dir.is_dir() {
        tracing::info!(collection = collection_name, "creating archive event");
    }
    std::fs::create_dir_all(&dir).map_err(|source| ArchiveError::CollectionDir {
        path: dir.clone(),
        source,
    })?;
    Ok(dir)
}

pub fn thumbs_dir(collection_dir: &Path) -> PathBuf {
    collection_dir.join(THUMBS_DIR_NAME)
}

/// Makes sure `thumbs/` exists and holds no previously rendered frames.
/// Returns the number of stale frames removed.
pub fn prepare_thumbnails(collection_dir: &Path, image_extension: &str) -> Result<usize> {
    let dir = thumbs_dir(collection_dir);
    let thumbs_err = |source| ArchiveError::Thumbnails {
        path: dir.clone(),
        source,
    };

    if !dir.is_dir() {
        tracing::info!(path = %dir.display(), "creating thumb directory");
        std::fs::create_dir_all(&dir).map_err(thumbs_err)?;
        return Ok(0);
    }

    let mut removed = 0usize;
    for entry in std::fs::read_dir(&dir).map_err(thumbs_err)? {
        let path = entry.map_err(thumbs_err)?.path();
        if !path.is_file() || !has_extension(&path, image_extension) {
            continue;
        }
        std::fs::remove_file(&path).map_err(thumbs_err)?;
        removed += 1;
    }
    tracing::debug!(path = %dir.display(), removed, "cleaned thumb directory");
    Ok(removed)
}

fn has_extension(path: &Path, ext: &str) -> bool {
    path.extension()
        .map(|e| e.to_string_lossy().eq_ignore_ascii_case(ext))
        .unwrap_or(false)
}
