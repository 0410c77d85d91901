use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::error::{ArchiveError, Result};
use crate::metadata::ClipMetadata;

pub const MANIFEST_EXTENSION: &str = "json";

// Fields are declared in alphabetical order so serde emits sorted keys.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    pub clips: Vec<ClipRecord>,
    pub event: String,
    pub library: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClipRecord {
    pub metadata: ClipMetadata,
    /// Path of the archived clip.
    pub name: String,
}

impl Manifest {
    pub fn new(library: impl Into<String>, event: impl Into<String>) -> Self {
        Self {
            clips: Vec::new(),
            event: event.into(),
            library: library.into(),
        }
    }

    /// Entries end up sorted by clip path whatever order they were produced in.
    pub fn with_clips(mut self, mut clips: Vec<ClipRecord>) -> Self {
        clips.sort_by(|a, b| a.name.cmp(&b.name));
        self.clips = clips;
        self
    }

    pub fn to_pretty_json(&self) -> serde_json::Result<Vec<u8>> {
        let mut out = Vec::new();
        let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
        let mut ser = serde_json::Serializer::with_formatter(&mut out, formatter);
        self.serialize(&mut ser)?;
        out.push(b'\n');
        Ok(out)
    }
}

pub fn manifest_path(collection_dir: &Path, collection_name: &str) -> PathBuf {
    collection_dir.join(format!("{}.{}", collection_name, MANIFEST_EXTENSION))
}

/// Replaces the collection's manifest. The new content goes to a temp file in
/// the same directory first, so an interrupted write leaves the old manifest.
pub fn write_manifest(collection_dir: &Path, manifest: &Manifest) -> Result<PathBuf> {
    let path = manifest_path(collection_dir, &manifest.event);
    let manifest_err = |reason: String| ArchiveError::Manifest {
        path: path.clone(),
        reason,
    };

    let bytes = manifest
        .to_pretty_json()
        .map_err(|e| manifest_err(e.to_string()))?;

    let mut tmp = tempfile::Builder::new()
        .prefix(".manifest-")
        .suffix(".tmp")
        .tempfile_in(collection_dir)
        .map_err(|e| manifest_err(e.to_string()))?;
    tmp.write_all(&bytes)
        .and_then(|_| tmp.as_file().sync_all())
        .map_err(|e| manifest_err(e.to_string()))?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        tmp.as_file()
            .set_permissions(std::fs::Permissions::from_mode(0o644))
            .map_err(|e| manifest_err(e.to_string()))?;
    }
    tmp.persist(&path)
        .map_err(|e| manifest_err(e.error.to_string()))?;
    Ok(path)
}
