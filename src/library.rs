use std::collections::BTreeSet;
use std::ffi::OsString;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use crate::config::{self, LIBRARY_BUNDLE_SUFFIX, MEDIA_DIR_NAME, RESERVED_SUFFIXES};
use crate::error::{ArchiveError, Result};
use crate::util;

/// Raw clip file names, ordered so set differences and logs are reproducible.
/// Names stay `OsString` so non-UTF-8 clips still join back to real paths.
pub type ClipSet = BTreeSet<OsString>;

/// The source library. Never written to.
#[derive(Debug, Clone)]
pub struct Library {
    pub root: PathBuf,
    pub display_name: String,
}

/// One event directory inside the library.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Collection {
    pub name: String,
    pub path: PathBuf,
}

impl Library {
    pub fn open(root: &Path) -> Result<Self> {
        if !root.is_dir() {
            return Err(ArchiveError::LibraryNotFound {
                path: root.to_path_buf(),
            });
        }
        Ok(Self {
            root: root.to_path_buf(),
            display_name: display_name(root),
        })
    }

    /// Event directories of the library, sorted by name, bundle internals excluded.
    pub fn collections(&self) -> Result<Vec<Collection>> {
        let unreadable = |source| ArchiveError::LibraryUnreadable {
            path: self.root.clone(),
            source,
        };

        let mut out = vec![];
        for entry in std::fs::read_dir(&self.root).map_err(unreadable)? {
            let entry = entry.map_err(unreadable)?;
            let name = entry.file_name().to_string_lossy().to_string();
            if is_excluded(&name) {
                continue;
            }
            let path = entry.path();
            if !path.is_dir() {
                continue;
            }
            out.push(Collection { name, path });
        }
        out.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(out)
    }
}

impl Collection {
    pub fn media_dir(&self) -> PathBuf {
        self.path.join(MEDIA_DIR_NAME)
    }

    pub fn has_media(&self) -> bool {
        self.media_dir().is_dir()
    }
}

/// Library name without the bundle suffix: `Family.fcpbundle` -> `Family`.
pub fn display_name(root: &Path) -> String {
    let base = util::folder_basename(root);
    match base.strip_suffix(LIBRARY_BUNDLE_SUFFIX) {
        Some(stripped) if !stripped.is_empty() => stripped.to_string(),
        _ => base,
    }
}

pub fn is_excluded(name: &str) -> bool {
    name.starts_with('.')
        || name.starts_with('_')
        || RESERVED_SUFFIXES.iter().any(|suffix| name.ends_with(suffix))
}

/// Clip file names directly under `dir`. A missing directory is an empty set.
pub fn clip_set(dir: &Path) -> Result<ClipSet> {
    let scan_err = |source| ArchiveError::CollectionScan {
        path: dir.to_path_buf(),
        source,
    };

    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(ClipSet::new()),
        Err(e) => return Err(scan_err(e)),
    };

    let mut clips = ClipSet::new();
    for entry in entries {
        let entry = entry.map_err(scan_err)?;
        if !entry.path().is_file() {
            continue;
        }
        let name = entry.file_name();
        if config::is_clip_name(&name) {
            clips.insert(name);
        }
    }
    Ok(clips)
}
