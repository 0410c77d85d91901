//! Error types for the archive engine.
//!
//! Variants fall into three recovery scopes: the whole run (`LibraryNotFound`,
//! `LibraryUnreadable`, `ArchiveRoot`), a single collection (`CollectionDir`,
//! `CollectionScan`, `Manifest`), or a single clip (`ClipCopy`, `Probe`,
//! `Render`). [`ArchiveError::is_fatal`] tells the engine which is which.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("Cannot open library {path:?}")]
    LibraryNotFound { path: PathBuf },

    #[error("Cannot list library {path:?}: {source}")]
    LibraryUnreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Cannot create archive root {path:?}: {source}")]
    ArchiveRoot {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Cannot create archive collection {path:?}: {source}")]
    CollectionDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Cannot list clips in {path:?}: {source}")]
    CollectionScan {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Copy {from:?} -> {to:?} failed: {reason}")]
    ClipCopy {
        from: PathBuf,
        to: PathBuf,
        reason: String,
    },

    #[error("Metadata probe failed for {clip:?}: {diagnostics}")]
    Probe { clip: PathBuf, diagnostics: String },

    #[error("Thumbnail render failed for {clip:?}: {diagnostics}")]
    Render { clip: PathBuf, diagnostics: String },

    #[error("Cannot prepare thumbnail directory {path:?}: {source}")]
    Thumbnails {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Cannot write manifest {path:?}: {reason}")]
    Manifest { path: PathBuf, reason: String },

    #[error("Run cancelled")]
    Cancelled,
}

impl ArchiveError {
    /// Errors that abort the whole run instead of a collection or a clip.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            ArchiveError::LibraryNotFound { .. }
                | ArchiveError::LibraryUnreadable { .. }
                | ArchiveError::ArchiveRoot { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, ArchiveError>;
