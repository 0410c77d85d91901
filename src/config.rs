use clap::ValueEnum;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};

use crate::progress::ProgressConfig;

/// Clip types the archiver recognizes, matched case-insensitively.
pub const CLIP_EXTENSIONS: [&str; 5] = ["mov", "m4v", "avi", "wmv", "mp4"];

/// Subdirectory of each library event that holds the source clips.
pub const MEDIA_DIR_NAME: &str = "Original Media";

/// Subdirectory of each archived event that holds generated thumbnails.
pub const THUMBS_DIR_NAME: &str = "thumbs";

/// Suffix stripped from the library directory name to form its display name.
pub const LIBRARY_BUNDLE_SUFFIX: &str = ".fcpbundle";

/// Suffixes of library entries that are bundle internals rather than events.
pub const RESERVED_SUFFIXES: [&str; 2] = [".flexolibrary", ".plist"];

pub const DEFAULT_ARCHIVE_DIR: &str = "archive";
pub const DEFAULT_PROBE_PROGRAM: &str = "mediainfo";
pub const DEFAULT_RENDERER_PROGRAM: &str = "ffmpeg";

/// How a library clip is recognized as already present in the archive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
#[value(rename_all = "lower")]
pub enum MatchPolicy {
    /// Same file name means archived; content is never inspected.
    #[default]
    Name,
    /// Same file name and same CRC-32; mismatches are reported, never overwritten.
    Content,
}

#[derive(Debug, Clone)]
pub struct ToolConfig {
    pub probe_program: PathBuf,
    pub renderer_program: PathBuf,
}

impl Default for ToolConfig {
    fn default() -> Self {
        Self {
            probe_program: PathBuf::from(DEFAULT_PROBE_PROGRAM),
            renderer_program: PathBuf::from(DEFAULT_RENDERER_PROGRAM),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ThumbnailSettings {
    /// Frames per second sampled from the clip.
    pub frame_rate: String,
    /// Seconds of the clip to sample.
    pub duration: String,
    /// Image extension of rendered frames; also the pattern cleared before a run.
    pub image_extension: String,
}

impl Default for ThumbnailSettings {
    fn default() -> Self {
        Self {
            frame_rate: "1".to_string(),
            duration: "0.03".to_string(),
            image_extension: "jpg".to_string(),
        }
    }
}

/// Everything one archive run needs. Built once by the CLI and handed to the engine.
#[derive(Debug, Clone)]
pub struct ArchiveConfig {
    pub library_path: PathBuf,
    /// Base directory; the library's display name is appended beneath it.
    pub archive_dir: Option<PathBuf>,
    pub dry_run: bool,
    pub workers: usize,
    pub match_policy: MatchPolicy,
    pub tools: ToolConfig,
    pub thumbnails: ThumbnailSettings,
    pub progress: ProgressConfig,
}

impl ArchiveConfig {
    pub fn new(library_path: impl Into<PathBuf>) -> Self {
        Self {
            library_path: library_path.into(),
            archive_dir: None,
            dry_run: false,
            workers: default_workers(),
            match_policy: MatchPolicy::Name,
            tools: ToolConfig::default(),
            thumbnails: ThumbnailSettings::default(),
            progress: ProgressConfig::default(),
        }
    }

    /// Resolved against the working directory once, so manifest clip paths are
    /// absolute and do not depend on where later tools read them from.
    pub fn archive_base(&self) -> PathBuf {
        let base = self
            .archive_dir
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_ARCHIVE_DIR));
        std::path::absolute(&base).unwrap_or(base)
    }

    pub fn with_workers(mut self, workers: Option<usize>) -> Self {
        if let Some(w) = workers {
            self.workers = w.max(1);
        }
        self
    }
}

/// External tools spend most of their time in their own process, so a few
/// workers per core is plenty; cap it so slow archive disks are not thrashed.
pub fn default_workers() -> usize {
    num_cpus::get().clamp(1, 8)
}

pub fn is_clip_name(name: impl AsRef<OsStr>) -> bool {
    Path::new(name.as_ref())
        .extension()
        .map(|ext| {
            let ext = ext.to_string_lossy().to_ascii_lowercase();
            CLIP_EXTENSIONS.contains(&ext.as_str())
        })
        .unwrap_or(false)
}
