//! The engine's only contact with the outside world: metadata probe,
//! thumbnail renderer, and clip copy. [`ExternalTools`] shells out to
//! `mediainfo` and `ffmpeg`; tests substitute fakes.

use filetime::FileTime;
use std::ffi::OsString;
use std::fs::{File, OpenOptions};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::process::{Command, Output, Stdio};

use crate::config::{ThumbnailSettings, ToolConfig};
use crate::error::{ArchiveError, Result};
use crate::metadata::ThumbnailPreset;

const DIAGNOSTIC_LINES: usize = 20;

#[derive(Debug, Clone)]
pub struct RenderRequest {
    pub clip: PathBuf,
    pub frame_rate: String,
    pub duration: String,
    pub preset: ThumbnailPreset,
    /// printf-style pattern with a two-digit frame index, e.g. `thumbs/a-%02d.jpg`.
    pub output_pattern: PathBuf,
}

impl RenderRequest {
    pub fn new(
        clip: &Path,
        thumbs_dir: &Path,
        preset: ThumbnailPreset,
        settings: &ThumbnailSettings,
    ) -> Self {
        let mut frame_name = clip
            .file_stem()
            .map(|s| s.to_os_string())
            .unwrap_or_else(|| OsString::from("clip"));
        frame_name.push(format!("-%02d.{}", settings.image_extension));
        Self {
            clip: clip.to_path_buf(),
            frame_rate: settings.frame_rate.clone(),
            duration: settings.duration.clone(),
            preset,
            output_pattern: thumbs_dir.join(frame_name),
        }
    }
}

pub trait MediaTools: Send + Sync {
    /// Raw `key: value` text describing the clip.
    fn probe(&self, clip: &Path) -> Result<String>;

    fn render(&self, request: &RenderRequest) -> Result<()>;

    /// Copies `from` to a destination that must not exist yet. Returns bytes copied.
    fn copy_clip(&self, from: &Path, to: &Path) -> Result<u64>;
}

#[derive(Debug, Clone, Default)]
pub struct ExternalTools {
    config: ToolConfig,
}

impl ExternalTools {
    pub fn new(config: ToolConfig) -> Self {
        Self { config }
    }

    /// Paths are passed through untouched so non-UTF-8 clip names survive.
    pub fn renderer_args(request: &RenderRequest) -> Vec<OsString> {
        let mut args = ["-hide_banner", "-loglevel", "error", "-n", "-i"]
            .iter()
            .map(OsString::from)
            .collect::<Vec<_>>();
        args.push(request.clip.clone().into_os_string());
        args.extend(
            [
                "-r",
                request.frame_rate.as_str(),
                "-t",
                request.duration.as_str(),
                "-s",
                request.preset.token(),
            ]
            .iter()
            .map(OsString::from),
        );
        args.push(request.output_pattern.clone().into_os_string());
        args
    }
}

impl MediaTools for ExternalTools {
    fn probe(&self, clip: &Path) -> Result<String> {
        tracing::debug!(program = %self.config.probe_program.display(), clip = %clip.display(), "probe");
        let probe_err = |diagnostics| ArchiveError::Probe {
            clip: clip.to_path_buf(),
            diagnostics,
        };

        let out = Command::new(&self.config.probe_program)
            .arg(clip)
            .stdin(Stdio::null())
            .output()
            .map_err(|e| probe_err(format!("failed to run {:?}: {}", self.config.probe_program, e)))?;
        if !out.status.success() {
            return Err(probe_err(describe_failure(&out)));
        }
        Ok(String::from_utf8_lossy(&out.stdout).into_owned())
    }

    fn render(&self, request: &RenderRequest) -> Result<()> {
        let args = Self::renderer_args(request);
        tracing::debug!(program = %self.config.renderer_program.display(), args = ?args, "render");
        let render_err = |diagnostics| ArchiveError::Render {
            clip: request.clip.clone(),
            diagnostics,
        };

        let out = Command::new(&self.config.renderer_program)
            .args(&args)
            .stdin(Stdio::null())
            .output()
            .map_err(|e| {
                render_err(format!("failed to run {:?}: {}", self.config.renderer_program, e))
            })?;
        if !out.status.success() {
            return Err(render_err(describe_failure(&out)));
        }
        Ok(())
    }

    fn copy_clip(&self, from: &Path, to: &Path) -> Result<u64> {
        copy_new_file(from, to).map_err(|e| ArchiveError::ClipCopy {
            from: from.to_path_buf(),
            to: to.to_path_buf(),
            reason: e.to_string(),
        })
    }
}

/// Copies into a freshly created file and carries over the source mtime.
/// An existing destination is an error, and a partial destination is removed.
pub fn copy_new_file(from: &Path, to: &Path) -> std::io::Result<u64> {
    let src = File::open(from)?;
    let src_meta = src.metadata()?;
    let dst = OpenOptions::new().write(true).create_new(true).open(to)?;

    let copied = (|| -> std::io::Result<u64> {
        let mut reader = BufReader::with_capacity(8 * 1024 * 1024, src);
        let mut writer = BufWriter::with_capacity(8 * 1024 * 1024, dst);
        let n = std::io::copy(&mut reader, &mut writer)?;
        writer.flush()?;
        Ok(n)
    })();

    match copied {
        Ok(n) => {
            let mtime = FileTime::from_last_modification_time(&src_meta);
            if let Err(e) = filetime::set_file_mtime(to, mtime) {
                tracing::warn!(path = %to.display(), error = %e, "could not preserve modification time");
            }
            Ok(n)
        }
        Err(e) => {
            let _ = std::fs::remove_file(to);
            Err(e)
        }
    }
}

/// Exit status plus the tail of stderr, which is where both tools explain themselves.
fn describe_failure(out: &Output) -> String {
    let stderr = String::from_utf8_lossy(&out.stderr);
    let lines = stderr
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect::<Vec<_>>();
    let tail = &lines[lines.len().saturating_sub(DIAGNOSTIC_LINES)..];
    if tail.is_empty() {
        out.status.to_string()
    } else {
        format!("{}: {}", out.status, tail.join(" | "))
    }
}
