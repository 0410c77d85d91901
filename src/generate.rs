use std::path::{Path, PathBuf};

use crate::config::ThumbnailSettings;
use crate::error::{ArchiveError, Result};
use crate::layout;
use crate::library;
use crate::manifest::{ClipRecord, Manifest};
use crate::metadata::{self, ThumbnailPreset};
use crate::progress::ProgressHandle;
use crate::tools::{MediaTools, RenderRequest};
use crate::workers::{self, CancelFlag};

/// Inputs for regenerating one archived collection.
#[derive(Debug, Clone)]
pub struct GenerateJob<'a> {
    pub library_name: &'a str,
    pub collection_name: &'a str,
    pub collection_dir: &'a Path,
    pub thumbnails: &'a ThumbnailSettings,
    pub workers: usize,
}

#[derive(Debug)]
pub struct GenerateReport {
    pub manifest: Manifest,
    pub clips_seen: usize,
    pub probe_failed: usize,
    pub render_failed: usize,
    /// Set when the cancel flag stopped work before every clip was visited.
    pub cancelled: bool,
}

#[derive(Debug)]
struct ClipOutcome {
    clip: PathBuf,
    record: Option<ClipRecord>,
    preset: Option<ThumbnailPreset>,
    probe_error: Option<ArchiveError>,
    render_error: Option<ArchiveError>,
}

/// Probes and renders every clip currently in the archived collection, not
/// only the ones copied this run, so the manifest always covers the whole set.
pub fn generate<T: MediaTools + ?Sized>(
    tools: &T,
    job: &GenerateJob<'_>,
    cancel: &CancelFlag,
    progress: &ProgressHandle,
) -> Result<GenerateReport> {
    tracing::info!(collection = job.collection_name, "creating event info");

    let clips = library::clip_set(job.collection_dir)?
        .into_iter()
        .map(|name| job.collection_dir.join(name))
        .collect::<Vec<_>>();
    progress.add_total(clips.len() as u64);

    let thumbs_dir = layout::thumbs_dir(job.collection_dir);
    let results = workers::fan_out(&clips, job.workers, cancel, |_, clip| {
        let name = display_name(clip);
        let op_id = format!("gen:{}/{}", job.collection_name, name);
        progress.set_operation_status(op_id.clone(), format!("probe+thumbs {}", name));
        let outcome = process_clip(tools, clip, &thumbs_dir, job.thumbnails);
        progress.clear_operation(&op_id);
        progress.inc(1);
        outcome
    });

    let mut report = GenerateReport {
        manifest: Manifest::new(job.library_name, job.collection_name),
        clips_seen: 0,
        probe_failed: 0,
        render_failed: 0,
        cancelled: false,
    };
    let mut records = Vec::with_capacity(clips.len());

    for slot in results {
        let Some(outcome) = slot else {
            report.cancelled = true;
            continue;
        };
        report.clips_seen += 1;

        if let Some(err) = outcome.probe_error {
            report.probe_failed += 1;
            progress.warning(err.to_string());
            continue;
        }
        if let Some(err) = outcome.render_error {
            report.render_failed += 1;
            progress.warning(err.to_string());
        } else if let Some(preset) = outcome.preset {
            tracing::info!(
                clip = %outcome.clip.display(),
                preset = preset.token(),
                "created thumbnails"
            );
        }
        records.extend(outcome.record);
    }

    report.manifest = report.manifest.with_clips(records);
    Ok(report)
}

fn process_clip<T: MediaTools + ?Sized>(
    tools: &T,
    clip: &Path,
    thumbs_dir: &Path,
    settings: &ThumbnailSettings,
) -> ClipOutcome {
    let mut outcome = ClipOutcome {
        clip: clip.to_path_buf(),
        record: None,
        preset: None,
        probe_error: None,
        render_error: None,
    };

    let md = match tools.probe(clip) {
        Ok(text) => metadata::parse_probe_output(&text),
        Err(err) => {
            outcome.probe_error = Some(err);
            return outcome;
        }
    };

    let preset = ThumbnailPreset::for_metadata(&md);
    let request = RenderRequest::new(clip, thumbs_dir, preset, settings);
    outcome.render_error = tools.render(&request).err();
    outcome.preset = Some(preset);
    outcome.record = Some(ClipRecord {
        metadata: md,
        name: clip.to_string_lossy().to_string(),
    });
    outcome
}

fn display_name(clip: &Path) -> String {
    clip.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default()
}
