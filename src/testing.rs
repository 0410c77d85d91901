//! In-process stand-ins for the external tools, shared by unit tests.

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use crate::error::{ArchiveError, Result};
use crate::tools::{self, MediaTools, RenderRequest};
use crate::workers::CancelFlag;

#[derive(Default)]
pub struct FakeTools {
    probe_failures: HashSet<String>,
    render_failures: HashSet<String>,
    copy_failures: HashSet<String>,
    aspects: HashMap<String, String>,
    rendered: Mutex<HashMap<String, String>>,
    probes: AtomicUsize,
    copies: AtomicUsize,
    cancel_after_probes: Option<(usize, CancelFlag)>,
}

impl FakeTools {
    pub fn failing_probe(mut self, clip: &str) -> Self {
        self.probe_failures.insert(clip.to_string());
        self
    }

    pub fn failing_render(mut self, clip: &str) -> Self {
        self.render_failures.insert(clip.to_string());
        self
    }

    pub fn failing_copy(mut self, clip: &str) -> Self {
        self.copy_failures.insert(clip.to_string());
        self
    }

    pub fn with_aspect(mut self, clip: &str, aspect: &str) -> Self {
        self.aspects.insert(clip.to_string(), aspect.to_string());
        self
    }

    /// Raises `cancel` once `n` probes have run.
    pub fn cancel_after_probes(mut self, n: usize, cancel: CancelFlag) -> Self {
        self.cancel_after_probes = Some((n, cancel));
        self
    }

    /// Clip file name -> preset token of every successful render.
    pub fn rendered_presets(&self) -> HashMap<String, String> {
        self.rendered.lock().unwrap().clone()
    }

    pub fn probe_count(&self) -> usize {
        self.probes.load(Ordering::SeqCst)
    }

    pub fn copy_count(&self) -> usize {
        self.copies.load(Ordering::SeqCst)
    }
}

fn file_name(p: &Path) -> String {
    p.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default()
}

impl MediaTools for FakeTools {
    fn probe(&self, clip: &Path) -> Result<String> {
        let seen = self.probes.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some((n, cancel)) = &self.cancel_after_probes {
            if seen >= *n {
                cancel.cancel();
            }
        }

        let name = file_name(clip);
        if self.probe_failures.contains(&name) {
            return Err(ArchiveError::Probe {
                clip: clip.to_path_buf(),
                diagnostics: "exit status: 1: Unable to open file".to_string(),
            });
        }
        let aspect = self.aspects.get(&name).map(String::as_str).unwrap_or("16:9");
        Ok(format!(
            "General\nComplete name : {}\nFormat : MPEG-4\n\nVideo\nDisplay aspect ratio : {}\n",
            clip.display(),
            aspect
        ))
    }

    fn render(&self, request: &RenderRequest) -> Result<()> {
        let name = file_name(&request.clip);
        if self.render_failures.contains(&name) {
            return Err(ArchiveError::Render {
                clip: request.clip.clone(),
                diagnostics: "exit status: 1: Invalid data found".to_string(),
            });
        }
        let first_frame = request
            .output_pattern
            .to_string_lossy()
            .replace("%02d", "01");
        std::fs::write(&first_frame, b"jpeg").map_err(|e| ArchiveError::Render {
            clip: request.clip.clone(),
            diagnostics: e.to_string(),
        })?;
        self.rendered
            .lock()
            .unwrap()
            .insert(name, request.preset.token().to_string());
        Ok(())
    }

    fn copy_clip(&self, from: &Path, to: &Path) -> Result<u64> {
        self.copies.fetch_add(1, Ordering::SeqCst);
        if self.copy_failures.contains(&file_name(from)) {
            return Err(ArchiveError::ClipCopy {
                from: from.to_path_buf(),
                to: to.to_path_buf(),
                reason: "No space left on device".to_string(),
            });
        }
        tools::copy_new_file(from, to).map_err(|e| ArchiveError::ClipCopy {
            from: from.to_path_buf(),
            to: to.to_path_buf(),
            reason: e.to_string(),
        })
    }
}
