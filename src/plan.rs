use crc32fast::Hasher;
use std::ffi::OsString;
use std::fs::File;
use std::io::Read;
use std::path::Path;

use crate::config::MatchPolicy;
use crate::library::ClipSet;

/// What one collection needs copied. Both lists are sorted by name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CopyPlan {
    pub to_copy: Vec<OsString>,
    /// Names present on both sides.
    pub already_archived: Vec<OsString>,
    /// Names on both sides whose content differs. Only filled under
    /// [`MatchPolicy::Content`]; these are reported, never overwritten.
    pub diverged: Vec<OsString>,
}

impl CopyPlan {
    pub fn is_empty(&self) -> bool {
        self.to_copy.is_empty()
    }
}

/// `library - archive` by name. Nothing is ever scheduled for deletion or
/// overwrite; a name already in the archive is treated as synced.
pub fn plan(library: &ClipSet, archive: &ClipSet) -> CopyPlan {
    let mut out = CopyPlan::default();
    for name in library {
        if archive.contains(name) {
            out.already_archived.push(name.clone());
        } else {
            out.to_copy.push(name.clone());
        }
    }
    out
}

/// Applies `policy` on top of [`plan`]. The copy list is identical for every
/// policy; stricter policies only add `diverged` entries.
pub fn plan_with_policy(
    library: &ClipSet,
    archive: &ClipSet,
    policy: MatchPolicy,
    source_dir: &Path,
    archive_dir: &Path,
) -> CopyPlan {
    let mut out = plan(library, archive);
    if policy == MatchPolicy::Content {
        out.diverged = out
            .already_archived
            .iter()
            .filter(|name| !same_content(&source_dir.join(name), &archive_dir.join(name)))
            .cloned()
            .collect();
    }
    out
}

/// Unreadable files count as differing so they surface in the summary.
fn same_content(a: &Path, b: &Path) -> bool {
    let (Ok(la), Ok(lb)) = (std::fs::metadata(a), std::fs::metadata(b)) else {
        return false;
    };
    if la.len() != lb.len() {
        return false;
    }
    match (file_crc32(a), file_crc32(b)) {
        (Ok(ca), Ok(cb)) => ca == cb,
        _ => false,
    }
}

pub fn file_crc32(path: &Path) -> std::io::Result<u32> {
    let mut f = File::open(path)?;
    let mut h = Hasher::new();
    let mut buf = vec![0u8; 1024 * 1024];
    loop {
        let n = f.read(&mut buf)?;
        if n == 0 {
            break;
        }
        h.update(&buf[..n]);
    }
    Ok(h.finalize())
}
