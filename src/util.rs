use anyhow::{bail, Context, Result};
use std::path::Path;
use std::process::{Command, Stdio};

/// Runs `<program> <version_arg>` and checks it exits cleanly.
pub fn ensure_tool_available(program: &Path, version_arg: &str) -> Result<()> {
    let out = Command::new(program)
        .arg(version_arg)
        .stdin(Stdio::null())
        .output()
        .with_context(|| format!("failed to run {} {}", program.display(), version_arg))?;
    if !out.status.success() {
        bail!(
            "{} exists but returned non-zero on {}",
            program.display(),
            version_arg
        );
    }
    Ok(())
}

pub fn folder_basename(p: &Path) -> String {
    p.file_name()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "root".to_string())
}
