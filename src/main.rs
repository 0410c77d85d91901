mod config;
mod engine;
mod error;
mod generate;
mod layout;
mod library;
mod manifest;
mod metadata;
mod plan;
mod progress;
#[cfg(test)]
mod testing;
mod tools;
mod util;
mod workers;

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::HumanBytes;
use std::path::PathBuf;
use tracing::{subscriber::set_global_default, Level};
use tracing_subscriber::EnvFilter;

use config::{ArchiveConfig, MatchPolicy, ToolConfig};
use engine::ArchiveEngine;
use progress::{format_duration, CollectionStatus, CollectionSummary, ProgressConfig, ProgressMode, RunSummary};
use tools::ExternalTools;

#[derive(Parser)]
#[command(
    name = "archive",
    version,
    about = "Additively archive the clips of a video library and rebuild thumbnails and event databases"
)]
struct Cli {
    /// Library bundle whose events are archived.
    library: PathBuf,

    /// Archive base directory; the library name is appended beneath it.
    #[arg(short = 'a', long = "archiveDir", alias = "archive-dir", default_value = config::DEFAULT_ARCHIVE_DIR)]
    archive_dir: PathBuf,

    /// Dry run: report what would be copied without copying clips.
    #[arg(short = 't', long = "test", default_value_t = false)]
    test: bool,

    /// Optional override of concurrent copy/probe/render workers. Default: auto.
    #[arg(long)]
    workers: Option<usize>,

    /// How a clip is recognized as already archived: name (default) or content.
    #[arg(long = "match", value_enum, default_value_t = MatchPolicy::Name)]
    match_policy: MatchPolicy,

    /// Metadata probe program.
    #[arg(long, default_value = config::DEFAULT_PROBE_PROGRAM)]
    probe_program: PathBuf,

    /// Thumbnail renderer program.
    #[arg(long, default_value = config::DEFAULT_RENDERER_PROGRAM)]
    renderer_program: PathBuf,

    /// Progress display mode: auto (TTY-aware), rich, plain, quiet.
    #[arg(long, value_enum, default_value_t = ProgressMode::Auto)]
    progress: ProgressMode,

    /// Increase log verbosity (-v, -vv). Default INFO.
    #[arg(short = 'v', action = clap::ArgAction::Count)]
    verbose: u8,

    /// Decrease log verbosity (-q, -qq).
    #[arg(short = 'q', action = clap::ArgAction::Count)]
    quiet: u8,
}

fn init_tracing(verbose: u8, quiet: u8) {
    let level = match (1 + i16::from(verbose) - i16::from(quiet)).max(-1) {
        -1 => None,
        0 => Some(Level::WARN),
        1 => Some(Level::INFO),
        2 => Some(Level::DEBUG),
        _ => Some(Level::TRACE),
    };

    let env_filter = match level {
        Some(level) => EnvFilter::from_default_env().add_directive(level.into()),
        None => EnvFilter::new("error"),
    };

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_level(true)
        .compact()
        .finish();

    let _ = set_global_default(subscriber);
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.quiet);

    let tool_config = ToolConfig {
        probe_program: cli.probe_program,
        renderer_program: cli.renderer_program,
    };
    for (program, version_arg) in [
        (&tool_config.probe_program, "--Version"),
        (&tool_config.renderer_program, "-version"),
    ] {
        if let Err(err) = util::ensure_tool_available(program, version_arg) {
            tracing::warn!("{:#}; affected clips will be reported as failed", err);
        }
    }

    let config = ArchiveConfig {
        archive_dir: Some(cli.archive_dir),
        dry_run: cli.test,
        match_policy: cli.match_policy,
        tools: tool_config.clone(),
        progress: ProgressConfig::new(cli.progress),
        ..ArchiveConfig::new(cli.library)
    }
    .with_workers(cli.workers);

    let library_path = config.library_path.clone();
    let engine = ArchiveEngine::new(config, ExternalTools::new(tool_config));
    let summary = engine
        .run()
        .with_context(|| format!("archive of {} aborted", library_path.display()))?;

    print_run_summary(&summary);
    Ok(())
}

fn print_run_summary(summary: &RunSummary) {
    println!(
        "Run summary: library={} archive={} dry_run={} duration={} events={} synced={} skipped={} failed={} cancelled={} planned={} copied={} bytes={} already_archived={} diverged={} copy_failed={} entries={} probe_failed={} render_failed={} warnings={}",
        summary.library,
        summary.archive_root.display(),
        summary.dry_run,
        format_duration(summary.elapsed),
        summary.collections.len(),
        summary.count_status("synced"),
        summary.count_status("skipped"),
        summary.count_status("failed"),
        summary.count_status("cancelled"),
        summary.planned(),
        summary.copied(),
        HumanBytes(summary.bytes_copied()),
        summary.already_archived(),
        summary.diverged(),
        summary.copy_failed(),
        summary.manifest_entries(),
        summary.probe_failed(),
        summary.render_failed(),
        summary.warning_count,
    );
    for collection in &summary.collections {
        print_collection_summary(collection);
    }
    for warning in &summary.warnings {
        println!("  warning: {}", warning);
    }
    let hidden = summary.warning_count.saturating_sub(summary.warnings.len());
    if hidden > 0 {
        println!("  ... {} earlier warnings not shown", hidden);
    }
    if summary.has_failures() {
        tracing::warn!("some clips or events were not archived; see the run summary");
    }
}

fn print_collection_summary(summary: &CollectionSummary) {
    let detail = match &summary.status {
        CollectionStatus::Failed(reason) => format!(" reason={}", reason),
        _ => String::new(),
    };
    println!(
        "  event {}: status={} library_clips={} already_archived={} planned={} copied={} bytes={} copy_failed={} diverged={} archived={} entries={} probe_failed={} render_failed={} thumbs_cleared={} manifest={}{}",
        summary.name,
        summary.status.label(),
        summary.library_clips,
        summary.already_archived,
        summary.planned,
        summary.copied,
        HumanBytes(summary.bytes_copied),
        summary.copy_failed,
        summary.diverged,
        summary.archived_clips,
        summary.manifest_entries,
        summary.probe_failed,
        summary.render_failed,
        summary.thumbnails_cleared,
        summary
            .manifest_path
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "-".to_string()),
        detail,
    );
}
