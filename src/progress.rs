use clap::ValueEnum;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use std::collections::HashMap;
use std::io::IsTerminal;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

const MAX_STORED_WARNINGS: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
#[value(rename_all = "lower")]
pub enum ProgressMode {
    Auto,
    Rich,
    Plain,
    Quiet,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolvedProgressMode {
    Rich,
    Plain,
    Quiet,
}

#[derive(Debug, Clone, Copy)]
pub struct ProgressConfig {
    pub mode: ProgressMode,
    pub idle_threshold: Duration,
    pub plain_interval: Duration,
    tty_override: Option<bool>,
}

impl Default for ProgressConfig {
    fn default() -> Self {
        Self {
            mode: ProgressMode::Auto,
            idle_threshold: Duration::from_secs(60),
            plain_interval: Duration::from_secs(2),
            tty_override: None,
        }
    }
}

impl ProgressConfig {
    pub fn new(mode: ProgressMode) -> Self {
        Self {
            mode,
            ..Self::default()
        }
    }

    #[cfg(test)]
    pub fn with_tty_override(mut self, is_tty: bool) -> Self {
        self.tty_override = Some(is_tty);
        self
    }

    pub fn resolve_mode(self) -> ResolvedProgressMode {
        self.mode.resolve(
            self.tty_override
                .unwrap_or_else(|| std::io::stderr().is_terminal()),
        )
    }
}

impl ProgressMode {
    fn resolve(self, stderr_is_tty: bool) -> ResolvedProgressMode {
        match self {
            ProgressMode::Auto => {
                if stderr_is_tty {
                    ResolvedProgressMode::Rich
                } else {
                    ResolvedProgressMode::Plain
                }
            }
            ProgressMode::Rich => ResolvedProgressMode::Rich,
            ProgressMode::Plain => ResolvedProgressMode::Plain,
            ProgressMode::Quiet => ResolvedProgressMode::Quiet,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CollectionStatus {
    Synced,
    /// No `Original Media` directory in the library event.
    SkippedNoMedia,
    Failed(String),
    Cancelled,
}

impl CollectionStatus {
    pub fn label(&self) -> &'static str {
        match self {
            CollectionStatus::Synced => "synced",
            CollectionStatus::SkippedNoMedia => "skipped",
            CollectionStatus::Failed(_) => "failed",
            CollectionStatus::Cancelled => "cancelled",
        }
    }
}

#[derive(Debug, Clone)]
pub struct CollectionSummary {
    pub name: String,
    pub status: CollectionStatus,
    pub library_clips: usize,
    pub already_archived: usize,
    /// Clips missing from the archive when the event was planned.
    pub planned: usize,
    pub copied: usize,
    pub copy_failed: usize,
    pub diverged: usize,
    pub bytes_copied: u64,
    pub archived_clips: usize,
    pub manifest_entries: usize,
    pub probe_failed: usize,
    pub render_failed: usize,
    pub thumbnails_cleared: usize,
    pub manifest_path: Option<PathBuf>,
}

impl CollectionSummary {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status: CollectionStatus::Synced,
            library_clips: 0,
            already_archived: 0,
            planned: 0,
            copied: 0,
            copy_failed: 0,
            diverged: 0,
            bytes_copied: 0,
            archived_clips: 0,
            manifest_entries: 0,
            probe_failed: 0,
            render_failed: 0,
            thumbnails_cleared: 0,
            manifest_path: None,
        }
    }

    pub fn with_status(mut self, status: CollectionStatus) -> Self {
        self.status = status;
        self
    }
}

#[derive(Debug, Clone)]
pub struct RunSummary {
    pub library: String,
    pub archive_root: PathBuf,
    pub dry_run: bool,
    pub collections: Vec<CollectionSummary>,
    pub elapsed: Duration,
    pub warning_count: usize,
    pub warnings: Vec<String>,
    pub cancelled: bool,
}

impl RunSummary {
    fn total(&self, f: impl Fn(&CollectionSummary) -> usize) -> usize {
        self.collections.iter().map(f).sum()
    }

    pub fn planned(&self) -> usize {
        self.total(|c| c.planned)
    }

    pub fn copied(&self) -> usize {
        self.total(|c| c.copied)
    }

    pub fn bytes_copied(&self) -> u64 {
        self.collections.iter().map(|c| c.bytes_copied).sum()
    }

    pub fn already_archived(&self) -> usize {
        self.total(|c| c.already_archived)
    }

    pub fn copy_failed(&self) -> usize {
        self.total(|c| c.copy_failed)
    }

    pub fn diverged(&self) -> usize {
        self.total(|c| c.diverged)
    }

    pub fn manifest_entries(&self) -> usize {
        self.total(|c| c.manifest_entries)
    }

    pub fn probe_failed(&self) -> usize {
        self.total(|c| c.probe_failed)
    }

    pub fn render_failed(&self) -> usize {
        self.total(|c| c.render_failed)
    }

    pub fn count_status(&self, label: &str) -> usize {
        self.collections
            .iter()
            .filter(|c| c.status.label() == label)
            .count()
    }

    #[cfg(test)]
    pub fn collection(&self, name: &str) -> Option<&CollectionSummary> {
        self.collections.iter().find(|c| c.name == name)
    }

    pub fn has_failures(&self) -> bool {
        self.copy_failed() > 0
            || self.probe_failed() > 0
            || self.render_failed() > 0
            || self.count_status("failed") > 0
    }
}

#[derive(Debug, Clone)]
pub struct ProgressOutcome {
    pub elapsed: Duration,
    pub total_units: u64,
    pub processed_units: u64,
    pub warning_count: usize,
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct ProgressSnapshot {
    pub label: String,
    pub stage: String,
    pub processed_units: u64,
    pub total_units: u64,
    pub elapsed: Duration,
    pub active_ops: Vec<String>,
}

#[derive(Clone)]
pub struct ProgressHandle {
    inner: Arc<ProgressInner>,
}

pub struct ProgressReporter {
    handle: ProgressHandle,
    ticker: Option<JoinHandle<()>>,
}

struct ProgressInner {
    label: String,
    mode: ResolvedProgressMode,
    idle_threshold: Duration,
    plain_interval: Duration,
    state: Mutex<ProgressState>,
    rich: Option<RichUi>,
    stop: AtomicBool,
    finalized: AtomicBool,
}

struct RichUi {
    multi: MultiProgress,
    overall: ProgressBar,
    stage: ProgressBar,
    ops: Mutex<HashMap<String, ProgressBar>>,
}

#[derive(Debug)]
struct ProgressState {
    started: Instant,
    stage: String,
    total_units: u64,
    processed_units: u64,
    last_progress: Instant,
    last_plain_emit: Instant,
    last_idle_warn: Option<Instant>,
    operations: HashMap<String, String>,
    /// Most recent warnings only; `warning_count` counts every one.
    warnings: Vec<String>,
    warning_count: usize,
}

impl ProgressReporter {
    pub fn new(label: impl Into<String>, config: ProgressConfig) -> Self {
        let label = label.into();
        let mode = config.resolve_mode();
        let now = Instant::now();

        let rich = if mode == ResolvedProgressMode::Rich {
            Some(RichUi::new(&label))
        } else {
            None
        };

        let inner = Arc::new(ProgressInner {
            label,
            mode,
            idle_threshold: config.idle_threshold,
            plain_interval: config.plain_interval,
            state: Mutex::new(ProgressState {
                started: now,
                stage: "initializing".to_string(),
                total_units: 0,
                processed_units: 0,
                last_progress: now,
                last_plain_emit: now.checked_sub(config.plain_interval).unwrap_or(now),
                last_idle_warn: None,
                operations: HashMap::new(),
                warnings: Vec::new(),
                warning_count: 0,
            }),
            rich,
            stop: AtomicBool::new(false),
            finalized: AtomicBool::new(false),
        });

        let ticker_inner = Arc::clone(&inner);
        let ticker = thread::spawn(move || {
            while !ticker_inner.stop.load(Ordering::Relaxed) {
                thread::sleep(Duration::from_millis(250));
                ticker_inner.tick_once();
            }
        });

        let handle = ProgressHandle { inner };
        handle.set_stage("starting");
        Self {
            handle,
            ticker: Some(ticker),
        }
    }

    pub fn handle(&self) -> ProgressHandle {
        self.handle.clone()
    }

    pub fn finish(mut self, final_message: impl Into<String>) -> ProgressOutcome {
        self.shutdown_ticker();
        self.handle.inner.finalize(Some(final_message.into()))
    }

    fn shutdown_ticker(&mut self) {
        self.handle.inner.stop.store(true, Ordering::Relaxed);
        if let Some(join) = self.ticker.take() {
            let _ = join.join();
        }
    }
}

impl Drop for ProgressReporter {
    fn drop(&mut self) {
        self.shutdown_ticker();
        let _ = self.handle.inner.finalize(None);
    }
}

impl ProgressHandle {
    /// Grows the expected amount of work; collections are planned one at a time.
    pub fn add_total(&self, delta: u64) {
        let snapshot = {
            let mut state = lock(&self.inner.state);
            state.total_units = state.total_units.saturating_add(delta);
            snapshot_locked(&self.inner.label, &state)
        };
        self.inner.render_snapshot(&snapshot, false);
    }

    pub fn set_stage(&self, stage: impl Into<String>) {
        let stage = stage.into();
        let snapshot = {
            let mut state = lock(&self.inner.state);
            state.stage = stage;
            snapshot_locked(&self.inner.label, &state)
        };
        self.inner.render_snapshot(&snapshot, true);
    }

    pub fn inc(&self, delta: u64) {
        if delta == 0 {
            return;
        }
        let snapshot = {
            let mut state = lock(&self.inner.state);
            state.processed_units = state.processed_units.saturating_add(delta);
            if state.total_units > 0 {
                state.processed_units = state.processed_units.min(state.total_units);
            }
            state.last_progress = Instant::now();
            snapshot_locked(&self.inner.label, &state)
        };
        self.inner.render_snapshot(&snapshot, false);
    }

    pub fn set_operation_status(&self, operation_id: impl Into<String>, status: impl Into<String>) {
        let op_id = operation_id.into();
        let status = status.into();

        let snapshot = {
            let mut state = lock(&self.inner.state);
            state.operations.insert(op_id.clone(), status.clone());
            snapshot_locked(&self.inner.label, &state)
        };

        if let Some(rich) = &self.inner.rich {
            rich.set_operation(&op_id, &status);
        }
        self.inner.render_snapshot(&snapshot, false);
    }

    pub fn clear_operation(&self, operation_id: &str) {
        let snapshot = {
            let mut state = lock(&self.inner.state);
            state.operations.remove(operation_id);
            snapshot_locked(&self.inner.label, &state)
        };

        if let Some(rich) = &self.inner.rich {
            rich.clear_operation(operation_id);
        }
        self.inner.render_snapshot(&snapshot, false);
    }

    /// Logs a warning and keeps it for the run summary.
    pub fn warning(&self, message: impl Into<String>) {
        let message = message.into();
        push_warning_locked(&mut lock(&self.inner.state), &message);
        self.inner.emit_warning(&message);
    }
}

impl ProgressInner {
    fn tick_once(&self) {
        if self.mode == ResolvedProgressMode::Quiet {
            return;
        }

        let (snapshot, plain_due, idle_warning) = {
            let mut state = lock(&self.state);
            let now = Instant::now();

            let plain_due = now.duration_since(state.last_plain_emit) >= self.plain_interval;
            if plain_due {
                state.last_plain_emit = now;
            }

            let idle_due = idle_warning_due(
                now,
                state.last_progress,
                state.last_idle_warn,
                self.idle_threshold,
                state.processed_units,
                state.total_units,
            );
            let idle_warning = if idle_due {
                state.last_idle_warn = Some(now);
                let msg = format!(
                    "no progress for {}s (stage={}, active={})",
                    now.duration_since(state.last_progress).as_secs(),
                    state.stage,
                    active_op_display(&state.operations)
                );
                push_warning_locked(&mut state, &msg);
                Some(msg)
            } else {
                None
            };

            (snapshot_locked(&self.label, &state), plain_due, idle_warning)
        };

        if self.mode == ResolvedProgressMode::Rich {
            self.render_snapshot_rich(&snapshot);
        } else if plain_due {
            self.render_snapshot_plain(&snapshot);
        }

        if let Some(msg) = idle_warning {
            self.emit_warning(&msg);
        }
    }

    fn render_snapshot(&self, snapshot: &ProgressSnapshot, force_plain: bool) {
        match self.mode {
            ResolvedProgressMode::Rich => self.render_snapshot_rich(snapshot),
            ResolvedProgressMode::Plain => {
                if force_plain {
                    self.render_snapshot_plain(snapshot);
                }
            }
            ResolvedProgressMode::Quiet => {}
        }
    }

    fn render_snapshot_rich(&self, snapshot: &ProgressSnapshot) {
        let Some(rich) = &self.rich else {
            return;
        };

        rich.overall.set_length(snapshot.total_units.max(1));
        rich.overall
            .set_position(snapshot.processed_units.min(snapshot.total_units.max(1)));
        rich.overall.set_message(format!(
            "stage={} active={}",
            snapshot.stage,
            if snapshot.active_ops.is_empty() {
                "-".to_string()
            } else {
                snapshot.active_ops.join(",")
            }
        ));

        rich.stage.set_message(format!(
            "{} | elapsed {}",
            snapshot.stage,
            format_duration(snapshot.elapsed)
        ));
        rich.stage.tick();
    }

    fn render_snapshot_plain(&self, snapshot: &ProgressSnapshot) {
        eprintln!(
            "[PROGRESS] {} elapsed={} stage={} done={} / {} active={}",
            snapshot.label,
            format_duration(snapshot.elapsed),
            snapshot.stage,
            snapshot.processed_units,
            snapshot.total_units,
            if snapshot.active_ops.is_empty() {
                "-".to_string()
            } else {
                snapshot.active_ops.join(",")
            }
        );
    }

    fn emit_warning(&self, message: &str) {
        match &self.rich {
            Some(rich) => rich.multi.suspend(|| tracing::warn!(target: "progress", "{}", message)),
            None => tracing::warn!(target: "progress", "{}", message),
        }
    }

    fn finalize(&self, final_message: Option<String>) -> ProgressOutcome {
        if self.finalized.swap(true, Ordering::Relaxed) {
            return self.current_outcome();
        }

        let snapshot = snapshot_locked(&self.label, &lock(&self.state));

        match self.mode {
            ResolvedProgressMode::Quiet => {}
            ResolvedProgressMode::Plain => {
                self.render_snapshot_plain(&snapshot);
                if let Some(msg) = final_message.as_deref() {
                    eprintln!("[DONE] {}: {}", self.label, msg);
                }
            }
            ResolvedProgressMode::Rich => {
                if let Some(rich) = &self.rich {
                    rich.overall.finish_with_message(format!(
                        "done={} / {} elapsed={}",
                        snapshot.processed_units,
                        snapshot.total_units,
                        format_duration(snapshot.elapsed),
                    ));
                    if let Some(msg) = final_message {
                        rich.stage.finish_with_message(msg);
                    } else {
                        rich.stage.finish_and_clear();
                    }
                    rich.clear_all_ops();
                }
            }
        }

        self.current_outcome()
    }

    fn current_outcome(&self) -> ProgressOutcome {
        let state = lock(&self.state);
        ProgressOutcome {
            elapsed: state.started.elapsed(),
            total_units: state.total_units,
            processed_units: state.processed_units,
            warning_count: state.warning_count,
            warnings: state.warnings.clone(),
        }
    }
}

impl RichUi {
    fn new(label: &str) -> Self {
        let multi = MultiProgress::new();
        let overall = multi.add(ProgressBar::new(1));
        let stage = multi.add(ProgressBar::new_spinner());

        if let Ok(style) = ProgressStyle::with_template(
            "{spinner:.green} [{elapsed_precise}] {wide_bar:.cyan/blue} {pos}/{len} clips | {msg}",
        ) {
            overall.set_style(style);
        }
        overall.set_message(format!("{} starting", label));

        if let Ok(style) = ProgressStyle::with_template("{spinner:.yellow} {msg}") {
            stage.set_style(style.tick_chars("|/-\\ "));
        }
        stage.enable_steady_tick(Duration::from_millis(120));
        stage.set_message("starting");

        Self {
            multi,
            overall,
            stage,
            ops: Mutex::new(HashMap::new()),
        }
    }

    fn set_operation(&self, op_id: &str, status: &str) {
        let mut ops = lock(&self.ops);
        let bar = ops.entry(op_id.to_string()).or_insert_with(|| {
            let pb = self.multi.add(ProgressBar::new_spinner());
            if let Ok(style) = ProgressStyle::with_template("{spinner:.magenta} {prefix:.bold} {msg}") {
                pb.set_style(style.tick_chars("|/-\\ "));
            }
            pb.enable_steady_tick(Duration::from_millis(120));
            pb.set_prefix(op_id.to_string());
            pb
        });
        bar.set_message(status.to_string());
    }

    fn clear_operation(&self, op_id: &str) {
        if let Some(bar) = lock(&self.ops).remove(op_id) {
            bar.finish_and_clear();
        }
    }

    fn clear_all_ops(&self) {
        for (_id, bar) in lock(&self.ops).drain() {
            bar.finish_and_clear();
        }
    }
}

/// A worker that panicked mid-update leaves plain counters behind; keep going.
fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn push_warning_locked(state: &mut ProgressState, message: &str) {
    state.warning_count += 1;
    if state.warnings.len() >= MAX_STORED_WARNINGS {
        state.warnings.remove(0);
    }
    state.warnings.push(message.to_string());
}

fn snapshot_locked(label: &str, state: &ProgressState) -> ProgressSnapshot {
    let mut active_ops = state.operations.values().cloned().collect::<Vec<_>>();
    active_ops.sort();
    active_ops.truncate(4);

    ProgressSnapshot {
        label: label.to_string(),
        stage: state.stage.clone(),
        processed_units: state.processed_units,
        total_units: state.total_units,
        elapsed: state.started.elapsed(),
        active_ops,
    }
}

fn active_op_display(ops: &HashMap<String, String>) -> String {
    if ops.is_empty() {
        return "-".to_string();
    }
    let mut values = ops.values().cloned().collect::<Vec<_>>();
    values.sort();
    values.into_iter().take(3).collect::<Vec<_>>().join(",")
}

pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    let h = secs / 3600;
    let m = (secs % 3600) / 60;
    let s = secs % 60;
    if h > 0 {
        format!("{:02}:{:02}:{:02}", h, m, s)
    } else {
        format!("{:02}:{:02}", m, s)
    }
}

fn idle_warning_due(
    now: Instant,
    last_progress: Instant,
    last_idle_warn: Option<Instant>,
    idle_threshold: Duration,
    processed_units: u64,
    total_units: u64,
) -> bool {
    if processed_units >= total_units && total_units > 0 {
        return false;
    }
    if now.duration_since(last_progress) < idle_threshold {
        return false;
    }
    match last_idle_warn {
        Some(last_warn) => now.duration_since(last_warn) >= idle_threshold,
        None => true,
    }
}
