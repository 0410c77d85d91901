use std::path::{Path, PathBuf};

use crate::config::ArchiveConfig;
use crate::error::{ArchiveError, Result};
use crate::generate::{self, GenerateJob};
use crate::layout;
use crate::library::{self, Collection, Library};
use crate::manifest;
use crate::plan::{self, CopyPlan};
use crate::progress::{
    CollectionStatus, CollectionSummary, ProgressHandle, ProgressReporter, RunSummary,
};
use crate::tools::MediaTools;
use crate::workers::{self, CancelFlag};

/// Result of the copy stage for one collection.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CopyReport {
    pub copied: usize,
    pub failed: usize,
    pub bytes: u64,
    pub interrupted: bool,
}

pub struct ArchiveEngine<T: MediaTools> {
    config: ArchiveConfig,
    tools: T,
    cancel: CancelFlag,
}

impl<T: MediaTools> ArchiveEngine<T> {
    pub fn new(config: ArchiveConfig, tools: T) -> Self {
        Self {
            config,
            tools,
            cancel: CancelFlag::new(),
        }
    }

    /// Raising this flag stops new copies and tool invocations. Copied clips and
    /// manifests already written stay; the interrupted collection keeps its old manifest.
    pub fn cancel_flag(&self) -> CancelFlag {
        self.cancel.clone()
    }

    pub fn run(&self) -> Result<RunSummary> {
        let library = Library::open(&self.config.library_path)?;
        let collections = library.collections()?;
        let archive_root =
            layout::ensure_archive_root(&self.config.archive_base(), &library.display_name)?;

        tracing::info!(
            library = %library.root.display(),
            archive = %archive_root.display(),
            events = collections.len(),
            dry_run = self.config.dry_run,
            "archiving library"
        );
        tracing::debug!(
            probe = %self.config.tools.probe_program.display(),
            renderer = %self.config.tools.renderer_program.display(),
            workers = self.config.workers,
            policy = ?self.config.match_policy,
            "tool configuration"
        );

        let reporter = ProgressReporter::new("archive", self.config.progress);
        let progress = reporter.handle();

        let mut summaries = Vec::with_capacity(collections.len());
        for (idx, collection) in collections.iter().enumerate() {
            if self.cancel.is_cancelled() {
                summaries.push(
                    CollectionSummary::new(&collection.name).with_status(CollectionStatus::Cancelled),
                );
                continue;
            }
            progress.set_stage(format!(
                "event {}/{}: {}",
                idx + 1,
                collections.len(),
                collection.name
            ));
            summaries.push(self.archive_collection(&library, &archive_root, collection, &progress)?);
        }

        let cancelled = self.cancel.is_cancelled();
        let outcome = reporter.finish(if cancelled {
            "archive cancelled"
        } else {
            "archive complete"
        });

        Ok(RunSummary {
            library: library.display_name,
            archive_root,
            dry_run: self.config.dry_run,
            collections: summaries,
            elapsed: outcome.elapsed,
            warning_count: outcome.warning_count,
            warnings: outcome.warnings,
            cancelled,
        })
    }

    fn archive_collection(
        &self,
        library: &Library,
        archive_root: &Path,
        collection: &Collection,
        progress: &ProgressHandle,
    ) -> Result<CollectionSummary> {
        tracing::info!(collection = %collection.name, "looking in event");
        let mut summary = CollectionSummary::new(&collection.name);

        if !collection.has_media() {
            tracing::info!(path = %collection.path.display(), "no clips in event");
            return Ok(summary.with_status(CollectionStatus::SkippedNoMedia));
        }

        match self.sync_collection(library, archive_root, collection, progress, &mut summary) {
            Ok(()) => Ok(summary),
            Err(err) if err.is_fatal() => Err(err),
            Err(ArchiveError::Cancelled) => {
                tracing::warn!(collection = %collection.name, "cancelled; previous manifest left in place");
                Ok(summary.with_status(CollectionStatus::Cancelled))
            }
            Err(err) => {
                tracing::error!(collection = %collection.name, error = %err, "event not archived");
                Ok(summary.with_status(CollectionStatus::Failed(err.to_string())))
            }
        }
    }

    fn sync_collection(
        &self,
        library: &Library,
        archive_root: &Path,
        collection: &Collection,
        progress: &ProgressHandle,
        summary: &mut CollectionSummary,
    ) -> Result<()> {
        let media_dir = collection.media_dir();
        let library_clips = library::clip_set(&media_dir)?;
        summary.library_clips = library_clips.len();

        let archive_dir = layout::ensure_collection_dir(archive_root, &collection.name)?;
        let archive_clips = library::clip_set(&archive_dir)?;

        let copy_plan = plan::plan_with_policy(
            &library_clips,
            &archive_clips,
            self.config.match_policy,
            &media_dir,
            &archive_dir,
        );
        summary.already_archived = copy_plan.already_archived.len();
        summary.planned = copy_plan.to_copy.len();
        summary.diverged = copy_plan.diverged.len();
        for name in &copy_plan.diverged {
            progress.warning(format!(
                "{}/{} differs from the archived copy; archive left untouched",
                collection.name,
                Path::new(name).display()
            ));
        }
        tracing::info!(
            collection = %collection.name,
            to_copy = copy_plan.to_copy.len(),
            already_archived = copy_plan.already_archived.len(),
            "planned copies"
        );

        let copies = self.copy_clips(&copy_plan, &media_dir, &archive_dir, progress);
        summary.copied = copies.copied;
        summary.copy_failed = copies.failed;
        summary.bytes_copied = copies.bytes;
        if copies.interrupted {
            return Err(ArchiveError::Cancelled);
        }

        summary.thumbnails_cleared =
            layout::prepare_thumbnails(&archive_dir, &self.config.thumbnails.image_extension)?;

        let job = GenerateJob {
            library_name: &library.display_name,
            collection_name: &collection.name,
            collection_dir: &archive_dir,
            thumbnails: &self.config.thumbnails,
            workers: self.config.workers,
        };
        let report = generate::generate(&self.tools, &job, &self.cancel, progress)?;
        summary.archived_clips = report.clips_seen;
        summary.probe_failed = report.probe_failed;
        summary.render_failed = report.render_failed;
        summary.manifest_entries = report.manifest.clips.len();
        if report.cancelled {
            return Err(ArchiveError::Cancelled);
        }

        let manifest_path = manifest::write_manifest(&archive_dir, &report.manifest)?;
        tracing::info!(path = %manifest_path.display(), entries = summary.manifest_entries, "wrote event database");
        summary.manifest_path = Some(manifest_path);
        Ok(())
    }

    /// Copies in plan order as far as logging goes; the transfers themselves
    /// share the worker pool. A failed clip never stops the others.
    fn copy_clips(
        &self,
        copy_plan: &CopyPlan,
        media_dir: &Path,
        archive_dir: &Path,
        progress: &ProgressHandle,
    ) -> CopyReport {
        let mut report = CopyReport::default();
        if copy_plan.is_empty() {
            return report;
        }

        let pairs = copy_plan
            .to_copy
            .iter()
            .map(|name| (media_dir.join(name), archive_dir.join(name)))
            .collect::<Vec<(PathBuf, PathBuf)>>();
        for (from, to) in &pairs {
            tracing::info!(
                from = %from.display(),
                to = %to.display(),
                dry_run = self.config.dry_run,
                "copying"
            );
        }
        if self.config.dry_run {
            return report;
        }

        progress.add_total(pairs.len() as u64);
        let results = workers::fan_out(&pairs, self.config.workers, &self.cancel, |_, (from, to)| {
            let out = self.tools.copy_clip(from, to);
            progress.inc(1);
            out
        });

        for slot in results {
            match slot {
                Some(Ok(bytes)) => {
                    report.copied += 1;
                    report.bytes = report.bytes.saturating_add(bytes);
                }
                Some(Err(err)) => {
                    report.failed += 1;
                    progress.warning(err.to_string());
                }
                None => report.interrupted = true,
            }
        }
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MatchPolicy;
    use crate::manifest::Manifest;
    use crate::progress::{ProgressConfig, ProgressMode};
    use crate::testing::FakeTools;
    use filetime::FileTime;
    use std::collections::BTreeSet;
    use std::ffi::OsString;
    use std::fs;
    use tempfile::TempDir;

    struct Fixture {
        _tmp: TempDir,
        library: PathBuf,
        archive_base: PathBuf,
    }

    impl Fixture {
        fn new() -> Self {
            let tmp = TempDir::new().expect("tempdir");
            let library = tmp.path().join("Family.fcpbundle");
            let archive_base = tmp.path().join("vault");
            fs::create_dir_all(&library).unwrap();
            Self {
                _tmp: tmp,
                library,
                archive_base,
            }
        }

        fn add_clip(&self, event: &str, clip: impl AsRef<Path>, body: &[u8]) {
            let dir = self.library.join(event).join("Original Media");
            fs::create_dir_all(&dir).unwrap();
            fs::write(dir.join(clip), body).unwrap();
        }

        fn archive_event(&self, event: &str) -> PathBuf {
            self.archive_base.join("Family").join(event)
        }

        fn config(&self) -> ArchiveConfig {
            ArchiveConfig {
                archive_dir: Some(self.archive_base.clone()),
                progress: ProgressConfig::new(ProgressMode::Quiet),
                workers: 2,
                ..ArchiveConfig::new(&self.library)
            }
        }

        fn run_with(&self, config: ArchiveConfig, tools: FakeTools) -> (RunSummary, FakeTools) {
            let engine = ArchiveEngine::new(config, tools);
            let summary = engine.run().expect("run");
            (summary, engine.tools)
        }

        fn run(&self) -> RunSummary {
            self.run_with(self.config(), FakeTools::default()).0
        }

        fn archived_clips(&self, event: &str) -> library::ClipSet {
            library::clip_set(&self.archive_event(event)).unwrap()
        }

        fn manifest(&self, event: &str) -> Manifest {
            let path = self.archive_event(event).join(format!("{}.json", event));
            serde_json::from_slice(&fs::read(path).unwrap()).unwrap()
        }
    }

    fn names(items: &[&str]) -> library::ClipSet {
        items.iter().map(OsString::from).collect()
    }

    #[test]
    fn fresh_event_is_fully_archived() {
        let fx = Fixture::new();
        fx.add_clip("E1", "a.mov", b"aaa");
        fx.add_clip("E1", "b.mp4", b"bbbb");

        let run = fx.run();
        let e1 = run.collection("E1").unwrap();
        assert_eq!(e1.status, CollectionStatus::Synced);
        assert_eq!(e1.copied, 2);
        assert_eq!(e1.bytes_copied, 7);
        assert_eq!(fx.archived_clips("E1"), names(&["a.mov", "b.mp4"]));

        let manifest = fx.manifest("E1");
        assert_eq!(manifest.library, "Family");
        assert_eq!(manifest.clips.len(), 2);
        let thumbs = fx.archive_event("E1").join("thumbs");
        assert!(thumbs.join("a-01.jpg").exists());
        assert!(thumbs.join("b-01.jpg").exists());
    }

    #[test]
    fn only_missing_clips_are_copied_but_manifest_covers_all() {
        let fx = Fixture::new();
        fx.add_clip("E1", "a.mov", b"library a");
        fx.add_clip("E1", "b.mp4", b"library b");
        fs::create_dir_all(fx.archive_event("E1")).unwrap();
        fs::write(fx.archive_event("E1").join("a.mov"), b"archived a").unwrap();

        let (run, tools) = fx.run_with(fx.config(), FakeTools::default());
        let e1 = run.collection("E1").unwrap();
        assert_eq!(e1.copied, 1);
        assert_eq!(e1.already_archived, 1);
        assert_eq!(tools.copy_count(), 1);
        assert_eq!(fx.manifest("E1").clips.len(), 2);
        assert_eq!(
            fs::read(fx.archive_event("E1").join("a.mov")).unwrap(),
            b"archived a"
        );
    }

    #[test]
    fn event_without_media_dir_is_skipped_entirely() {
        let fx = Fixture::new();
        fs::create_dir_all(fx.library.join("Empty Event")).unwrap();
        fx.add_clip("E2", "c.avi", b"c");

        let run = fx.run();
        assert_eq!(
            run.collection("Empty Event").unwrap().status,
            CollectionStatus::SkippedNoMedia
        );
        assert!(!fx.archive_event("Empty Event").exists());
        assert_eq!(run.collection("E2").unwrap().copied, 1);
    }

    #[test]
    fn failing_probe_omits_one_entry() {
        let fx = Fixture::new();
        fx.add_clip("E1", "a.mov", b"a");
        fx.add_clip("E1", "b.mp4", b"b");
        fx.add_clip("E1", "c.avi", b"c");

        let (run, _) = fx.run_with(fx.config(), FakeTools::default().failing_probe("b.mp4"));
        let e1 = run.collection("E1").unwrap();
        assert_eq!(e1.status, CollectionStatus::Synced);
        assert_eq!(e1.probe_failed, 1);
        assert_eq!(fx.manifest("E1").clips.len(), 2);
        assert!(!fx.archive_event("E1").join("thumbs/b-01.jpg").exists());
        assert!(run.has_failures());
    }

    #[test]
    fn failed_copy_does_not_block_remaining_clips() {
        let fx = Fixture::new();
        fx.add_clip("E1", "a.mov", b"a");
        fx.add_clip("E1", "b.mp4", b"b");
        fx.add_clip("E1", "c.avi", b"c");

        let (run, _) = fx.run_with(fx.config(), FakeTools::default().failing_copy("b.mp4"));
        let e1 = run.collection("E1").unwrap();
        assert_eq!(e1.copied, 2);
        assert_eq!(e1.copy_failed, 1);
        assert_eq!(fx.archived_clips("E1"), names(&["a.mov", "c.avi"]));
        assert_eq!(fx.manifest("E1").clips.len(), 2);
        assert!(run.warnings.iter().any(|w| w.contains("b.mp4")));
    }

    #[test]
    fn second_run_is_idempotent() {
        let fx = Fixture::new();
        fx.add_clip("E1", "a.mov", b"a");
        fx.add_clip("E1", "b.mp4", b"b");

        fx.run();
        let manifest_path = fx.archive_event("E1").join("E1.json");
        let first = fs::read(&manifest_path).unwrap();
        let before = fx.archived_clips("E1");

        let second = fx.run();
        assert_eq!(second.copied(), 0);
        assert_eq!(fx.archived_clips("E1"), before);
        assert_eq!(fs::read(&manifest_path).unwrap(), first);
    }

    #[test]
    fn archive_is_additive_and_never_rewritten() {
        let fx = Fixture::new();
        fx.add_clip("E1", "a.mov", b"v1");
        fx.run();

        let archived_a = fx.archive_event("E1").join("a.mov");
        let stamp = FileTime::from_unix_time(1_300_000_000, 0);
        filetime::set_file_mtime(&archived_a, stamp).unwrap();
        fs::write(fx.archive_event("E1").join("old.wmv"), b"archive only").unwrap();

        // Library changes: a.mov edited in place, old.wmv never existed there, b.mp4 added.
        fx.add_clip("E1", "a.mov", b"v2 with more bytes");
        fx.add_clip("E1", "b.mp4", b"new");
        let before = fx.archived_clips("E1");
        let library = library::clip_set(&fx.library.join("E1/Original Media")).unwrap();

        fx.run();
        let after = fx.archived_clips("E1");
        let missing = library.difference(&before).cloned().collect::<BTreeSet<_>>();
        let expected = before.union(&missing).cloned().collect::<BTreeSet<_>>();
        assert_eq!(after, expected);
        assert_eq!(fs::read(&archived_a).unwrap(), b"v1");
        assert_eq!(
            FileTime::from_last_modification_time(&fs::metadata(&archived_a).unwrap()),
            stamp
        );
        assert_eq!(fx.manifest("E1").clips.len(), 3);
    }

    #[test]
    fn dry_run_copies_nothing_but_still_regenerates() {
        let fx = Fixture::new();
        fx.add_clip("E1", "a.mov", b"a");
        fs::create_dir_all(fx.archive_event("E1")).unwrap();
        fs::write(fx.archive_event("E1").join("z.mov"), b"z").unwrap();

        let config = ArchiveConfig {
            dry_run: true,
            ..fx.config()
        };
        let (run, tools) = fx.run_with(config, FakeTools::default());
        let e1 = run.collection("E1").unwrap();
        assert!(run.dry_run);
        assert_eq!(e1.planned, 1);
        assert_eq!(e1.copied, 0);
        assert_eq!(tools.copy_count(), 0);
        assert_eq!(fx.archived_clips("E1"), names(&["z.mov"]));
        assert!(fx.archive_event("E1").join("thumbs/z-01.jpg").exists());
        assert_eq!(fx.manifest("E1").clips.len(), 1);
    }

    #[test]
    fn missing_library_fails_before_touching_archive() {
        let fx = Fixture::new();
        let config = ArchiveConfig {
            library_path: fx.library.with_file_name("Nope.fcpbundle"),
            ..fx.config()
        };
        let err = ArchiveEngine::new(config, FakeTools::default())
            .run()
            .unwrap_err();
        assert!(err.is_fatal());
        assert!(!fx.archive_base.exists());
    }

    #[test]
    fn content_policy_flags_divergence_and_keeps_archive() {
        let fx = Fixture::new();
        fx.add_clip("E1", "a.mov", b"edited");
        fs::create_dir_all(fx.archive_event("E1")).unwrap();
        fs::write(fx.archive_event("E1").join("a.mov"), b"original").unwrap();

        let config = ArchiveConfig {
            match_policy: MatchPolicy::Content,
            ..fx.config()
        };
        let (run, tools) = fx.run_with(config, FakeTools::default());
        assert_eq!(run.diverged(), 1);
        assert_eq!(tools.copy_count(), 0);
        assert_eq!(
            fs::read(fx.archive_event("E1").join("a.mov")).unwrap(),
            b"original"
        );
    }

    #[test]
    fn cancellation_keeps_previous_manifest_and_skips_later_events() {
        let fx = Fixture::new();
        fx.add_clip("E1", "a.mov", b"a");
        fx.add_clip("E1", "b.mp4", b"b");
        fx.add_clip("E2", "c.avi", b"c");
        fs::create_dir_all(fx.archive_event("E1")).unwrap();
        fs::write(fx.archive_event("E1").join("E1.json"), b"previous").unwrap();

        let engine = ArchiveEngine::new(
            ArchiveConfig {
                workers: 1,
                ..fx.config()
            },
            FakeTools::default(),
        );
        let tools = FakeTools::default().cancel_after_probes(1, engine.cancel_flag());
        let engine = ArchiveEngine {
            tools,
            ..engine
        };

        let run = engine.run().expect("run");
        assert!(run.cancelled);
        assert_eq!(engine.tools.probe_count(), 1);
        assert_eq!(run.collection("E1").unwrap().status, CollectionStatus::Cancelled);
        assert_eq!(run.collection("E2").unwrap().status, CollectionStatus::Cancelled);
        assert_eq!(
            fs::read(fx.archive_event("E1").join("E1.json")).unwrap(),
            b"previous"
        );
        // Copies finished before the first probe.
        assert_eq!(fx.archived_clips("E1"), names(&["a.mov", "b.mp4"]));
        assert!(!fx.archive_event("E2").exists());
    }

    #[test]
    fn bundle_internals_are_never_archived() {
        let fx = Fixture::new();
        fx.add_clip("__Temp", "x.mov", b"x");
        fx.add_clip(".hidden", "y.mov", b"y");
        fx.add_clip("E1", "a.mov", b"a");

        let run = fx.run();
        assert_eq!(run.collections.len(), 1);
        assert!(!fx.archive_event("__Temp").exists());
    }

    #[cfg(unix)]
    #[test]
    fn non_utf8_clip_names_are_archived_once() {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;

        let fx = Fixture::new();
        let raw = OsStr::from_bytes(b"caf\xe9.mov");
        fx.add_clip("E1", raw, b"latin-1 name");
        fx.add_clip("E1", "b.mp4", b"b");

        let first = fx.run();
        let e1 = first.collection("E1").unwrap();
        assert_eq!(e1.copied, 2);
        assert_eq!(e1.copy_failed, 0);
        assert_eq!(
            fs::read(fx.archive_event("E1").join(raw)).unwrap(),
            b"latin-1 name"
        );
        assert!(fx.archived_clips("E1").contains(raw));
        assert_eq!(fx.manifest("E1").clips.len(), 2);

        let second = fx.run();
        assert_eq!(second.collection("E1").unwrap().planned, 0);
        assert_eq!(second.copy_failed(), 0);
    }

    #[test]
    fn failed_event_does_not_stop_the_next_one() {
        let fx = Fixture::new();
        fx.add_clip("E1", "a.mov", b"a");
        fx.add_clip("E2", "c.avi", b"c");
        // A plain file where E1's archive directory should go.
        fs::create_dir_all(fx.archive_base.join("Family")).unwrap();
        fs::write(fx.archive_event("E1"), b"not a directory").unwrap();

        let run = fx.run();
        assert!(matches!(
            run.collection("E1").unwrap().status,
            CollectionStatus::Failed(_)
        ));
        let e2 = run.collection("E2").unwrap();
        assert_eq!(e2.status, CollectionStatus::Synced);
        assert_eq!(e2.copied, 1);
        assert_eq!(fx.archived_clips("E2"), names(&["c.avi"]));
        assert_eq!(fx.manifest("E2").clips.len(), 1);
        assert!(run.has_failures());
        assert_eq!(
            fs::read(fx.archive_event("E1")).unwrap(),
            b"not a directory"
        );
    }
}
