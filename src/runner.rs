//! Execution of a single backup module.
//!
//! A [ModuleRunner] walks one module through
//! `Idle -> Preparing -> Producing -> Finalizing -> Done`. Every error is
//! caught here and turned into a [RunOutcome] with `success == false`, so one
//! failing module never prevents the others from running or being reported.

use std::fmt;
use std::fs;

use chrono::Local;

use crate::artifact::BackupArtifact;
use crate::backends::Backup;
use crate::util::command::Steps;
use crate::util::retention::{CleanupOutcome, Retention};
use crate::util::size;

/// Chronological log of one module run.
///
/// Lines are forwarded to the [log] facade under `backend::<module>` and kept
/// for the report.
#[derive(Debug, Clone)]
pub struct RunLog {
    target: String,
    lines: Vec<String>,
}

impl RunLog {
    pub fn new(module: &str) -> Self {
        Self {
            target: format!("backend::{module}"),
            lines: Vec::new(),
        }
    }

    pub fn info(&mut self, message: impl fmt::Display) {
        log::info!(target: self.target.as_str(), "{message}");
        self.push(format!("{message}"));
    }

    pub fn warn(&mut self, message: impl fmt::Display) {
        log::warn!(target: self.target.as_str(), "{message}");
        self.push(format!("WARN {message}"));
    }

    pub fn error(&mut self, message: impl fmt::Display) {
        log::error!(target: self.target.as_str(), "{message}");
        self.push(format!("ERROR {message}"));
    }

    fn push(&mut self, line: String) {
        let timestamp = Local::now().format("%H:%M:%S");
        self.lines.push(format!("[{timestamp}] {line}"));
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    pub fn into_lines(self) -> Vec<String> {
        self.lines
    }
}

/// Result of one module run. Immutable once returned by the runner.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    /// Name of the module that produced this outcome.
    pub module: String,
    pub success: bool,
    pub log_lines: Vec<String>,
    /// Size of the storage location before producing.
    pub size_before: Option<u64>,
    /// Size of the storage location after cleanup.
    pub size_after: Option<u64>,
    /// Present iff `success == false`.
    pub error: Option<String>,
    /// Artifacts present after the run, newest first, sizes resolved.
    pub artifacts: Vec<BackupArtifact>,
    /// Retention result, only present if the producer succeeded.
    pub cleanup: Option<CleanupOutcome>,
}

/// States of a module run.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum State {
    Idle,
    Preparing,
    Producing,
    Finalizing,
    Done { success: bool },
}

/// Drives one module through a single backup run.
pub struct ModuleRunner<'a, B: Backup + ?Sized> {
    backup: &'a B,
    state: State,
    log: RunLog,
}

impl<'a, B: Backup + ?Sized> ModuleRunner<'a, B> {
    pub fn new(backup: &'a B) -> Self {
        let log = RunLog::new(&backup.descriptor().name);
        Self {
            backup,
            state: State::Idle,
            log,
        }
    }

    pub fn state(&self) -> State {
        self.state
    }

    fn transition(&mut self, next: State) {
        log::debug!(
            target: "runner",
            "{}: {:?} -> {next:?}",
            self.backup.descriptor().name,
            self.state
        );
        self.state = next;
    }

    /// Runs the module to completion.
    pub fn run(mut self, steps: &Steps) -> RunOutcome {
        let backup = self.backup;
        let descriptor = backup.descriptor();
        let storage = descriptor.storage_location.clone();

        self.transition(State::Preparing);
        self.log.info(format!("Starting {} backup", descriptor.display_name));
        if let Err(e) = fs::create_dir_all(&storage) {
            let error = format!("Unable to create {}: {e}", storage.display());
            return self.finish(Err(error), None, None);
        }
        let size_before = size::entry_size(&storage);

        self.transition(State::Producing);
        if let Err(e) = backup.produce(&mut self.log, steps) {
            return self.finish(Err(e.to_string()), size_before, None);
        }

        self.transition(State::Finalizing);
        let cleanup = self.cleanup();

        self.finish(Ok(()), size_before, Some(cleanup))
    }

    fn cleanup(&mut self) -> CleanupOutcome {
        let retention = Retention::new(self.backup.descriptor().retention_limit);
        let artifacts = match self.backup.list_artifacts() {
            Ok(artifacts) => artifacts,
            Err(e) => {
                self.log.warn(format!("Listing backups for cleanup failed: {e}"));
                return CleanupOutcome::default();
            }
        };

        let outcome = retention.apply(&artifacts);
        for (identifier, reason) in &outcome.failures {
            self.log.warn(format!("Unable to remove {identifier}: {reason}"));
        }
        self.log.info(format!(
            "Removed {} old backup(s), keeping {}",
            outcome.removed_count(),
            retention.limit()
        ));

        outcome
    }

    fn finish(
        mut self,
        result: Result<(), String>,
        size_before: Option<u64>,
        cleanup: Option<CleanupOutcome>,
    ) -> RunOutcome {
        let success = result.is_ok();
        self.transition(State::Done { success });

        let error = result.err();
        match &error {
            Some(error) => self.log.error(format!("Backup failed: {error}")),
            None => self.log.info("Backup completed"),
        }

        let mut artifacts = self.backup.list_artifacts().unwrap_or_else(|e| {
            self.log.warn(format!("Listing backups failed: {e}"));
            Vec::new()
        });
        for artifact in &mut artifacts {
            artifact.resolve_size();
        }
        let size_after = size::entry_size(&self.backup.descriptor().storage_location);

        RunOutcome {
            module: self.backup.descriptor().name.clone(),
            success,
            log_lines: self.log.into_lines(),
            size_before,
            size_after,
            error,
            artifacts,
            cleanup,
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::artifact::tests::touch;
    use crate::artifact::ArtifactPattern;
    use crate::backends::{BackupError, ModuleDescriptor};
    use std::path::Path;
    use tempfile::TempDir;

    /// Writes one file per run, or fails without producing anything.
    pub(crate) struct FakeBackup {
        pub(crate) descriptor: ModuleDescriptor,
        pub(crate) fail: bool,
    }

    impl FakeBackup {
        pub(crate) fn new(root: &Path, name: &str, retention: usize, fail: bool) -> Self {
            let mut descriptor = ModuleDescriptor::new(
                name,
                &name.to_uppercase(),
                root,
                ArtifactPattern::files(format!("{name}_backup_*.bak")),
            );
            descriptor.retention_limit = retention;
            descriptor.color = 0x00FF00;
            Self { descriptor, fail }
        }
    }

    impl Backup for FakeBackup {
        fn descriptor(&self) -> &ModuleDescriptor {
            &self.descriptor
        }

        fn produce(&self, log: &mut RunLog, _steps: &Steps) -> Result<(), BackupError> {
            if self.fail {
                log.info("Checking service");
                return Err(BackupError::PrerequisiteUnavailable(
                    "service is not running".into(),
                ));
            }
            let name = format!("{}_backup_20240601.bak", self.descriptor.name);
            fs::write(self.descriptor.storage_location.join(&name), b"dump")?;
            log.info(format!("Wrote {name}"));
            Ok(())
        }
    }

    #[test]
    fn test_successful_run_applies_retention() {
        let temp_dir = TempDir::new().unwrap();
        let backup = FakeBackup::new(temp_dir.path(), "svc", 2, false);
        let storage = backup.descriptor.storage_location.clone();
        fs::create_dir_all(&storage).unwrap();
        touch(&storage, "svc_backup_20240529.bak", 3);
        touch(&storage, "svc_backup_20240530.bak", 2);

        let outcome = backup.run(&Steps::default());

        assert!(outcome.success);
        assert_eq!(outcome.error, None);
        assert_eq!(outcome.cleanup.as_ref().unwrap().removed, ["svc_backup_20240529.bak"]);
        let names: Vec<_> = outcome.artifacts.iter().map(|a| a.identifier.as_str()).collect();
        assert_eq!(names, ["svc_backup_20240601.bak", "svc_backup_20240530.bak"]);
        assert_eq!(outcome.artifacts[0].size_bytes, Some(4));
        assert_eq!(outcome.size_before, Some(0));
        assert_eq!(outcome.size_after, Some(4));
        assert!(outcome
            .log_lines
            .iter()
            .any(|line| line.ends_with("Removed 1 old backup(s), keeping 2")));
    }

    #[test]
    fn test_failed_producer_skips_cleanup() {
        let temp_dir = TempDir::new().unwrap();
        let backup = FakeBackup::new(temp_dir.path(), "svc", 1, true);
        let storage = backup.descriptor.storage_location.clone();
        fs::create_dir_all(&storage).unwrap();
        touch(&storage, "svc_backup_20240529.bak", 3);
        touch(&storage, "svc_backup_20240530.bak", 2);

        let outcome = backup.run(&Steps::default());

        assert!(!outcome.success);
        assert!(outcome.cleanup.is_none());
        assert_eq!(outcome.artifacts.len(), 2);
        let error = outcome.error.as_deref().unwrap();
        assert!(error.contains("service is not running"));
        let last = outcome.log_lines.last().unwrap();
        assert!(last.contains("ERROR Backup failed"));
        assert!(outcome.log_lines[1].ends_with("Checking service"));
    }

    #[test]
    fn test_storage_location_is_created() {
        let temp_dir = TempDir::new().unwrap();
        let backup = FakeBackup::new(temp_dir.path(), "fresh", 3, false);

        let outcome = backup.run(&Steps::default());

        assert!(outcome.success);
        assert!(temp_dir.path().join("fresh_backups").is_dir());
        assert_eq!(outcome.artifacts.len(), 1);
    }

    #[test]
    fn test_unusable_storage_is_module_failure() {
        let temp_dir = TempDir::new().unwrap();
        // a file where the backup root should be
        let root = temp_dir.path().join("root");
        fs::write(&root, b"").unwrap();
        let backup = FakeBackup::new(&root, "svc", 3, false);

        let outcome = backup.run(&Steps::default());

        assert!(!outcome.success);
        assert!(outcome.error.unwrap().starts_with("Unable to create"));
        assert!(outcome.artifacts.is_empty());
    }

    #[test]
    fn test_runner_starts_idle() {
        let temp_dir = TempDir::new().unwrap();
        let backup = FakeBackup::new(temp_dir.path(), "svc", 3, false);
        assert_eq!(ModuleRunner::new(&backup).state(), State::Idle);
    }

    #[test]
    fn test_log_lines_are_timestamped() {
        let mut log = RunLog::new("svc");
        log.info("one");
        log.warn("two");
        assert_eq!(log.lines().len(), 2);
        assert!(log.lines()[0].starts_with('['));
        assert!(log.lines()[1].ends_with("] WARN two"));
    }
}
