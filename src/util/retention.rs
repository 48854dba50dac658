use std::fs;
use std::io;

use crate::artifact::{ArtifactKind, BackupArtifact};

/// Keeps the newest `limit` artifacts of a module and deletes the rest.
///
/// The limit is always at least one, so a retention pass never removes every
/// backup of a module.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Retention {
    limit: usize,
}

impl Retention {
    pub fn new(limit: usize) -> Self {
        if limit == 0 {
            log::warn!(target: "retention", "Retention limit 0 is not allowed, keeping 1 backup");
        }

        Self {
            limit: limit.max(1),
        }
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Splits `artifacts` into the ones to keep and the ones to remove.
    ///
    /// `artifacts` must be sorted newest first, as returned by
    /// [`artifact::list`](crate::artifact::list). They are not re-sorted.
    pub fn split<'a>(
        &self,
        artifacts: &'a [BackupArtifact],
    ) -> (&'a [BackupArtifact], &'a [BackupArtifact]) {
        artifacts.split_at(self.limit.min(artifacts.len()))
    }

    /// Deletes every artifact beyond the limit.
    ///
    /// `artifacts` must be sorted newest first. A failed deletion is recorded
    /// in [`CleanupOutcome::failures`] and the remaining candidates are still
    /// processed.
    pub fn apply(&self, artifacts: &[BackupArtifact]) -> CleanupOutcome {
        let (kept, candidates) = self.split(artifacts);
        log::debug!(
            target: "retention",
            "Keeping {} of {} backup(s), limit {}",
            kept.len(),
            artifacts.len(),
            self.limit,
        );

        let mut outcome = CleanupOutcome::default();
        for artifact in candidates {
            match remove(artifact) {
                Ok(()) => {
                    log::info!(target: "retention", "Removed old backup {}", artifact.identifier);
                    outcome.removed.push(artifact.identifier.clone());
                }
                Err(e) => {
                    log::warn!(target: "retention", "Removing {} failed: {e}", artifact.identifier);
                    outcome
                        .failures
                        .push((artifact.identifier.clone(), e.to_string()));
                }
            }
        }

        outcome
    }
}

fn remove(artifact: &BackupArtifact) -> io::Result<()> {
    match artifact.kind {
        ArtifactKind::File => fs::remove_file(&artifact.location),
        ArtifactKind::Directory => fs::remove_dir_all(&artifact.location),
    }
}

/// Result of one retention pass.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CleanupOutcome {
    /// Identifiers of the artifacts actually deleted.
    pub removed: Vec<String>,
    /// Artifacts that couldn't be deleted, with the reason.
    pub failures: Vec<(String, String)>,
}

impl CleanupOutcome {
    pub fn removed_count(&self) -> usize {
        self.removed.len()
    }

    pub fn is_noop(&self) -> bool {
        self.removed.is_empty() && self.failures.is_empty()
    }
}
