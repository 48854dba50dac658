//! Backup artifacts and their enumeration inside a storage location.

use std::cmp::Ordering;
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};

use crate::util::size;

/// Whether an artifact is a single file or a directory tree.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum ArtifactKind {
    File,
    Directory,
}

/// One produced backup unit.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BackupArtifact {
    /// File or directory name, unique inside the storage location.
    pub identifier: String,
    /// Full path of the artifact.
    pub location: PathBuf,
    pub kind: ArtifactKind,
    /// Modification time of the artifact.
    pub created_at: DateTime<Local>,
    /// Size in bytes, [None] until [resolved](Self::resolve_size).
    pub size_bytes: Option<u64>,
}

impl BackupArtifact {
    /// Measure the size of the artifact if that didn't happen yet.
    pub fn resolve_size(&mut self) -> Option<u64> {
        if self.size_bytes.is_none() {
            self.size_bytes = size::entry_size(&self.location);
        }
        self.size_bytes
    }

    /// Orders newest first, ties broken by identifier descending.
    pub fn newest_first(a: &Self, b: &Self) -> Ordering {
        b.created_at
            .cmp(&a.created_at)
            .then_with(|| b.identifier.cmp(&a.identifier))
    }
}

/// Naming pattern of the artifacts of one module.
///
/// The pattern supports a single `*` wildcard matching any (possibly empty)
/// substring. Everything else has to match exactly, including case.
/// Only entries of the given [ArtifactKind] are considered.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ArtifactPattern {
    pattern: String,
    kind: ArtifactKind,
}

impl ArtifactPattern {
    pub fn new(pattern: impl Into<String>, kind: ArtifactKind) -> Self {
        Self {
            pattern: pattern.into(),
            kind,
        }
    }

    /// Pattern for files, e.g. `nginx_backup_*.tar.gz`.
    pub fn files(pattern: impl Into<String>) -> Self {
        Self::new(pattern, ArtifactKind::File)
    }

    /// Pattern for directories sharing a fixed prefix, e.g. `backup_`.
    pub fn directories_with_prefix(prefix: &str) -> Self {
        Self::new(format!("{prefix}*"), ArtifactKind::Directory)
    }

    pub fn kind(&self) -> ArtifactKind {
        self.kind
    }

    /// Returns if `name` matches the pattern.
    pub fn matches(&self, name: &str) -> bool {
        match self.pattern.split_once('*') {
            None => name == self.pattern,
            Some((prefix, suffix)) => {
                name.len() >= prefix.len() + suffix.len()
                    && name.starts_with(prefix)
                    && name.ends_with(suffix)
            }
        }
    }
}

impl fmt::Display for ArtifactPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.pattern)
    }
}

/// List all artifacts in `storage` matching `pattern`, newest first.
///
/// A storage location that doesn't exist yet has no artifacts.
pub fn list(storage: &Path, pattern: &ArtifactPattern) -> io::Result<Vec<BackupArtifact>> {
    let entries = match fs::read_dir(storage) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e),
    };

    let mut artifacts = Vec::new();
    for entry in entries {
        let entry = entry?;
        let Ok(identifier) = entry.file_name().into_string() else {
            log::debug!(target: "artifact", "Skipping non UTF-8 entry in {}", storage.display());
            continue;
        };
        if !pattern.matches(&identifier) {
            continue;
        }

        let metadata = match entry.metadata() {
            Ok(metadata) => metadata,
            Err(e) => {
                log::warn!(target: "artifact", "Unable to stat {identifier}: {e}");
                continue;
            }
        };
        let kind = if metadata.is_dir() {
            ArtifactKind::Directory
        } else if metadata.is_file() {
            ArtifactKind::File
        } else {
            continue;
        };
        if kind != pattern.kind() {
            continue;
        }

        let created_at = match metadata.modified() {
            Ok(modified) => DateTime::<Local>::from(modified),
            Err(e) => {
                log::warn!(target: "artifact", "No modification time for {identifier}: {e}");
                continue;
            }
        };

        artifacts.push(BackupArtifact {
            location: entry.path(),
            identifier,
            kind,
            created_at,
            size_bytes: None,
        });
    }

    artifacts.sort_by(BackupArtifact::newest_first);
    Ok(artifacts)
}
