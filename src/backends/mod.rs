//! Backend modules for performing individual backup tasks.
//!
//! Currently the following backends are implemented, in the order they run:
//!
//! - [MariaDb]: Compressed dumps of every database of a MariaDB container.
//! - [Nginx]: Compressed archive of the nginx configuration directory.
//! - [Pterodactyl]: Copy of the Pterodactyl server volumes.

pub mod archive;
pub mod mariadb;
pub mod nginx;
pub mod pterodactyl;

use std::io;
use std::path::{Path, PathBuf};

use derive_more::{Display, Error, From};

pub use mariadb::MariaDb;
pub use nginx::Nginx;
pub use pterodactyl::Pterodactyl;

use crate::artifact::{self, ArtifactPattern, BackupArtifact};
use crate::config::{ModuleSettings, Settings};
use crate::runner::{ModuleRunner, RunLog, RunOutcome};
use crate::util::command::{StepError, Steps};

/// Generic backup backend.
pub trait Backup {
    /// Static description of the module.
    fn descriptor(&self) -> &ModuleDescriptor;

    /// Creates one or more artifacts in the module's storage location.
    ///
    /// Progress is written to `log`. The storage location exists when this is
    /// called. Retention is not part of producing, see [`Backup::run`].
    fn produce(&self, log: &mut RunLog, steps: &Steps) -> Result<(), BackupError>;

    /// Artifacts currently present in the storage location, newest first.
    fn list_artifacts(&self) -> io::Result<Vec<BackupArtifact>> {
        let descriptor = self.descriptor();
        artifact::list(&descriptor.storage_location, &descriptor.pattern)
    }

    /// Produces a backup and applies retention afterwards.
    fn run(&self, steps: &Steps) -> RunOutcome {
        ModuleRunner::new(self).run(steps)
    }
}

/// Static per-service configuration of a backup module.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ModuleDescriptor {
    /// Name used on the command line and in log targets.
    pub name: String,
    /// Human-readable name used in reports.
    pub display_name: String,
    /// Directory the artifacts are stored in.
    pub storage_location: PathBuf,
    pub pattern: ArtifactPattern,
    /// Number of artifacts to keep, at least one.
    pub retention_limit: usize,
    /// Embed color of successful runs (`0xRRGGBB`).
    pub color: u32,
    pub icon_url: Option<String>,
}

impl ModuleDescriptor {
    /// Describes a module storing its artifacts in `<backup_root>/<name>_backups`.
    pub fn new(
        name: &str,
        display_name: &str,
        backup_root: &Path,
        pattern: ArtifactPattern,
    ) -> Self {
        let storage_location = backup_root.join(format!("{name}_backups"));
        if storage_location.is_relative() {
            log::warn!(target: "backends", "storage location of {name} is relative: {}", storage_location.display());
        }

        Self {
            name: name.to_string(),
            display_name: display_name.to_string(),
            storage_location,
            pattern,
            retention_limit: 1,
            color: 0,
            icon_url: None,
        }
    }

    /// Applies the module's settings, falling back to the global defaults.
    pub fn with_settings(
        mut self,
        module: &ModuleSettings,
        default_retention: usize,
        default_color: u32,
    ) -> Self {
        let retention = module.retention.unwrap_or(default_retention);
        if retention == 0 {
            log::warn!(target: "backends", "Retention of {} is 0, keeping 1 backup", self.name);
        }
        self.retention_limit = retention.max(1);
        self.color = module.color.unwrap_or(default_color);
        self.icon_url = module.icon_url.clone();
        self
    }
}

/// Errors that end the producing phase of a module.
#[derive(Debug, Display, Error, From)]
pub enum BackupError {
    /// Something the module depends on isn't available, e.g. a stopped container.
    #[display("Prerequisite unavailable: {_0}")]
    PrerequisiteUnavailable(#[error(ignore)] String),
    /// An external step failed.
    #[display("{_0}")]
    #[from]
    StepFailed(StepError),
    /// Some sub-units (e.g. single databases) failed while others completed.
    #[display("{} of {total} sub-unit(s) failed: {}", failed.len(), failed.join(", "))]
    PartialFailure {
        #[error(ignore)]
        failed: Vec<String>,
        #[error(ignore)]
        total: usize,
    },
    /// Filesystem error of the module itself.
    #[display("I/O error: {_0}")]
    #[from]
    Io(io::Error),
}

/// All configured backup modules in the order they run.
///
/// Data stores come first, then filesystem and application modules.
pub fn from_settings(settings: &Settings) -> Vec<Box<dyn Backup>> {
    let root = settings.backup_root.as_path();
    let retention = settings.default_retention;

    vec![
        Box::new(MariaDb::with_config(root, retention, settings.mariadb.clone())) as Box<dyn Backup>,
        Box::new(Nginx::with_config(root, retention, settings.nginx.clone())),
        Box::new(Pterodactyl::with_config(root, retention, settings.pterodactyl.clone())),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_descriptor_storage_and_fallbacks() {
        let module = ModuleSettings::default();
        let descriptor = ModuleDescriptor::new(
            "nginx",
            "Nginx",
            Path::new("/var/backups"),
            ArtifactPattern::files("nginx_backup_*.tar.gz"),
        )
        .with_settings(&module, 7, 0x2ECC71);

        assert_eq!(
            descriptor.storage_location,
            PathBuf::from("/var/backups/nginx_backups")
        );
        assert_eq!(descriptor.retention_limit, 7);
        assert_eq!(descriptor.color, 0x2ECC71);
        assert_eq!(descriptor.icon_url, None);
    }

    #[test]
    fn test_descriptor_module_overrides() {
        let module = ModuleSettings {
            retention: Some(0),
            color: Some(0x123456),
            icon_url: Some("https://example.org/icon.png".into()),
        };
        let descriptor = ModuleDescriptor::new(
            "mariadb",
            "MariaDB",
            Path::new("/srv"),
            ArtifactPattern::files("*"),
        )
        .with_settings(&module, 7, 0);

        assert_eq!(descriptor.retention_limit, 1);
        assert_eq!(descriptor.color, 0x123456);
        assert!(descriptor.icon_url.is_some());
    }

    #[test]
    fn test_declared_order_puts_data_stores_first() {
        let settings = Settings::default();
        let names: Vec<_> = from_settings(&settings)
            .iter()
            .map(|backup| backup.descriptor().name.clone())
            .collect();
        assert_eq!(names, ["mariadb", "nginx", "pterodactyl"]);
    }

    #[test]
    fn test_partial_failure_message() {
        let err = BackupError::PartialFailure {
            failed: vec!["shop".into(), "wiki".into()],
            total: 5,
        };
        assert_eq!(err.to_string(), "2 of 5 sub-unit(s) failed: shop, wiki");
    }
}
