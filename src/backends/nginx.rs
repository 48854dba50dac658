//! Implements backup of the nginx configuration using [Nginx].

use std::path::{Path, PathBuf};
use std::process::Command;

use serde::{Deserialize, Serialize};

use super::{archive, Backup, BackupError, ModuleDescriptor};
use crate::artifact::ArtifactPattern;
use crate::config::ModuleSettings;
use crate::runner::RunLog;
use crate::util::command::Steps;
use crate::util::size::{self, format_size};

const NAME: &str = "nginx";
const DEFAULT_COLOR: u32 = 0x2ECC71;

/// Configuration of the [Nginx] backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NginxConfig {
    /// Configuration directory to archive.
    pub source: PathBuf,

    /// Run `nginx -t` before archiving and fail the backup on errors.
    pub check_config: bool,

    #[serde(flatten)]
    pub module: ModuleSettings,
}

impl Default for NginxConfig {
    fn default() -> Self {
        Self {
            source: PathBuf::from("/etc/nginx"),
            check_config: false,
            module: ModuleSettings::default(),
        }
    }
}

/// The [Nginx] backend archives the nginx configuration directory as
/// `nginx_backup_<YYYY-MM-DD_HH-MM-SS>.tar.gz`.
pub struct Nginx {
    descriptor: ModuleDescriptor,
    config: NginxConfig,
}

impl Nginx {
    /// Create a new [Nginx] instance.
    pub fn with_config(backup_root: &Path, default_retention: usize, config: NginxConfig) -> Self {
        let descriptor = ModuleDescriptor::new(
            NAME,
            "Nginx",
            backup_root,
            ArtifactPattern::files("nginx_backup_*.tar.gz"),
        )
        .with_settings(&config.module, default_retention, DEFAULT_COLOR);

        Self { descriptor, config }
    }
}

impl Backup for Nginx {
    fn descriptor(&self) -> &ModuleDescriptor {
        &self.descriptor
    }

    fn produce(&self, log: &mut RunLog, steps: &Steps) -> Result<(), BackupError> {
        let source = &self.config.source;
        if !source.is_dir() {
            return Err(BackupError::PrerequisiteUnavailable(format!(
                "{} is not a directory",
                source.display()
            )));
        }

        if self.config.check_config {
            log.info("Checking nginx configuration");
            steps.run(Command::new("nginx").arg("-t"))?;
        }

        log.info(format!("Archiving {}", source.display()));
        let name = format!("nginx_backup_{}.tar.gz", archive::timestamp("%Y-%m-%d_%H-%M-%S"));
        let dest = self.descriptor.storage_location.join(&name);
        archive::tar_gz(steps, source, &dest)?;

        let compressed = size::entry_size(&dest).unwrap_or_default();
        log.info(format!("Created {name} ({})", format_size(compressed)));

        Ok(())
    }
}
