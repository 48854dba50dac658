//! Implements backup of Pterodactyl game server volumes using [Pterodactyl].

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use serde::{Deserialize, Serialize};

use super::{archive, Backup, BackupError, ModuleDescriptor};
use crate::artifact::ArtifactPattern;
use crate::config::ModuleSettings;
use crate::runner::RunLog;
use crate::util::command::Steps;
use crate::util::size::{self, format_size};

const NAME: &str = "pterodactyl";
const DEFAULT_COLOR: u32 = 0x9B59B6;
const DIRECTORY_PREFIX: &str = "backup_";

/// Configuration of the [Pterodactyl] backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PterodactylConfig {
    /// Directory holding the volumes of all servers.
    pub volumes: PathBuf,

    #[serde(flatten)]
    pub module: ModuleSettings,
}

impl Default for PterodactylConfig {
    fn default() -> Self {
        Self {
            volumes: PathBuf::from("/var/lib/pterodactyl/volumes"),
            module: ModuleSettings::default(),
        }
    }
}

/// Copies the server volumes into `backup_<DD-MM-YYYY_HH-MM-SS>` directories.
///
/// Artifacts are plain directories so single server files can be restored
/// without unpacking an archive.
pub struct Pterodactyl {
    descriptor: ModuleDescriptor,
    config: PterodactylConfig,
}

impl Pterodactyl {
    /// Create a new [Pterodactyl] instance.
    pub fn with_config(
        backup_root: &Path,
        default_retention: usize,
        config: PterodactylConfig,
    ) -> Self {
        let descriptor = ModuleDescriptor::new(
            NAME,
            "Pterodactyl",
            backup_root,
            ArtifactPattern::directories_with_prefix(DIRECTORY_PREFIX),
        )
        .with_settings(&config.module, default_retention, DEFAULT_COLOR);

        Self { descriptor, config }
    }
}

impl Backup for Pterodactyl {
    fn descriptor(&self) -> &ModuleDescriptor {
        &self.descriptor
    }

    fn produce(&self, log: &mut RunLog, steps: &Steps) -> Result<(), BackupError> {
        let volumes = &self.config.volumes;
        if !volumes.is_dir() {
            return Err(BackupError::PrerequisiteUnavailable(format!(
                "volume directory {} doesn't exist",
                volumes.display()
            )));
        }

        let name = format!(
            "{DIRECTORY_PREFIX}{}",
            archive::timestamp("%d-%m-%Y_%H-%M-%S")
        );
        let dest = self.descriptor.storage_location.join(&name);
        if dest.exists() {
            return Err(BackupError::Io(std::io::Error::new(
                std::io::ErrorKind::AlreadyExists,
                format!("{name} already exists"),
            )));
        }

        log.info(format!("Copying {} to {name}", volumes.display()));
        let copied = steps.run(Command::new("cp").arg("-a").arg(volumes).arg(&dest));
        if let Err(e) = copied {
            if dest.exists() {
                if let Err(e) = fs::remove_dir_all(&dest) {
                    log.warn(format!("Removing incomplete {name} failed: {e}"));
                }
            }
            return Err(e.into());
        }

        let copied_size = size::entry_size(&dest).unwrap_or_default();
        log.info(format!("Created {name} ({})", format_size(copied_size)));

        Ok(())
    }
}
