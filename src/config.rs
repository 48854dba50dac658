//! Configuration file of the backup run.
//!
//! The configuration is read once at startup and passed around immutably.
//! Every key is optional; missing keys take the values of [Settings::default].

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use derive_more::{Display, Error, From};
use serde::{Deserialize, Serialize};

use crate::backends::mariadb::MariaDbConfig;
use crate::backends::nginx::NginxConfig;
use crate::backends::pterodactyl::PterodactylConfig;

/// Webhook URL shipped in the default config. Notifications are skipped
/// while it is still set.
pub const WEBHOOK_PLACEHOLDER: &str = "https://discord.com/api/webhooks/CHANGE_ME";

const DEFAULT_BACKUP_ROOT: &str = "/var/backups";
const DEFAULT_RETENTION: usize = 7;

/// Complete configuration of a backup run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Directory containing one `<module>_backups` folder per module.
    pub backup_root: PathBuf,

    /// Backups kept per module unless the module overrides it.
    pub default_retention: usize,

    /// Kill external steps running longer than this many seconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub step_timeout_secs: Option<u64>,

    pub notification: NotificationSettings,

    /// Configuration of the [MariaDb](crate::backends::MariaDb) backend.
    pub mariadb: MariaDbConfig,

    /// Configuration of the [Nginx](crate::backends::Nginx) backend.
    pub nginx: NginxConfig,

    /// Configuration of the [Pterodactyl](crate::backends::Pterodactyl) backend.
    pub pterodactyl: PterodactylConfig,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            backup_root: PathBuf::from(DEFAULT_BACKUP_ROOT),
            default_retention: DEFAULT_RETENTION,
            step_timeout_secs: None,
            notification: NotificationSettings::default(),
            mariadb: MariaDbConfig::default(),
            nginx: NginxConfig::default(),
            pterodactyl: PterodactylConfig::default(),
        }
    }
}

/// Webhook the run report is posted to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationSettings {
    pub webhook_url: String,
    /// Name the report is posted under.
    pub username: String,
    pub timeout_secs: u64,
}

impl Default for NotificationSettings {
    fn default() -> Self {
        Self {
            webhook_url: WEBHOOK_PLACEHOLDER.to_string(),
            username: "Backup Bot".to_string(),
            timeout_secs: 30,
        }
    }
}

/// Settings every module has in common.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModuleSettings {
    /// Overrides [`Settings::default_retention`].
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retention: Option<usize>,

    /// Embed color of successful runs.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<u32>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub icon_url: Option<String>,
}

#[derive(Debug, Display, Error, From)]
/// Errors while loading the [Settings].
pub enum ConfigError {
    #[display("Reading the config file failed: {_0}")]
    Read(io::Error),
    #[display("Parsing the config file failed: {_0}")]
    Parse(toml::de::Error),
}

impl Settings {
    /// Parse settings from the content of a TOML config file.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Load the settings from `path`.
    ///
    /// If the file doesn't exist yet the defaults are written to it and used.
    /// Failing to write the defaults is only a warning.
    pub fn load_or_create(path: &Path) -> Result<Self, ConfigError> {
        match fs::read_to_string(path) {
            Ok(content) => Self::from_toml(&content),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                log::debug!(
                    target: "config",
                    "Writing default config to {} because it doesn't exist yet",
                    path.display()
                );
                let default_config = Settings::default();
                match toml::to_string_pretty(&default_config) {
                    Ok(config_str) => {
                        if let Err(e) = fs::write(path, config_str) {
                            log::warn!(
                                target: "config",
                                "Writing default config to {} failed {e}",
                                path.display(),
                            );
                        }
                    }
                    Err(e) => log::warn!(target: "config", "Serializing default config failed: {e}"),
                }

                Ok(default_config)
            }
            Err(e) => Err(ConfigError::Read(e)),
        }
    }

    /// Per-step timeout of external programs.
    pub fn step_timeout(&self) -> Option<std::time::Duration> {
        self.step_timeout_secs.map(std::time::Duration::from_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_settings() {
        let settings = Settings::default();
        assert_eq!(settings.default_retention, 7);
        assert_eq!(settings.notification.webhook_url, WEBHOOK_PLACEHOLDER);
        assert_eq!(settings.step_timeout(), None);
    }

    #[test]
    fn test_partial_config_keeps_defaults() {
        let settings = Settings::from_toml(
            r#"
            backup_root = "/srv/backups"
            step_timeout_secs = 600

            [notification]
            webhook_url = "https://hooks.example.org/abc"

            [mariadb]
            container = "db"
            retention = 14
            color = 0xFF0000
            "#,
        )
        .unwrap();

        assert_eq!(settings.backup_root, PathBuf::from("/srv/backups"));
        assert_eq!(settings.default_retention, 7);
        assert_eq!(settings.step_timeout().unwrap().as_secs(), 600);
        assert_eq!(settings.notification.username, "Backup Bot");
        assert_eq!(settings.mariadb.container, "db");
        assert_eq!(settings.mariadb.module.retention, Some(14));
        assert_eq!(settings.mariadb.module.color, Some(0xFF0000));
        assert_eq!(settings.nginx, NginxConfig::default());
    }

    #[test]
    fn test_invalid_config_is_error() {
        let err = Settings::from_toml("default_retention = \"many\"").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_missing_config_is_created() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.toml");

        let created = Settings::load_or_create(&path).unwrap();
        assert_eq!(created, Settings::default());
        assert!(path.exists());

        let loaded = Settings::load_or_create(&path).unwrap();
        assert_eq!(loaded, created);
    }
}
