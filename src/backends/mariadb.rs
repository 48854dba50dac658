//! Implements backup of the databases of a MariaDB container using [MariaDb].

use std::fs;
use std::path::Path;
use std::process::Command;

use serde::{Deserialize, Serialize};

use super::{archive, Backup, BackupError, ModuleDescriptor};
use crate::artifact::ArtifactPattern;
use crate::config::ModuleSettings;
use crate::runner::RunLog;
use crate::util::command::{Output, StepError, Steps};
use crate::util::size::{self, format_size};

const NAME: &str = "mariadb";
const DEFAULT_COLOR: u32 = 0x3498DB;

/// Configuration of the [MariaDb] backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MariaDbConfig {
    /// Container runtime CLI.
    pub runtime: String,

    /// Name of the container running the database server.
    pub container: String,

    pub user: String,

    /// Passed to the container through `MYSQL_PWD`, never on the command line.
    pub password: String,

    /// Client used inside the container to list the databases.
    pub client: String,

    /// Dump tool used inside the container.
    pub dump_command: String,

    /// Databases which are never dumped.
    pub exclude: Vec<String>,

    #[serde(flatten)]
    pub module: ModuleSettings,
}

impl Default for MariaDbConfig {
    fn default() -> Self {
        Self {
            runtime: "docker".to_string(),
            container: "mariadb".to_string(),
            user: "root".to_string(),
            password: String::new(),
            client: "mariadb".to_string(),
            dump_command: "mariadb-dump".to_string(),
            exclude: ["information_schema", "performance_schema", "mysql", "sys"]
                .map(String::from)
                .to_vec(),
            module: ModuleSettings::default(),
        }
    }
}

/// Dumps every database of a MariaDB server running in a container.
///
/// Each database is dumped on its own into a staging directory, which is
/// then archived as `mariadb_backup_<YYYYMMDD_HHMMSS>.tar.gz`. A failing
/// database doesn't stop the dumps of the others.
pub struct MariaDb {
    descriptor: ModuleDescriptor,
    config: MariaDbConfig,
}

impl MariaDb {
    /// Create a new [MariaDb] instance.
    pub fn with_config(backup_root: &Path, default_retention: usize, config: MariaDbConfig) -> Self {
        let descriptor = ModuleDescriptor::new(
            NAME,
            "MariaDB",
            backup_root,
            ArtifactPattern::files("mariadb_backup_*.tar.gz"),
        )
        .with_settings(&config.module, default_retention, DEFAULT_COLOR);

        Self { descriptor, config }
    }

    /// `<runtime> exec -e MYSQL_PWD <container>`
    fn exec(&self) -> Command {
        let mut command = Command::new(&self.config.runtime);
        command
            .env("MYSQL_PWD", &self.config.password)
            .arg("exec")
            .arg("-e")
            .arg("MYSQL_PWD")
            .arg(&self.config.container);
        command
    }

    fn ensure_running(&self, steps: &Steps) -> Result<(), BackupError> {
        let container = &self.config.container;
        let running = steps
            .output(
                Command::new(&self.config.runtime)
                    .arg("inspect")
                    .arg("-f")
                    .arg("{{.State.Running}}")
                    .arg(container),
            )
            .map_err(|e| {
                BackupError::PrerequisiteUnavailable(format!("container {container} not found: {e}"))
            })?;

        if running.trim() != "true" {
            return Err(BackupError::PrerequisiteUnavailable(format!(
                "container {container} is not running"
            )));
        }

        Ok(())
    }

    fn databases(&self, steps: &Steps) -> Result<Vec<String>, StepError> {
        let output = steps.output(
            self.exec()
                .arg(&self.config.client)
                .arg("-N")
                .arg("-B")
                .arg(format!("--user={}", self.config.user))
                .arg("-e")
                .arg("SHOW DATABASES"),
        )?;

        Ok(parse_databases(&output, &self.config.exclude))
    }

    fn dump(&self, steps: &Steps, database: &str, dest: &Path) -> Result<u64, StepError> {
        steps.pipe_to_file(
            self.exec()
                .arg(&self.config.dump_command)
                .arg("--opt") // sensible dump defaults
                .arg("--single-transaction")
                .arg("--routines")
                .arg("--triggers")
                .arg(format!("--user={}", self.config.user))
                .arg(database),
            dest,
            Output::Plain,
        )
    }
}

impl Backup for MariaDb {
    fn descriptor(&self) -> &ModuleDescriptor {
        &self.descriptor
    }

    fn produce(&self, log: &mut RunLog, steps: &Steps) -> Result<(), BackupError> {
        log.info(format!("Checking container {}", self.config.container));
        self.ensure_running(steps)?;

        let databases = self.databases(steps)?;
        if databases.is_empty() {
            return Err(BackupError::PrerequisiteUnavailable(
                "no databases to back up".to_string(),
            ));
        }
        log.info(format!("Found {} database(s): {}", databases.len(), databases.join(", ")));

        let name = format!("mariadb_backup_{}", archive::timestamp("%Y%m%d_%H%M%S"));
        let storage = &self.descriptor.storage_location;
        let staging = storage.join(&name);
        fs::create_dir(&staging)?;

        let mut failed = Vec::new();
        let mut first_error = None;
        for database in &databases {
            let dest = staging.join(format!("{database}.sql"));
            match self.dump(steps, database, &dest) {
                Ok(bytes) => log.info(format!("Dumped {database} ({})", format_size(bytes))),
                Err(e) => {
                    log.error(format!("Dump of {database} failed: {e}"));
                    failed.push(database.clone());
                    first_error.get_or_insert(e);
                }
            }
        }

        let result = if failed.len() == databases.len() {
            Err(first_error.map_or_else(
                || BackupError::PrerequisiteUnavailable("no database dumped".to_string()),
                BackupError::StepFailed,
            ))
        } else {
            let archive_path = storage.join(format!("{name}.tar.gz"));
            archive::tar_gz(steps, &staging, &archive_path)
                .map(|_| {
                    let compressed = size::entry_size(&archive_path).unwrap_or_default();
                    log.info(format!("Created {name}.tar.gz ({})", format_size(compressed)));
                })
                .map_err(BackupError::from)
        };

        if let Err(e) = fs::remove_dir_all(&staging) {
            log.warn(format!("Removing staging directory {name} failed: {e}"));
        }
        result?;

        if failed.is_empty() {
            Ok(())
        } else {
            Err(BackupError::PartialFailure {
                failed,
                total: databases.len(),
            })
        }
    }
}

/// Database names from `SHOW DATABASES` output, without excluded ones.
fn parse_databases(output: &str, exclude: &[String]) -> Vec<String> {
    output
        .lines()
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .filter(|name| !exclude.iter().any(|excluded| excluded == name))
        .map(String::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_databases_skips_excluded() {
        let exclude = MariaDbConfig::default().exclude;
        let output = "information_schema\napp\n\nmysql\nshop \nperformance_schema\nsys\n";
        assert_eq!(parse_databases(output, &exclude), ["app", "shop"]);
    }

    #[cfg(unix)]
    mod fake_runtime {
        use super::*;
        use crate::artifact::ArtifactKind;
        use std::os::unix::fs::PermissionsExt;
        use tempfile::TempDir;

        /// A stand-in for the container runtime CLI.
        ///
        /// `inspect` prints `$RUNNING`, the client lists three databases and
        /// dumping `shop` fails if `FAIL_SHOP` is part of the container name.
        const FAKE_RUNTIME: &str = r#"#!/bin/sh
case "$1" in
  inspect)
    for last; do :; done
    case "$last" in
      *stopped*) echo false ;;
      *) echo true ;;
    esac ;;
  exec)
    container="$4"
    shift 4
    case "$1" in
      mariadb) printf 'app\nshop\ninformation_schema\n' ;;
      mariadb-dump)
        for last; do :; done
        case "$container:$last" in
          *FAIL_SHOP*:shop) echo "Got error: 1044" >&2; exit 2 ;;
        esac
        echo "-- dump of $last with password $MYSQL_PWD" ;;
    esac ;;
esac
"#;

        fn setup(container: &str) -> (TempDir, MariaDb) {
            let temp_dir = TempDir::new().unwrap();
            let runtime = temp_dir.path().join("fake-docker");
            fs::write(&runtime, FAKE_RUNTIME).unwrap();
            fs::set_permissions(&runtime, fs::Permissions::from_mode(0o755)).unwrap();

            let config = MariaDbConfig {
                runtime: runtime.display().to_string(),
                container: container.to_string(),
                password: "secret".to_string(),
                ..Default::default()
            };
            let backup = MariaDb::with_config(&temp_dir.path().join("root"), 3, config);
            (temp_dir, backup)
        }

        #[test]
        fn test_successful_run_archives_all_databases() {
            let (_temp_dir, backup) = setup("mariadb");

            let outcome = backup.run(&Steps::default());

            assert!(outcome.success, "{:?}", outcome.log_lines);
            assert_eq!(outcome.artifacts.len(), 1);
            let artifact = &outcome.artifacts[0];
            assert_eq!(artifact.kind, ArtifactKind::File);
            assert!(artifact.identifier.starts_with("mariadb_backup_"));
            assert!(artifact.identifier.ends_with(".tar.gz"));

            let listing = Steps::default()
                .output(Command::new("tar").arg("-tzf").arg(&artifact.location))
                .unwrap();
            assert!(listing.lines().any(|line| line.ends_with("/app.sql")));
            assert!(listing.lines().any(|line| line.ends_with("/shop.sql")));
            assert!(!listing.contains("information_schema"));
        }

        #[test]
        fn test_failing_database_is_partial_failure() {
            let (_temp_dir, backup) = setup("FAIL_SHOP");

            let outcome = backup.run(&Steps::default());

            assert!(!outcome.success);
            assert_eq!(
                outcome.error.as_deref(),
                Some("1 of 2 sub-unit(s) failed: shop")
            );
            // the dump of the healthy database is still kept
            assert_eq!(outcome.artifacts.len(), 1);
            assert!(outcome.cleanup.is_none());
            assert!(outcome
                .log_lines
                .iter()
                .any(|line| line.contains("Dump of shop failed")));
            // no staging directory left behind
            let leftovers = fs::read_dir(&backup.descriptor().storage_location)
                .unwrap()
                .filter(|entry| entry.as_ref().unwrap().path().is_dir())
                .count();
            assert_eq!(leftovers, 0);
        }

        #[test]
        fn test_stopped_container_is_prerequisite_failure() {
            let (_temp_dir, backup) = setup("stopped-db");
            let mut log = RunLog::new(NAME);
            fs::create_dir_all(&backup.descriptor().storage_location).unwrap();

            let err = backup.produce(&mut log, &Steps::default()).unwrap_err();
            assert!(matches!(err, BackupError::PrerequisiteUnavailable(_)));
        }
    }
}
