use std::fs;
use std::path::Path;

use svc_backup_lib::artifact::ArtifactPattern;
use svc_backup_lib::backends::{Backup, BackupError, ModuleDescriptor};
use svc_backup_lib::config::Settings;
use svc_backup_lib::notify::{Delivery, Webhook};
use svc_backup_lib::orchestrator::Orchestrator;
use svc_backup_lib::report::Formatter;
use svc_backup_lib::runner::RunLog;
use svc_backup_lib::util::command::Steps;
use tempfile::TempDir;

/// Writes a dated dump, or fails because its service is down.
struct Service {
    descriptor: ModuleDescriptor,
    healthy: bool,
}

impl Service {
    fn boxed(root: &Path, name: &str, healthy: bool) -> Box<dyn Backup> {
        let mut descriptor = ModuleDescriptor::new(
            name,
            &format!("{name} service"),
            root,
            ArtifactPattern::files(format!("{name}_backup_*.sql.gz")),
        );
        descriptor.retention_limit = 2;
        descriptor.color = 0x3498DB;
        Box::new(Self {
            descriptor,
            healthy,
        })
    }
}

impl Backup for Service {
    fn descriptor(&self) -> &ModuleDescriptor {
        &self.descriptor
    }

    fn produce(&self, log: &mut RunLog, _steps: &Steps) -> Result<(), BackupError> {
        if !self.healthy {
            return Err(BackupError::PrerequisiteUnavailable(format!(
                "{} is not running",
                self.descriptor.name
            )));
        }

        let name = format!("{}_backup_20240601.sql.gz", self.descriptor.name);
        fs::write(self.descriptor.storage_location.join(&name), b"dump")?;
        log.info(format!("Wrote {name}"));
        Ok(())
    }
}

#[test]
fn one_success_one_failure() {
    let temp_dir = TempDir::new().unwrap();
    let root = temp_dir.path().join("backups");
    let orchestrator = Orchestrator::new(
        root.clone(),
        vec![
            Service::boxed(&root, "postgres", true),
            Service::boxed(&root, "redis", false),
        ],
        Steps::default(),
    );

    let no_modules: [&str; 0] = [];
    let report = orchestrator.run(&orchestrator.select(&no_modules, false)).unwrap();

    assert_eq!(report.success_count(), 1);
    assert_eq!(report.failure_count(), 1);
    assert_eq!(report.summary_line(), "1 completed, 1 failed");
    assert_eq!(report.get("postgres").unwrap().artifacts.len(), 1);
    assert!(report.get("redis").unwrap().artifacts.is_empty());

    let payload = orchestrator.payload(&Formatter::new("Backup Bot"), &report);
    assert_eq!(payload.content, "Backup run finished: 1 completed, 1 failed");
    assert_eq!(payload.embeds.len(), 2);
    assert_eq!(payload.embeds[0].title, "postgres service backup succeeded");
    assert!(payload.embeds[0].description.contains("01/06/2024"));
    assert!(payload.embeds[1]
        .description
        .contains("Prerequisite unavailable: redis is not running"));

    // nothing configured, nothing sent
    let webhook = Webhook::from_settings(&Settings::default().notification);
    assert_eq!(webhook.deliver(&payload).unwrap(), Delivery::Skipped);
}

#[test]
fn repeated_runs_keep_retention_limit() {
    let temp_dir = TempDir::new().unwrap();
    let root = temp_dir.path().join("backups");
    let storage = root.join("postgres_backups");
    fs::create_dir_all(&storage).unwrap();
    for day in ["20240520", "20240521", "20240522"] {
        fs::write(storage.join(format!("postgres_backup_{day}.sql.gz")), b"old").unwrap();
    }
    let orchestrator = Orchestrator::new(
        root.clone(),
        vec![Service::boxed(&root, "postgres", true)],
        Steps::default(),
    );

    for _ in 0..2 {
        let report = orchestrator
            .run(&orchestrator.select(&["--postgres"], false))
            .unwrap();
        let outcome = report.get("postgres").unwrap();
        assert!(outcome.success);
        assert_eq!(outcome.artifacts.len(), 2);
    }

    let remaining = fs::read_dir(&storage).unwrap().count();
    assert_eq!(remaining, 2);
}
