use std::process::ExitCode;

use svc_backup_lib::backends;
use svc_backup_lib::cli::Cli;
use svc_backup_lib::config::Settings;
use svc_backup_lib::notify::Webhook;
use svc_backup_lib::orchestrator::Orchestrator;
use svc_backup_lib::report::Formatter;
use svc_backup_lib::util::command::Steps;

use clap::Parser;

fn main() -> ExitCode {
    let cli = Cli::parse();

    // init logger
    let mut env_logger = env_logger::builder();
    if let Some(level) = cli.verbose {
        env_logger.filter_level(level);
    }
    if let Err(e) = env_logger.try_init() {
        eprintln!("Initializing the logger failed: {e}");
    }

    let mut settings = match Settings::load_or_create(&cli.config) {
        Ok(settings) => settings,
        Err(e) => {
            log::error!("{e}");
            return ExitCode::FAILURE;
        }
    };
    if let Some(backup_root) = cli.backup_root {
        settings.backup_root = backup_root;
    }

    let orchestrator = Orchestrator::new(
        settings.backup_root.clone(),
        backends::from_settings(&settings),
        Steps::new(settings.step_timeout()),
    );

    let selection = orchestrator.select(cli.modules.as_slice(), cli.all);
    let report = match orchestrator.run(&selection) {
        Ok(report) => report,
        Err(e) => {
            log::error!(target: "orchestrator", "Backup run aborted: {e}");
            return ExitCode::FAILURE;
        }
    };

    let webhook = if cli.notification {
        Webhook::from_settings(&settings.notification)
    } else {
        log::debug!(target: "notify", "Notification disabled on the command line");
        Webhook::disabled()
    };
    let formatter = Formatter::new(&settings.notification.username);
    let payload = orchestrator.payload(&formatter, &report);
    if let Err(e) = webhook.deliver(&payload) {
        log::error!(target: "notify", "{e}");
    }

    ExitCode::SUCCESS
}
