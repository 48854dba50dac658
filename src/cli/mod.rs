use std::path::PathBuf;

use clap::{ArgAction, Parser};
use log::LevelFilter;

/// Back up self-hosted services and report the outcome to a webhook.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Verbosity of the command output.
    #[arg(long)]
    pub verbose: Option<LevelFilter>,

    /// Path of the config file. Created with defaults if it doesn't exist.
    #[arg(
        long,
        short = 'c',
        env = "SVC_BACKUP_CONFIG",
        default_value = "/etc/svc-backup/config.toml"
    )]
    pub config: PathBuf,

    #[arg(long, short = 'r')]
    /// Folder for the backups of all modules. Overrides the config file.
    pub backup_root: Option<PathBuf>,

    /// Don't send the report to the configured webhook.
    #[arg(
        long = "no-notification",
        action = ArgAction::SetFalse
    )]
    pub notification: bool,

    /// Back up every module. (Default without module names)
    #[arg(long)]
    pub all: bool,

    /// Modules to back up, e.g. `mariadb nginx`. A leading `--` is accepted.
    #[arg(
        value_name = "MODULES",
        trailing_var_arg = true,
        allow_hyphen_values = true
    )]
    pub modules: Vec<String>,
}
