//! Selection and sequential execution of backup modules.

use std::fs;
use std::io;
use std::path::PathBuf;

use derive_more::{Display, Error};

use crate::backends::{Backup, ModuleDescriptor};
use crate::report::{AggregatedReport, Formatter, NotificationPayload};
use crate::util::command::Steps;

/// Errors aborting the whole run.
#[derive(Debug, Display, Error)]
pub enum OrchestratorError {
    /// The backup root directory can't be created.
    #[display("Unable to create backup root {}: {source}", path.display())]
    BackupRoot { path: PathBuf, source: io::Error },
    /// None of the requested modules is known.
    #[display("No known backup module selected")]
    NothingSelected,
}

/// Modules chosen for one run, in declared order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Selection {
    /// Indices into the orchestrator's modules.
    indices: Vec<usize>,
    /// Requested names that matched no module.
    pub unknown: Vec<String>,
}

impl Selection {
    pub fn len(&self) -> usize {
        self.indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }
}

/// Runs backup modules one after another and builds the report.
pub struct Orchestrator {
    backup_root: PathBuf,
    modules: Vec<Box<dyn Backup>>,
    steps: Steps,
}

impl Orchestrator {
    /// `modules` must be in declared order, data stores first.
    pub fn new(backup_root: PathBuf, modules: Vec<Box<dyn Backup>>, steps: Steps) -> Self {
        Self {
            backup_root,
            modules,
            steps,
        }
    }

    pub fn descriptors(&self) -> Vec<&ModuleDescriptor> {
        self.modules.iter().map(|module| module.descriptor()).collect()
    }

    /// Resolve the requested module names.
    ///
    /// `all`, the token `all` or an empty request select every module.
    /// Names are matched case-insensitively and may carry a leading `-` or
    /// `--`. Unknown names are logged and skipped.
    pub fn select<S: AsRef<str>>(&self, requested: &[S], all: bool) -> Selection {
        let tokens: Vec<String> = requested
            .iter()
            .map(|token| token.as_ref().trim().trim_start_matches('-').to_lowercase())
            .filter(|token| !token.is_empty())
            .collect();

        if all || tokens.is_empty() || tokens.iter().any(|token| token == "all") {
            let unknown = tokens
                .into_iter()
                .filter(|token| token != "all" && self.position(token).is_none())
                .collect();
            return self.selection((0..self.modules.len()).collect(), unknown);
        }

        let mut indices = Vec::new();
        let mut unknown = Vec::new();
        for token in tokens {
            match self.position(&token) {
                Some(index) => indices.push(index),
                None => unknown.push(token),
            }
        }
        indices.sort_unstable();
        indices.dedup();

        self.selection(indices, unknown)
    }

    fn selection(&self, indices: Vec<usize>, mut unknown: Vec<String>) -> Selection {
        unknown.dedup();
        for token in &unknown {
            log::warn!(target: "orchestrator", "Unknown backup module '{token}', skipping");
        }

        Selection { indices, unknown }
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.modules
            .iter()
            .position(|module| module.descriptor().name.eq_ignore_ascii_case(name))
    }

    /// Run the selected modules one at a time.
    ///
    /// Failing modules end up in the report; only an unusable backup root or
    /// an empty selection abort the run.
    pub fn run(&self, selection: &Selection) -> Result<AggregatedReport, OrchestratorError> {
        if selection.is_empty() {
            return Err(OrchestratorError::NothingSelected);
        }

        fs::create_dir_all(&self.backup_root).map_err(|source| OrchestratorError::BackupRoot {
            path: self.backup_root.clone(),
            source,
        })?;

        let mut report = AggregatedReport::new();
        for &index in &selection.indices {
            let module = &self.modules[index];
            let name = &module.descriptor().name;
            log::info!(target: "orchestrator", "Running backup module {name}");

            let outcome = module.run(&self.steps);
            if outcome.success {
                log::info!(target: "orchestrator", "Backup module {name} succeeded");
            } else {
                log::error!(
                    target: "orchestrator",
                    "Backup module {name} failed: {}",
                    outcome.error.as_deref().unwrap_or("unknown error")
                );
            }
            report.push(outcome);
        }

        log::info!(target: "orchestrator", "Backup run finished: {}", report.summary_line());
        Ok(report)
    }

    /// The single-module report for exactly one outcome, the aggregated
    /// report otherwise.
    pub fn payload(&self, formatter: &Formatter, report: &AggregatedReport) -> NotificationPayload {
        let descriptors = self.descriptors();
        if let [outcome] = report.outcomes() {
            if let Some(descriptor) = descriptors.iter().find(|d| d.name == outcome.module) {
                return formatter.single(outcome, descriptor);
            }
        }

        formatter.aggregated(report, &descriptors)
    }
}
