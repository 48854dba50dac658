//! Rendering of run outcomes into webhook payloads.

use serde::Serialize;

use super::aggregate::AggregatedReport;
use super::date::date_label;
use crate::artifact::{ArtifactKind, BackupArtifact};
use crate::backends::ModuleDescriptor;
use crate::runner::RunOutcome;
use crate::util::size::format_size;

/// Embed color of failed modules.
pub const FAILURE_COLOR: u32 = 0xE74C3C;
/// Number of trailing log lines shown per module.
pub const LOG_TAIL: usize = 10;
/// Number of artifacts listed per module.
pub const MAX_LISTED_ARTIFACTS: usize = 10;

const MAX_CONTENT_CHARS: usize = 2000;
const MAX_DESCRIPTION_CHARS: usize = 4096;
const MAX_LOG_LINE_CHARS: usize = 200;
const DEFAULT_COLOR: u32 = 0x95A5A6;

/// Message handed to the webhook transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NotificationPayload {
    pub content: String,
    pub embeds: Vec<Embed>,
    pub username: String,
    /// Always empty.
    pub attachments: Vec<serde_json::Value>,
}

/// One section of the message, one per module.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Embed {
    pub title: String,
    pub description: String,
    pub color: u32,
    pub author: Author,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Author {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub icon_url: Option<String>,
}

/// Renders reports for a webhook posting under `username`.
#[derive(Debug, Clone)]
pub struct Formatter {
    username: String,
}

impl Formatter {
    pub fn new(username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
        }
    }

    /// Report of a run with a single module.
    pub fn single(&self, outcome: &RunOutcome, descriptor: &ModuleDescriptor) -> NotificationPayload {
        let content = title(&descriptor.display_name, outcome.success);
        self.payload(content, vec![embed(outcome, Some(descriptor))])
    }

    /// Report of a run with several modules.
    ///
    /// Sections follow the order of the report. Outcomes without a matching
    /// descriptor are still reported under their module name.
    pub fn aggregated(
        &self,
        report: &AggregatedReport,
        descriptors: &[&ModuleDescriptor],
    ) -> NotificationPayload {
        let embeds = report
            .outcomes()
            .iter()
            .map(|outcome| {
                let descriptor = descriptors
                    .iter()
                    .copied()
                    .find(|descriptor| descriptor.name == outcome.module);
                embed(outcome, descriptor)
            })
            .collect();

        let content = format!("Backup run finished: {}", report.summary_line());
        self.payload(content, embeds)
    }

    fn payload(&self, content: String, embeds: Vec<Embed>) -> NotificationPayload {
        NotificationPayload {
            content: truncate(&content, MAX_CONTENT_CHARS),
            embeds,
            username: self.username.clone(),
            attachments: Vec::new(),
        }
    }
}

fn title(display_name: &str, success: bool) -> String {
    let status = if success { "succeeded" } else { "failed" };
    format!("{display_name} backup {status}")
}

fn embed(outcome: &RunOutcome, descriptor: Option<&ModuleDescriptor>) -> Embed {
    let display_name = descriptor.map_or(outcome.module.as_str(), |d| d.display_name.as_str());
    let color = match (outcome.success, descriptor) {
        (false, _) => FAILURE_COLOR,
        (true, Some(descriptor)) => descriptor.color,
        (true, None) => DEFAULT_COLOR,
    };

    Embed {
        title: title(display_name, outcome.success),
        description: truncate(&description(outcome), MAX_DESCRIPTION_CHARS),
        color,
        author: Author {
            name: display_name.to_string(),
            icon_url: descriptor.and_then(|d| d.icon_url.clone()),
        },
    }
}

fn description(outcome: &RunOutcome) -> String {
    let mut sections = Vec::new();

    if let (Some(before), Some(after)) = (outcome.size_before, outcome.size_after) {
        sections.push(format!(
            "**Storage:** {} → {}",
            format_size(before),
            format_size(after)
        ));
    }

    let tail_start = outcome.log_lines.len().saturating_sub(LOG_TAIL);
    let tail: Vec<_> = outcome.log_lines[tail_start..]
        .iter()
        .map(|line| truncate(&line.replace("```", "'''"), MAX_LOG_LINE_CHARS))
        .collect();
    if !tail.is_empty() {
        sections.push(format!("**Log:**\n```\n{}\n```", tail.join("\n")));
    }

    let listing = artifact_listing(&outcome.artifacts);
    if listing.is_empty() {
        sections.push("**Backups:** none".to_string());
    } else {
        sections.push(format!(
            "**Backups ({}):**\n{}",
            outcome.artifacts.len(),
            listing.join("\n")
        ));
    }

    sections.join("\n\n")
}

/// Display lines of the newest artifacts, sorted by their text.
pub fn artifact_listing(artifacts: &[BackupArtifact]) -> Vec<String> {
    let mut lines: Vec<_> = artifacts
        .iter()
        .take(MAX_LISTED_ARTIFACTS)
        .map(artifact_line)
        .collect();
    lines.sort();
    lines
}

/// `<date> <kind> <size>`, e.g. `01/06/2024 📄 12.30 MB`.
fn artifact_line(artifact: &BackupArtifact) -> String {
    let marker = match artifact.kind {
        ArtifactKind::Directory => "📁",
        ArtifactKind::File => "📄",
    };
    let label = date_label(&artifact.identifier);

    match artifact.size_bytes {
        Some(bytes) => format!("{label} {marker} {}", format_size(bytes)),
        None => format!("{label} {marker}"),
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }

    let mut truncated: String = text.chars().take(max_chars.saturating_sub(1)).collect();
    truncated.push('…');
    truncated
}
