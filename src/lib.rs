//! Library to back up self-hosted services and report on the outcome.
//!
//! Every service is a backup module implementing [`backends::Backup`]. The
//! [`orchestrator`] runs the selected modules one after another, each of them
//! through the [`runner`] which applies the retention policy of
//! [`util::retention`] after a successful backup. The outcomes are summarized
//! by [`report`] and posted to a webhook by [`notify`].

#![forbid(unsafe_code)]

pub mod artifact;
pub mod backends;
pub mod cli;
pub mod config;
pub mod notify;
pub mod orchestrator;
pub mod report;
pub mod runner;
pub mod util;
