//! Summaries of a backup run.
//!
//! [aggregate] collects the [RunOutcome](crate::runner::RunOutcome)s of one
//! run, [Formatter] renders them into the [NotificationPayload] posted by
//! [notify](crate::notify).

pub mod aggregate;
pub mod date;
pub mod format;

pub use aggregate::{aggregate, AggregatedReport};
pub use format::{Author, Embed, Formatter, NotificationPayload};
