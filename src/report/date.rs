//! Calendar dates embedded in artifact names.

use std::sync::LazyLock;

use chrono::NaiveDate;
use regex::Regex;

static DASHED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d{4})-(\d{2})-(\d{2})").expect("valid regex"));
static COMPACT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d{8}").expect("valid regex"));
static REVERSED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^backup_(\d{2})-(\d{2})-(\d{4})").expect("valid regex"));

/// Rendering of every inferred date.
pub const DATE_FORMAT: &str = "%d/%m/%Y";

/// Infer the calendar date of an artifact from its identifier.
///
/// Rules, first match wins:
///
/// 1. a `YYYY-MM-DD` substring, e.g. `nginx_backup_2024-06-01_10-00-00.tar.gz`
/// 2. an 8-digit `YYYYMMDD` substring, e.g. `mariadb_backup_20240601.tar.gz`
/// 3. a `backup_DD-MM-YYYY` directory name, e.g. `backup_01-06-2024_10-00-00`
///
/// A match which isn't a valid calendar date falls through to the next rule.
pub fn infer_date(identifier: &str) -> Option<NaiveDate> {
    dashed(identifier)
        .or_else(|| compact(identifier))
        .or_else(|| reversed(identifier))
}

/// The inferred date as `DD/MM/YYYY`, or the identifier itself.
pub fn date_label(identifier: &str) -> String {
    match infer_date(identifier) {
        Some(date) => date.format(DATE_FORMAT).to_string(),
        None => identifier.to_string(),
    }
}

fn dashed(identifier: &str) -> Option<NaiveDate> {
    DASHED
        .captures_iter(identifier)
        .find_map(|caps| ymd(&caps[1], &caps[2], &caps[3]))
}

fn compact(identifier: &str) -> Option<NaiveDate> {
    COMPACT
        .find_iter(identifier)
        .find_map(|m| NaiveDate::parse_from_str(m.as_str(), "%Y%m%d").ok())
}

fn reversed(identifier: &str) -> Option<NaiveDate> {
    let caps = REVERSED.captures(identifier)?;
    ymd(&caps[3], &caps[2], &caps[1])
}

fn ymd(year: &str, month: &str, day: &str) -> Option<NaiveDate> {
    NaiveDate::from_ymd_opt(year.parse().ok()?, month.parse().ok()?, day.parse().ok()?)
}
