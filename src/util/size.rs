//! Byte accounting of backup storage.
//!
//! Sizes are kept as raw byte counts everywhere and only turned into
//! human-readable strings by [`format_size`] when a report is rendered.

use std::path::Path;

use walkdir::WalkDir;

const KIB: u64 = 1024;
const MIB: u64 = KIB * 1024;
const GIB: u64 = MIB * 1024;
const TIB: u64 = GIB * 1024;

/// Total size of all regular files below `path`.
///
/// Unreadable entries are skipped. Symlinks are not followed.
pub fn dir_size(path: &Path) -> u64 {
    WalkDir::new(path)
        .follow_links(false)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_file())
        .filter_map(|entry| entry.metadata().ok())
        .map(|metadata| metadata.len())
        .sum()
}

/// Size of a file or of a directory tree, [None] if `path` doesn't exist.
pub fn entry_size(path: &Path) -> Option<u64> {
    let metadata = path.symlink_metadata().ok()?;
    if metadata.is_dir() {
        Some(dir_size(path))
    } else {
        Some(metadata.len())
    }
}

/// Format a byte count using binary units, e.g. `12.30 MB`.
pub fn format_size(bytes: u64) -> String {
    let (unit, suffix) = match bytes {
        b if b >= TIB => (TIB, "TB"),
        b if b >= GIB => (GIB, "GB"),
        b if b >= MIB => (MIB, "MB"),
        b if b >= KIB => (KIB, "KB"),
        _ => return format!("{bytes} B"),
    };

    format!("{:.2} {suffix}", bytes as f64 / unit as f64)
}
