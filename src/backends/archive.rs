//! Compressed tar archives of directories.

use std::io;
use std::path::Path;
use std::process::Command;

use chrono::Local;

use crate::util::command::{Output, StepError, Steps};

/// Archive the directory `source` into a new gzip-compressed tarball `dest`.
///
/// The archive contains `source` under its own name. `tar` writes to stdout
/// and the stream is compressed while it is written. Returns the number of
/// uncompressed bytes.
pub fn tar_gz(steps: &Steps, source: &Path, dest: &Path) -> Result<u64, StepError> {
    let (Some(parent), Some(name)) = (source.parent(), source.file_name()) else {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("{} can't be archived", source.display()),
        )
        .into());
    };

    let mut tar = Command::new("tar");
    tar.arg("-cf").arg("-").arg("-C").arg(parent).arg(name);

    steps.pipe_to_file(&mut tar, dest, Output::Gzip)
}

/// Local timestamp for artifact names.
pub fn timestamp(format: &str) -> String {
    Local::now().format(format).to_string()
}
