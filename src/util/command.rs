//! Execution of the external programs doing the actual backup work.
//!
//! Every step is a blocking child process. Stdout and stderr are drained on
//! reader threads while the child is supervised, so an optional per-step
//! timeout can kill a step that hangs without deadlocking on a full pipe.

use std::fs::File;
use std::io::{self, Read, Write};
use std::path::Path;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use derive_more::{Display, Error, From};
use flate2::write::GzEncoder;
use flate2::Compression;

const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Errors of a single external step.
#[derive(Debug, Display, Error, From)]
pub enum StepError {
    /// The program could not be started at all.
    #[display("Unable to run {program}: {source}")]
    Spawn {
        program: String,
        source: io::Error,
    },
    /// The program ran but exited unsuccessfully.
    #[display("{program} failed ({status}): {stderr}")]
    Failed {
        program: String,
        status: ExitStatus,
        stderr: String,
    },
    /// The program exceeded the configured step timeout and was killed.
    #[display("{program} timed out after {}s", after.as_secs())]
    TimedOut {
        program: String,
        after: Duration,
    },
    /// Reading the output of the program failed.
    #[from]
    #[display("I/O error while running step: {_0}")]
    Io(io::Error),
}

/// How the stdout of a piped step is written to its destination file.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Output {
    Plain,
    Gzip,
}

/// Runner of external steps, shared by all backup modules of one run.
#[derive(Debug, Clone, Default)]
pub struct Steps {
    timeout: Option<Duration>,
}

impl Steps {
    /// Create a runner; `timeout` of [None] waits for every step indefinitely.
    pub fn new(timeout: Option<Duration>) -> Self {
        Self { timeout }
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Run `command` and return its trimmed stdout.
    ///
    /// Non-empty stderr of a successful step is relayed as a warning.
    pub fn output(&self, command: &mut Command) -> Result<String, StepError> {
        let program = program_name(command);
        log::trace!(target: "steps", "Running: {program}");

        let mut child = spawn(command, &program)?;
        let stdout = child.stdout.take().map(|stdout| {
            drain(stdout, |mut reader| {
                let mut buf = Vec::new();
                reader.read_to_end(&mut buf)?;
                Ok(buf)
            })
        });
        let stderr = collect_stderr(&mut child);

        let status = self.supervise(&program, &mut child)?;
        let stdout = join(stdout)?.unwrap_or_default();
        let stderr = join(stderr)?.unwrap_or_default();
        check_status(program, status, stderr)?;

        Ok(String::from_utf8_lossy(&stdout).trim_end().into())
    }

    /// Run `command` and wait for it, discarding stdout.
    pub fn run(&self, command: &mut Command) -> Result<(), StepError> {
        self.output(command).map(|_| ())
    }

    /// Stream the stdout of `command` into a newly created file at `dest`.
    ///
    /// Returns the number of uncompressed bytes written. The destination
    /// must not exist yet; on failure a partially written file is removed.
    pub fn pipe_to_file(
        &self,
        command: &mut Command,
        dest: &Path,
        output: Output,
    ) -> Result<u64, StepError> {
        let program = program_name(command);
        log::trace!(target: "steps", "Running: {program} > {}", dest.display());

        let file = File::create_new(dest)?;
        let result = self.pipe_into(command, &program, file, output);
        if result.is_err() {
            if let Err(e) = std::fs::remove_file(dest) {
                log::warn!(target: "steps", "Removing incomplete {} failed: {e}", dest.display());
            }
        }

        result
    }

    fn pipe_into(
        &self,
        command: &mut Command,
        program: &str,
        file: File,
        output: Output,
    ) -> Result<u64, StepError> {
        let mut child = spawn(command, program)?;
        let stdout = child.stdout.take().map(|stdout| {
            drain(stdout, move |mut reader| match output {
                Output::Plain => {
                    let mut file = file;
                    let written = io::copy(&mut reader, &mut file)?;
                    file.flush()?;
                    Ok(written)
                }
                Output::Gzip => {
                    let mut encoder = GzEncoder::new(file, Compression::default());
                    let written = io::copy(&mut reader, &mut encoder)?;
                    encoder.finish()?;
                    Ok(written)
                }
            })
        });
        let stderr = collect_stderr(&mut child);

        let status = self.supervise(program, &mut child)?;
        let written = join(stdout)?.unwrap_or_default();
        let stderr = join(stderr)?.unwrap_or_default();
        check_status(program.to_string(), status, stderr)?;

        Ok(written)
    }

    fn supervise(&self, program: &str, child: &mut Child) -> Result<ExitStatus, StepError> {
        let Some(timeout) = self.timeout else {
            return Ok(child.wait()?);
        };

        let deadline = Instant::now() + timeout;
        loop {
            if let Some(status) = child.try_wait()? {
                return Ok(status);
            }
            if Instant::now() >= deadline {
                log::warn!(target: "steps", "Killing {program} after {}s", timeout.as_secs());
                if let Err(e) = child.kill() {
                    log::warn!(target: "steps", "Killing {program} failed: {e}");
                }
                let _ = child.wait();
                return Err(StepError::TimedOut {
                    program: program.to_string(),
                    after: timeout,
                });
            }
            thread::sleep(POLL_INTERVAL);
        }
    }
}

/// Program and first argument only, later arguments may carry credentials.
fn program_name(command: &Command) -> String {
    let program = command.get_program().to_string_lossy();
    match command.get_args().next() {
        Some(first) => format!("{program} {}", first.to_string_lossy()),
        None => program.into_owned(),
    }
}

fn spawn(command: &mut Command, program: &str) -> Result<Child, StepError> {
    command
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|source| StepError::Spawn {
            program: program.to_string(),
            source,
        })
}

fn drain<R, T, F>(reader: R, consume: F) -> JoinHandle<io::Result<T>>
where
    R: Read + Send + 'static,
    T: Send + 'static,
    F: FnOnce(R) -> io::Result<T> + Send + 'static,
{
    thread::spawn(move || consume(reader))
}

fn collect_stderr(child: &mut Child) -> Option<JoinHandle<io::Result<String>>> {
    child.stderr.take().map(|stderr| {
        drain(stderr, |mut reader| {
            let mut buf = String::new();
            reader.read_to_string(&mut buf)?;
            Ok(buf)
        })
    })
}

fn join<T>(handle: Option<JoinHandle<io::Result<T>>>) -> Result<Option<T>, StepError> {
    let Some(handle) = handle else {
        return Ok(None);
    };
    let value = handle
        .join()
        .map_err(|_| io::Error::other("output reader thread panicked"))??;
    Ok(Some(value))
}

fn check_status(program: String, status: ExitStatus, stderr: String) -> Result<(), StepError> {
    let stderr = stderr.trim().to_string();
    if !status.success() {
        return Err(StepError::Failed {
            program,
            status,
            stderr,
        });
    }

    // relay stderr
    if !stderr.is_empty() {
        log::warn!(target: "steps", "{program}: {stderr}");
    }

    Ok(())
}
