//! Recovery copier: classify each leftover file and copy it out under the
//! guessed extension.
//!
//! Pipeline per file: classify -> derive destination name -> copy honoring
//! the overwrite policy -> record outcome. A failure is recorded against its
//! own file and the batch moves on.

#![allow(missing_docs)]

use std::ffi::OsString;
use std::fs::{self, File, OpenOptions};
use std::io::{self, ErrorKind};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel as channel;
use parking_lot::Mutex;
use serde::Serialize;

use crate::classify::classifier::{ClassificationResult, TypeClassifier};
use crate::core::config::RecoveryConfig;
use crate::core::errors::{Result, WcffError};
use crate::logger::activity::{ActivityEvent, ActivityLoggerHandle};

// ──────────────────── jobs ────────────────────

/// What to do when the destination file already exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OverwritePolicy {
    /// Leave the existing file alone and report a skip.
    Skip,
    /// Replace it.
    Replace,
}

impl From<bool> for OverwritePolicy {
    fn from(overwrite: bool) -> Self {
        if overwrite { Self::Replace } else { Self::Skip }
    }
}

/// One copy operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecoveryJob {
    pub source: PathBuf,
    pub destination: PathBuf,
    pub overwrite: OverwritePolicy,
}

impl RecoveryJob {
    /// Copy `source` to `destination`, returning the bytes written.
    ///
    /// With [`OverwritePolicy::Skip`] the destination is created exclusively,
    /// so an existing file is never opened for writing. With
    /// [`OverwritePolicy::Replace`] the copy lands in a sibling temp file that
    /// is renamed over the destination; a destination that resolves to the
    /// source itself is refused. A copy that fails midway leaves no partial
    /// output behind.
    pub fn execute(&self) -> Result<u64> {
        let mut input =
            File::open(&self.source).map_err(|source| WcffError::io(&self.source, source))?;

        match self.overwrite {
            OverwritePolicy::Skip => self.copy_exclusive(&mut input),
            OverwritePolicy::Replace => self.copy_replacing(&mut input),
        }
    }

    fn copy_exclusive(&self, input: &mut File) -> Result<u64> {
        let mut output = match OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&self.destination)
        {
            Ok(file) => file,
            Err(err) if err.kind() == ErrorKind::AlreadyExists => {
                return Err(WcffError::DestinationExists {
                    path: self.destination.clone(),
                });
            }
            Err(err) => return Err(WcffError::io(&self.destination, err)),
        };

        match io::copy(input, &mut output) {
            Ok(bytes) => Ok(bytes),
            Err(err) => {
                drop(output);
                let _ = fs::remove_file(&self.destination);
                Err(WcffError::io(&self.source, err))
            }
        }
    }

    fn copy_replacing(&self, input: &mut File) -> Result<u64> {
        if is_same_file(&self.source, &self.destination) {
            return Err(WcffError::DestinationIsSource {
                path: self.destination.clone(),
            });
        }

        let tmp_path = temp_path(&self.destination);
        let mut output = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&tmp_path)
            .map_err(|err| WcffError::io(&tmp_path, err))?;

        let copied = io::copy(input, &mut output);
        drop(output);
        match copied.and_then(|bytes| fs::rename(&tmp_path, &self.destination).map(|()| bytes)) {
            Ok(bytes) => Ok(bytes),
            Err(err) => {
                let _ = fs::remove_file(&tmp_path);
                Err(WcffError::io(&self.destination, err))
            }
        }
    }
}

/// Both paths exist and resolve to the same file.
fn is_same_file(a: &Path, b: &Path) -> bool {
    match (fs::canonicalize(a), fs::canonicalize(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

/// Hidden sibling of `destination` used while a replacement is written.
fn temp_path(destination: &Path) -> PathBuf {
    let mut name = OsString::from(".");
    name.push(destination.file_name().unwrap_or_default());
    name.push(".wcff-tmp");
    destination.with_file_name(name)
}

/// Source file name with its last extension replaced by `extension`.
///
/// `extension` carries its leading dot. A name without an extension gets
/// one appended, except a dot-file like `.WNCRYT`, whose whole name is the
/// extension and is replaced (`.pdf`).
pub fn destination_name(source: &Path, extension: &str) -> Result<OsString> {
    let name = source
        .file_name()
        .map(Path::new)
        .ok_or_else(|| WcffError::InvalidSourceName {
            path: source.to_path_buf(),
        })?;
    let extension = extension.trim_start_matches('.');

    if name.extension().is_none() && name.as_os_str().as_encoded_bytes().first() == Some(&b'.') {
        return Ok(OsString::from(format!(".{extension}")));
    }
    Ok(name.with_extension(extension).into_os_string())
}

// ──────────────────── report types ────────────────────

/// Summary of one recovery batch.
#[derive(Debug, Clone, Default)]
pub struct RecoveryReport {
    pub copied: usize,
    pub skipped_existing: usize,
    pub failed: usize,
    pub bytes_copied: u64,
    pub duration: Duration,
    pub errors: Vec<RecoveryError>,
}

impl RecoveryReport {
    #[must_use]
    pub fn processed(&self) -> usize {
        self.copied + self.skipped_existing + self.failed
    }
}

/// A single per-file failure.
#[derive(Debug, Clone, Serialize)]
pub struct RecoveryError {
    pub path: PathBuf,
    pub error: String,
    pub error_code: String,
    pub recoverable: bool,
}

/// What happened to one source file.
#[derive(Debug)]
pub enum FileOutcome {
    Copied {
        destination: PathBuf,
        classification: ClassificationResult,
        bytes: u64,
        elapsed: Duration,
    },
    SkippedExisting {
        destination: PathBuf,
    },
    Failed(WcffError),
}

// ──────────────────── copier ────────────────────

/// Parallel recovery over a list or stream of source paths.
#[derive(Debug, Clone)]
pub struct RecoveryCopier {
    classifier: TypeClassifier,
    parallelism: usize,
    create_destination: bool,
    logger: Option<ActivityLoggerHandle>,
}

impl RecoveryCopier {
    /// Worker count defaults to the available parallelism.
    #[must_use]
    pub fn new(classifier: TypeClassifier) -> Self {
        let defaults = RecoveryConfig::default();
        Self {
            classifier,
            parallelism: defaults.parallelism,
            create_destination: defaults.create_destination,
            logger: None,
        }
    }

    #[must_use]
    pub fn from_config(classifier: TypeClassifier, config: &RecoveryConfig) -> Self {
        Self::new(classifier)
            .with_parallelism(config.parallelism)
            .with_create_destination(config.create_destination)
    }

    #[must_use]
    pub fn with_parallelism(mut self, parallelism: usize) -> Self {
        self.parallelism = parallelism.max(1);
        self
    }

    #[must_use]
    pub fn with_create_destination(mut self, create: bool) -> Self {
        self.create_destination = create;
        self
    }

    #[must_use]
    pub fn with_logger(mut self, logger: ActivityLoggerHandle) -> Self {
        self.logger = Some(logger);
        self
    }

    #[must_use]
    pub fn classifier(&self) -> &TypeClassifier {
        &self.classifier
    }

    /// Recover every path in `sources` into `destination`.
    pub fn recover(&self, destination: &Path, overwrite: bool, sources: &[PathBuf]) -> RecoveryReport {
        self.recover_stream(destination, overwrite, sources.iter().cloned())
    }

    /// Recover paths as they arrive, e.g. straight from a
    /// [`Discovery`](crate::scanner::walker::Discovery) stream.
    ///
    /// The iterator is drained on the calling thread and fanned out to the
    /// worker pool; output order is unspecified.
    pub fn recover_stream<I>(&self, destination: &Path, overwrite: bool, sources: I) -> RecoveryReport
    where
        I: IntoIterator<Item = PathBuf>,
    {
        let start = Instant::now();
        let policy = OverwritePolicy::from(overwrite);
        let report = Mutex::new(RecoveryReport::default());

        if self.create_destination
            && let Err(err) = fs::create_dir_all(destination)
        {
            let err = WcffError::io(destination, err);
            self.log_event(ActivityEvent::Error {
                code: err.code().to_string(),
                message: err.to_string(),
            });
        }

        let (tx, rx) = channel::bounded::<PathBuf>(self.parallelism * 4);
        let mut sources = sources.into_iter();

        thread::scope(|scope| {
            let mut workers = 0usize;
            for index in 0..self.parallelism {
                let rx = rx.clone();
                let report = &report;
                let spawned = thread::Builder::new()
                    .name(format!("wcff-recover-{index}"))
                    .spawn_scoped(scope, move || {
                        for source in rx {
                            let outcome = self.recover_one(destination, policy, &source);
                            self.record(report, &source, outcome);
                        }
                    });
                if spawned.is_ok() {
                    workers += 1;
                }
            }
            drop(rx);

            if workers == 0 {
                return;
            }
            for source in sources.by_ref() {
                if tx.send(source).is_err() {
                    break;
                }
            }
            drop(tx);
        });

        // No worker could be started: fall back to this thread.
        for source in sources {
            let outcome = self.recover_one(destination, policy, &source);
            self.record(&report, &source, outcome);
        }

        let mut report = report.into_inner();
        report.duration = start.elapsed();
        self.log_event(ActivityEvent::RecoveryCompleted {
            copied: report.copied,
            skipped: report.skipped_existing,
            failed: report.failed,
            duration_ms: millis(report.duration),
        });
        report
    }

    /// Classify and copy one file.
    pub fn recover_one(
        &self,
        destination_dir: &Path,
        overwrite: OverwritePolicy,
        source: &Path,
    ) -> FileOutcome {
        let started = Instant::now();
        let classification = self.classifier.classify(source);
        let name = match destination_name(source, &classification.extension) {
            Ok(name) => name,
            Err(err) => return FileOutcome::Failed(err),
        };

        let job = RecoveryJob {
            source: source.to_path_buf(),
            destination: destination_dir.join(name),
            overwrite,
        };
        match job.execute() {
            Ok(bytes) => FileOutcome::Copied {
                destination: job.destination,
                classification,
                bytes,
                elapsed: started.elapsed(),
            },
            Err(WcffError::DestinationExists { path }) => {
                FileOutcome::SkippedExisting { destination: path }
            }
            Err(err) => FileOutcome::Failed(err),
        }
    }

    fn record(&self, report: &Mutex<RecoveryReport>, source: &Path, outcome: FileOutcome) {
        match outcome {
            FileOutcome::Copied {
                destination,
                classification,
                bytes,
                elapsed,
            } => {
                {
                    let mut report = report.lock();
                    report.copied += 1;
                    report.bytes_copied += bytes;
                }
                self.log_event(ActivityEvent::FileRecovered {
                    source: source.to_path_buf(),
                    destination,
                    extension: classification.extension,
                    source_kind: classification.source.to_string(),
                    size_bytes: bytes,
                    duration_ms: millis(elapsed),
                });
            }
            FileOutcome::SkippedExisting { destination } => {
                report.lock().skipped_existing += 1;
                self.log_event(ActivityEvent::FileSkipped {
                    source: source.to_path_buf(),
                    destination,
                    reason: "destination exists".to_string(),
                });
            }
            FileOutcome::Failed(err) => {
                let error = RecoveryError {
                    path: source.to_path_buf(),
                    error: err.to_string(),
                    error_code: err.code().to_string(),
                    recoverable: err.is_retryable(),
                };
                self.log_event(ActivityEvent::RecoveryFailed {
                    path: source.to_path_buf(),
                    error_code: error.error_code.clone(),
                    error_message: error.error.clone(),
                });
                let mut report = report.lock();
                report.failed += 1;
                report.errors.push(error);
            }
        }
    }

    fn log_event(&self, event: ActivityEvent) {
        if let Some(logger) = &self.logger {
            logger.send(event);
        }
    }
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
