//! Directory-wide recompression.
//!
//! Walks a source tree, recompresses every file whose extension maps to an
//! accepted mime type, and writes `<stem>.jpg` into the same relative
//! location under the output directory. Files are independent: one failure
//! is recorded in the report and never stops the rest.
//!
//! ```text
//! photos/                      out/
//! ├── cover.png        →       ├── cover.jpg
//! ├── notes.txt                │   (skipped: unsupported)
//! └── trip/                    └── trip/
//!     └── 001.jpeg     →           └── 001.jpg
//! ```

use crate::imaging::{CancelToken, CompressionParams, mime_for_extension};
use crate::pipeline::{CompressError, Optimizer};
use rayon::prelude::*;
use serde::Serialize;
use std::collections::HashSet;
use std::fs::{self, File};
use std::io::{BufReader, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::NamedTempFile;
use thiserror::Error;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

#[derive(Error, Debug)]
pub enum BatchError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Directory walk failed: {0}")]
    Walk(#[from] walkdir::Error),
    #[error("Thread pool error: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
    #[error("Source is not a directory: {0}")]
    NotADirectory(PathBuf),
}

/// Why one file in a batch failed. Recorded in the report, never fatal.
#[derive(Error, Debug)]
pub enum FileError {
    #[error("Failed to read source: {0}")]
    Read(#[source] std::io::Error),
    #[error(transparent)]
    Compress(#[from] CompressError),
    #[error("Failed to write output: {0}")]
    Write(#[source] std::io::Error),
}

/// What happened to one source file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum FileOutcome {
    Compressed {
        output: PathBuf,
        before: u64,
        after: u64,
    },
    Skipped {
        reason: String,
    },
    Failed {
        message: String,
    },
}

/// Per-file result, keyed by the path relative to the source directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileReport {
    pub source: PathBuf,
    pub outcome: FileOutcome,
}

/// Results of a batch run, sorted by source path.
#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchReport {
    pub files: Vec<FileReport>,
}

impl BatchReport {
    pub fn compressed(&self) -> usize {
        self.count(|o| matches!(o, FileOutcome::Compressed { .. }))
    }

    pub fn skipped(&self) -> usize {
        self.count(|o| matches!(o, FileOutcome::Skipped { .. }))
    }

    pub fn failed(&self) -> usize {
        self.count(|o| matches!(o, FileOutcome::Failed { .. }))
    }

    /// Total `(before, after)` bytes over compressed files.
    pub fn totals(&self) -> (u64, u64) {
        self.files
            .iter()
            .filter_map(|f| match f.outcome {
                FileOutcome::Compressed { before, after, .. } => Some((before, after)),
                _ => None,
            })
            .fold((0, 0), |(b, a), (before, after)| (b + before, a + after))
    }

    fn count(&self, pred: impl Fn(&FileOutcome) -> bool) -> usize {
        self.files.iter().filter(|f| pred(&f.outcome)).count()
    }
}

/// A file scheduled for compression.
#[derive(Debug)]
struct Job {
    relative: PathBuf,
    mime_type: &'static str,
    output: PathBuf,
}

/// Recompress every supported image under `source_dir` into `output_dir`.
///
/// `params.mime_type` is ignored; each file's type comes from its
/// extension. `threads` sizes a dedicated rayon pool. `timeout` bounds each
/// file separately.
pub fn compress_tree(
    optimizer: &Optimizer,
    source_dir: &Path,
    output_dir: &Path,
    params: &CompressionParams,
    threads: usize,
    timeout: Option<Duration>,
) -> Result<BatchReport, BatchError> {
    if !source_dir.is_dir() {
        return Err(BatchError::NotADirectory(source_dir.to_path_buf()));
    }
    let (jobs, mut files) = collect_jobs(source_dir, output_dir)?;
    info!(
        source = %source_dir.display(),
        images = jobs.len(),
        skipped = files.len(),
        threads,
        "starting batch"
    );

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .build()?;
    let compressed: Vec<FileReport> = pool.install(|| {
        jobs.par_iter()
            .map(|job| {
                let cancel = match timeout {
                    Some(limit) => CancelToken::with_timeout(limit),
                    None => CancelToken::new(),
                };
                let outcome = run_job(optimizer, source_dir, job, params, &cancel);
                if let FileOutcome::Failed { message } = &outcome {
                    warn!(file = %job.relative.display(), error = %message, "batch item failed");
                }
                FileReport {
                    source: job.relative.clone(),
                    outcome,
                }
            })
            .collect()
    });

    files.extend(compressed);
    files.sort_by(|a, b| a.source.cmp(&b.source));
    let report = BatchReport { files };
    info!(
        compressed = report.compressed(),
        skipped = report.skipped(),
        failed = report.failed(),
        "batch finished"
    );
    Ok(report)
}

/// Walk the source tree. Returns the jobs to run plus reports for files
/// that are skipped up front.
fn collect_jobs(
    source_dir: &Path,
    output_dir: &Path,
) -> Result<(Vec<Job>, Vec<FileReport>), BatchError> {
    let mut jobs = Vec::new();
    let mut skipped = Vec::new();
    let mut claimed: HashSet<PathBuf> = HashSet::new();

    let walker = WalkDir::new(source_dir)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| e.depth() == 0 || !is_hidden(e.file_name()));
    for entry in walker {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        let relative = entry
            .path()
            .strip_prefix(source_dir)
            .unwrap_or(entry.path())
            .to_path_buf();

        let mime_type = relative
            .extension()
            .and_then(|e| e.to_str())
            .and_then(mime_for_extension);
        let Some(mime_type) = mime_type else {
            debug!(file = %relative.display(), "skipping unsupported file");
            skipped.push(FileReport {
                source: relative,
                outcome: FileOutcome::Skipped {
                    reason: "unsupported file type".into(),
                },
            });
            continue;
        };

        let output = output_dir.join(relative.with_extension("jpg"));
        if !claimed.insert(output.clone()) {
            skipped.push(FileReport {
                source: relative,
                outcome: FileOutcome::Skipped {
                    reason: format!("output {} already claimed", output.display()),
                },
            });
            continue;
        }
        jobs.push(Job {
            relative,
            mime_type,
            output,
        });
    }
    Ok((jobs, skipped))
}

fn is_hidden(name: &std::ffi::OsStr) -> bool {
    name.to_str().is_some_and(|s| s.starts_with('.'))
}

fn run_job(
    optimizer: &Optimizer,
    source_dir: &Path,
    job: &Job,
    params: &CompressionParams,
    cancel: &CancelToken,
) -> FileOutcome {
    match compress_file(optimizer, source_dir, job, params, cancel) {
        Ok((before, after)) => FileOutcome::Compressed {
            output: job.output.clone(),
            before,
            after,
        },
        Err(e) => FileOutcome::Failed {
            message: e.to_string(),
        },
    }
}

fn compress_file(
    optimizer: &Optimizer,
    source_dir: &Path,
    job: &Job,
    params: &CompressionParams,
    cancel: &CancelToken,
) -> Result<(u64, u64), FileError> {
    let source_path = source_dir.join(&job.relative);
    let file = File::open(&source_path).map_err(FileError::Read)?;
    let before = file.metadata().map_err(FileError::Read)?.len();

    let file_params = CompressionParams {
        mime_type: job.mime_type.to_string(),
        ..params.clone()
    };
    let compressed = optimizer.compress(BufReader::new(file), &file_params, cancel)?;

    write_atomically(&job.output, &compressed.bytes).map_err(FileError::Write)?;
    debug!(
        file = %job.relative.display(),
        before,
        after = compressed.bytes.len(),
        "compressed file"
    );
    Ok((before, compressed.bytes.len() as u64))
}

/// Write `bytes` to `path` through a temp file in the same directory.
fn write_atomically(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let parent = path.parent().unwrap_or(Path::new("."));
    fs::create_dir_all(parent)?;
    let mut tmp = NamedTempFile::new_in(parent)?;
    tmp.write_all(bytes)?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}
