//! CLI output formatting for every command.
//!
//! # Information-First Display
//!
//! Output leads with what happened to the image (its dimensions, its size,
//! the blob it now lives in) and puts paths and hashes on indented context
//! lines underneath. Logs go to stderr through `tracing`; everything here is
//! the user-facing result on stdout.
//!
//! # Output Format
//!
//! ## Compress
//!
//! ```text
//! photo.png → photo.jpg
//!     Source: PNG 4000×2000, 2.4 MB
//!     Output: 1024×512, 180.2 KB (resized)
//! ```
//!
//! ## Put / Replace
//!
//! ```text
//! Stored 3f5a…c9e1
//!     Type: image/jpeg
//!     Size: 180.2 KB
//!
//! Replaced 9b21…07aa → 3f5a…c9e1
//!     Size: 180.2 KB
//!     Old blob: deleted
//! ```
//!
//! ## Batch
//!
//! ```text
//! 001 cover.png → cover.jpg (2.4 MB → 180.2 KB)
//! 002 notes.txt
//!     Skipped: unsupported file type
//! 003 trip/broken.jpg
//!     Failed: Decode failed: ...
//!
//! Compressed 1 image, skipped 1, failed 1 (2.4 MB → 180.2 KB)
//! ```
//!
//! # Architecture
//!
//! Each command has a `format_*` function (returns `Vec<String>`) for
//! testability and a `print_*` wrapper that writes to stdout. Format
//! functions are pure: no I/O, no side effects.

use crate::batch::{BatchReport, FileOutcome};
use crate::pipeline::{Compressed, ReplaceOutcome};
use crate::store::StoredObject;
use std::path::Path;

// ============================================================================
// Shared helpers
// ============================================================================

/// Format a 1-based positional index as 3-digit zero-padded.
fn format_index(pos: usize) -> String {
    format!("{:0>3}", pos)
}

/// Return indentation string: 4 spaces per depth level.
fn indent(depth: usize) -> String {
    "    ".repeat(depth)
}

/// Human-readable byte count with one decimal above 1 KB.
///
/// ```text
/// 512        → 512 B
/// 184_525    → 180.2 KB
/// 2_516_582  → 2.4 MB
/// ```
fn format_bytes(bytes: u64) -> String {
    const KB: f64 = 1024.0;
    const MB: f64 = KB * 1024.0;
    let b = bytes as f64;
    if b >= MB {
        format!("{:.1} MB", b / MB)
    } else if b >= KB {
        format!("{:.1} KB", b / KB)
    } else {
        format!("{} B", bytes)
    }
}

/// Plural-aware count: `1 image`, `3 images`.
fn count_noun(n: usize, noun: &str) -> String {
    if n == 1 {
        format!("{} {}", n, noun)
    } else {
        format!("{} {}s", n, noun)
    }
}

fn display_name(path: &Path) -> String {
    path.display().to_string()
}

// ============================================================================
// Compress
// ============================================================================

/// Format the result of a direct `compress` run.
pub fn format_compress_output(
    input: &Path,
    output: &Path,
    source_size: u64,
    result: &Compressed,
) -> Vec<String> {
    let (sw, sh) = result.source_dimensions;
    let resized = if result.resized() { " (resized)" } else { "" };
    vec![
        format!("{} → {}", display_name(input), display_name(output)),
        format!(
            "{}Source: {} {}×{}, {}",
            indent(1),
            result.source_format,
            sw,
            sh,
            format_bytes(source_size)
        ),
        format!(
            "{}Output: {}×{}, {}{}",
            indent(1),
            result.output.width,
            result.output.height,
            format_bytes(result.bytes.len() as u64),
            resized
        ),
    ]
}

pub fn print_compress_output(input: &Path, output: &Path, source_size: u64, result: &Compressed) {
    for line in format_compress_output(input, output, source_size, result) {
        println!("{}", line);
    }
}

// ============================================================================
// Put / Replace
// ============================================================================

/// Format a blob committed by `put`.
pub fn format_stored_output(stored: &StoredObject) -> Vec<String> {
    vec![
        format!("Stored {}", stored.blob),
        format!("{}Type: {}", indent(1), stored.metadata.content_type),
        format!("{}Size: {}", indent(1), format_bytes(stored.metadata.size)),
    ]
}

pub fn print_stored_output(stored: &StoredObject) {
    for line in format_stored_output(stored) {
        println!("{}", line);
    }
}

/// Format the outcome of `replace`.
pub fn format_replace_output(outcome: &ReplaceOutcome) -> Vec<String> {
    match outcome {
        ReplaceOutcome::Replaced {
            stored,
            old,
            old_deleted,
        } => {
            let old_status = if *old_deleted {
                "deleted"
            } else if *old == stored.blob {
                "unchanged (identical content)"
            } else {
                "kept (delete failed)"
            };
            vec![
                format!("Replaced {} → {}", old, stored.blob),
                format!("{}Size: {}", indent(1), format_bytes(stored.metadata.size)),
                format!("{}Old blob: {}", indent(1), old_status),
            ]
        }
        ReplaceOutcome::PassThrough { original } => vec![
            format!("Kept {}", original),
            format!("{}Type is not recompressible", indent(1)),
        ],
    }
}

pub fn print_replace_output(outcome: &ReplaceOutcome) {
    for line in format_replace_output(outcome) {
        println!("{}", line);
    }
}

// ============================================================================
// Batch
// ============================================================================

/// Format a batch report: one entry per file, then a summary line.
pub fn format_batch_output(report: &BatchReport, output_dir: &Path) -> Vec<String> {
    let mut lines = Vec::new();
    for (i, file) in report.files.iter().enumerate() {
        let index = format_index(i + 1);
        let source = display_name(&file.source);
        match &file.outcome {
            FileOutcome::Compressed {
                output,
                before,
                after,
            } => {
                let output = output.strip_prefix(output_dir).unwrap_or(output.as_path());
                lines.push(format!(
                    "{} {} → {} ({} → {})",
                    index,
                    source,
                    display_name(output),
                    format_bytes(*before),
                    format_bytes(*after)
                ));
            }
            FileOutcome::Skipped { reason } => {
                lines.push(format!("{} {}", index, source));
                lines.push(format!("{}Skipped: {}", indent(1), reason));
            }
            FileOutcome::Failed { message } => {
                lines.push(format!("{} {}", index, source));
                lines.push(format!("{}Failed: {}", indent(1), message));
            }
        }
    }

    if !lines.is_empty() {
        lines.push(String::new());
    }
    let (before, after) = report.totals();
    lines.push(format!(
        "Compressed {}, skipped {}, failed {} ({} → {})",
        count_noun(report.compressed(), "image"),
        report.skipped(),
        report.failed(),
        format_bytes(before),
        format_bytes(after)
    ));
    lines
}

pub fn print_batch_output(report: &BatchReport, output_dir: &Path) {
    for line in format_batch_output(report, output_dir) {
        println!("{}", line);
    }
}

// ============================================================================
// Tests
// ============================================================================
