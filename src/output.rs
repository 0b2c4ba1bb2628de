//! CLI output formatting for batch conversions.
//!
//! Every `format_*` function is pure and returns lines; the `print_*` wrappers
//! write them to stdout, except a failed item's `Error:` line, which goes to
//! stderr. Tests assert on the lines directly.
//!
//! # Output Format
//!
//! ```text
//! [1/2] Converting photo.jpg... Done
//!   Output: /out/photo.webp
//!   Size:   10.0KB → 8.0KB (-20.0%)
//!   Dims:   1920x1080 → 960x540
//! [2/2] Converting broken.png... Failed
//!   Error: failed to decode image: ...
//!
//! Summary: 1 converted, 1 failed
//! Total:   10.0KB → 8.0KB (-20.0%)
//! ```
//!
//! A single input drops the `[i/n]` prefix and the summary. Dry runs say
//! `DRY RUN` instead of `Converting` and `Would write` instead of `Output`.

use crate::process::{BatchEvent, BatchSummary};
use std::path::Path;

const KIB: u64 = 1024;
const MIB: u64 = 1024 * 1024;

/// Human-readable size with binary units: `512B`, `1.5KB`, `2.00MB`.
pub fn format_bytes(bytes: u64) -> String {
    if bytes < KIB {
        format!("{bytes}B")
    } else if bytes < MIB {
        format!("{:.1}KB", bytes as f64 / KIB as f64)
    } else {
        format!("{:.2}MB", bytes as f64 / MIB as f64)
    }
}

/// Size change from `original` to `converted`, as a signed percentage.
///
/// A reduction is shown with `-`, growth with `+`. Equal sizes give `-0.0%`.
pub fn format_percent(original: u64, converted: u64) -> String {
    if original == 0 {
        return "0%".to_string();
    }
    let pct = (original as f64 - converted as f64) / original as f64 * 100.0;
    if pct >= 0.0 {
        format!("-{pct:.1}%")
    } else {
        format!("+{:.1}%", pct.abs())
    }
}

fn size_change(original: u64, converted: u64) -> String {
    format!(
        "{} → {} ({})",
        format_bytes(original),
        format_bytes(converted),
        format_percent(original, converted)
    )
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|f| f.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

fn item_header(index: usize, total: usize, dry_run: bool, input: &Path, status: &str) -> String {
    let prefix = if total > 1 {
        format!("[{index}/{total}] ")
    } else {
        String::new()
    };
    let label = if dry_run { "DRY RUN" } else { "Converting" };
    format!("{prefix}{label} {}... {status}", display_name(input))
}

/// Standard-output lines for one finished batch item.
///
/// A failure's detail line comes from [`format_batch_error`] instead. Failed
/// events do not know whether the batch is a dry run; a failed dry-run item is
/// labelled `Converting` unless `dry_run` is passed.
pub fn format_batch_event(event: &BatchEvent, dry_run: bool) -> Vec<String> {
    match event {
        BatchEvent::Converted {
            index,
            total,
            file,
            dry_run,
        } => {
            let target = if *dry_run { "Would write" } else { "Output" };
            vec![
                item_header(*index, *total, *dry_run, &file.input_path, "Done"),
                format!("  {target}: {}", file.output_path.display()),
                format!(
                    "  Size:   {}",
                    size_change(file.original_size, file.converted_size)
                ),
                format!("  Dims:   {} → {}", file.original, file.converted),
            ]
        }
        BatchEvent::Failed {
            index,
            total,
            input,
            ..
        } => vec![item_header(*index, *total, dry_run, input, "Failed")],
    }
}

/// The `  Error: ...` detail line of a failed item, `None` for a success.
pub fn format_batch_error(event: &BatchEvent) -> Option<String> {
    match event {
        BatchEvent::Failed { error, .. } => Some(format!("  Error: {error}")),
        BatchEvent::Converted { .. } => None,
    }
}

/// Aggregate lines printed after a batch of more than one input.
pub fn format_batch_summary(summary: &BatchSummary, dry_run: bool) -> Vec<String> {
    let headline = if dry_run {
        format!(
            "Summary (dry run): {} files would be converted, {} failed",
            summary.success_count, summary.failure_count
        )
    } else {
        format!(
            "Summary: {} converted, {} failed",
            summary.success_count, summary.failure_count
        )
    };
    vec![
        String::new(),
        headline,
        format!(
            "Total:   {}",
            size_change(summary.total_original_bytes, summary.total_converted_bytes)
        ),
    ]
}

pub fn print_batch_event(event: &BatchEvent, dry_run: bool) {
    for line in format_batch_event(event, dry_run) {
        println!("{}", line);
    }
    if let Some(line) = format_batch_error(event) {
        eprintln!("{}", line);
    }
}

pub fn print_batch_summary(summary: &BatchSummary, dry_run: bool) {
    for line in format_batch_summary(summary, dry_run) {
        println!("{}", line);
    }
}
