//! Batch conversion.
//!
//! Converts a list of files one after another, in input order. A failing item
//! is recorded and the batch moves on; only an invalid output target for the
//! batch as a whole stops it before any input is read.
//!
//! ## Per-item pipeline
//!
//! ```text
//! resolve output path → read bytes → detect format → convert → mkdir -p → write
//! ```
//!
//! The format is sniffed from the file content, falling back to the extension.
//! Nothing is written unless the encode succeeded, and nothing at all in a dry
//! run.
//!
//! ## Progress
//!
//! When given a channel, one [`BatchEvent`] is sent per finished item. The CLI
//! prints them from a separate thread as they arrive; see
//! [`output::format_batch_event`](crate::output::format_batch_event).

use crate::imaging::{Codec, ConvertError, ConvertOptions, Dimensions, convert_image};
use crate::naming::{PathError, is_webp_target, resolve_output_path};
use crate::types::SourceFormat;
use std::path::{Path, PathBuf};
use std::sync::mpsc::Sender;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BatchError {
    /// A `.webp` output target names a single file; carries the input count.
    #[error("output must be a directory when converting multiple files")]
    AmbiguousOutput(usize),
}

/// Why one item of a batch failed.
#[derive(Error, Debug)]
pub enum ItemError {
    #[error("{}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Path(#[from] PathError),
    #[error("unsupported image format: {}", .0.display())]
    UnsupportedFormat(PathBuf),
    #[error(transparent)]
    Convert(#[from] ConvertError),
}

/// Options for a batch run.
#[derive(Debug, Clone, Default)]
pub struct BatchOptions {
    pub convert: ConvertOptions,
    /// `.webp` file (single input only) or directory. `None` writes next to each input.
    pub output: Option<PathBuf>,
    /// Run the full pipeline but write nothing.
    pub dry_run: bool,
}

/// A successfully converted (or, in a dry run, convertible) file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConvertedFile {
    pub input_path: PathBuf,
    pub output_path: PathBuf,
    pub original_size: u64,
    pub converted_size: u64,
    pub original: Dimensions,
    pub converted: Dimensions,
}

#[derive(Debug)]
pub enum ItemOutcome {
    Converted(ConvertedFile),
    Failed { input: PathBuf, error: ItemError },
}

impl ItemOutcome {
    pub fn input(&self) -> &Path {
        match self {
            Self::Converted(file) => &file.input_path,
            Self::Failed { input, .. } => input,
        }
    }
}

/// Aggregate result of a batch. Totals count successful items only.
#[derive(Debug, Default)]
pub struct BatchSummary {
    pub success_count: usize,
    pub failure_count: usize,
    pub total_original_bytes: u64,
    pub total_converted_bytes: u64,
    pub outcomes: Vec<ItemOutcome>,
}

impl BatchSummary {
    pub fn total(&self) -> usize {
        self.success_count + self.failure_count
    }

    fn record(&mut self, outcome: ItemOutcome) {
        match &outcome {
            ItemOutcome::Converted(file) => {
                self.success_count += 1;
                self.total_original_bytes += file.original_size;
                self.total_converted_bytes += file.converted_size;
            }
            ItemOutcome::Failed { .. } => self.failure_count += 1,
        }
        self.outcomes.push(outcome);
    }
}

/// Progress event sent once per finished item.
#[derive(Debug, Clone)]
pub enum BatchEvent {
    Converted {
        /// 1-based position in the batch.
        index: usize,
        total: usize,
        file: ConvertedFile,
        dry_run: bool,
    },
    Failed {
        index: usize,
        total: usize,
        input: PathBuf,
        error: String,
    },
}

/// Convert every input in order, collecting per-item outcomes.
pub fn convert_batch<C: Codec>(
    codec: &C,
    inputs: &[PathBuf],
    options: &BatchOptions,
    events: Option<Sender<BatchEvent>>,
) -> Result<BatchSummary, BatchError> {
    if inputs.len() > 1 && options.output.as_deref().is_some_and(is_webp_target) {
        return Err(BatchError::AmbiguousOutput(inputs.len()));
    }

    let total = inputs.len();
    let mut summary = BatchSummary::default();

    for (i, input) in inputs.iter().enumerate() {
        let index = i + 1;
        let outcome = match convert_item(codec, input, options) {
            Ok(file) => {
                log::debug!(
                    "converted {} -> {}",
                    file.input_path.display(),
                    file.output_path.display()
                );
                ItemOutcome::Converted(file)
            }
            Err(error) => {
                log::debug!("failed to convert {}: {error}", input.display());
                ItemOutcome::Failed {
                    input: input.clone(),
                    error,
                }
            }
        };

        if let Some(tx) = &events {
            let event = match &outcome {
                ItemOutcome::Converted(file) => BatchEvent::Converted {
                    index,
                    total,
                    file: file.clone(),
                    dry_run: options.dry_run,
                },
                ItemOutcome::Failed { input, error } => BatchEvent::Failed {
                    index,
                    total,
                    input: input.clone(),
                    error: error.to_string(),
                },
            };
            // A dropped receiver only means nobody is listening.
            tx.send(event).ok();
        }

        summary.record(outcome);
    }

    Ok(summary)
}

fn convert_item<C: Codec>(
    codec: &C,
    input: &Path,
    options: &BatchOptions,
) -> Result<ConvertedFile, ItemError> {
    let output_path = resolve_output_path(input, options.output.as_deref())?;

    let bytes = std::fs::read(input).map_err(|source| ItemError::Io {
        path: input.to_path_buf(),
        source,
    })?;

    let format = SourceFormat::sniff(&bytes)
        .or_else(|| SourceFormat::from_path(input))
        .ok_or_else(|| ItemError::UnsupportedFormat(input.to_path_buf()))?;

    let conversion = convert_image(codec, &bytes, format, &options.convert, None)?;

    if !options.dry_run {
        write_output(&output_path, &conversion.encoded)?;
    }

    Ok(ConvertedFile {
        input_path: input.to_path_buf(),
        output_path,
        original_size: conversion.original_size,
        converted_size: conversion.converted_size,
        original: conversion.original,
        converted: conversion.converted,
    })
}

fn write_output(path: &Path, bytes: &[u8]) -> Result<(), ItemError> {
    let io_err = |source| ItemError::Io {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(io_err)?;
    }
    std::fs::write(path, bytes).map_err(io_err)
}
