//! # webpify
//!
//! Converts raster images (JPEG, PNG, GIF, BMP, TIFF, AVIF, WebP) to WebP, with
//! optional resizing and a choice of lossy quality or lossless encoding.
//!
//! # Architecture
//!
//! Every surface runs the same single-image pipeline:
//!
//! ```text
//! bytes ─▶ decode ─▶ target size (scale %, max edge) ─▶ resize if changed ─▶ encode ─▶ WebP
//! ```
//!
//! Three surfaces drive it:
//!
//! - **CLI** (`webpify convert`): resolves files, directories and globs, then
//!   converts them one by one, writing each result and printing a report.
//! - **HTTP** (`webpify serve`): `POST /api/convert` takes a multipart upload
//!   and answers with the WebP bytes and dimension headers.
//! - **Interactive session** ([`session`]): debounced conversions where a newer
//!   request supersedes the pending one.
//!
//! Pixel work sits behind the [`imaging::Codec`] trait. The pipeline, the
//! batch runner and the HTTP service are generic over it and tested against a
//! recording mock; the production backends are only exercised where real
//! image bytes matter.
//!
//! # Module Map
//!
//! | Module | Role |
//! |--------|------|
//! | [`imaging`] | Dimension policy, codec trait and backends, [`imaging::convert_image`], init gate |
//! | [`naming`] | Output path resolution (`photo.jpg` → `photo.webp`, directory targets) |
//! | [`scan`] | Expands CLI inputs (files, directories, globs) into an ordered file list |
//! | [`process`] | Sequential batch conversion with per-item outcomes and progress events |
//! | [`output`] | Byte/percent formatting and the CLI batch report |
//! | [`config`] | `webpify.toml` loading, validation, and merging over stock defaults |
//! | [`server`] | The HTTP conversion service |
//! | [`session`] | Debounced, cancellable conversions for interactive callers |
//! | [`types`] | [`types::SourceFormat`] and supported extensions |
//!
//! # Design Decisions
//!
//! ## Clamp, Don't Reject
//!
//! [`imaging::Quality`] and [`imaging::ScalePercent`] clamp on construction.
//! The HTTP service accepts sloppy form values and clamps them; the CLI and config file reject out-of-range values up front.
//! Either way the pipeline only ever sees values in range.
//!
//! ## Partial Failure Is Not Failure
//!
//! A batch keeps going when one file fails. Each outcome is recorded, totals
//! count successes only, and the process exits `0` unless `--strict` is given.
//!
//! ## One Init, Shared
//!
//! Codec setup runs through [`imaging::InitGate`]: concurrent first callers
//! await one attempt, a failure resets the gate so the next call retries, and
//! success is permanent. The gate is owned by a [`imaging::Converter`], never
//! a global.

pub mod config;
pub mod imaging;
pub mod naming;
pub mod output;
pub mod process;
pub mod scan;
pub mod server;
pub mod session;
pub mod types;

#[cfg(test)]
pub(crate) mod test_helpers;
