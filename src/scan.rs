//! Input resolution for the batch converter.
//!
//! Turns the command-line inputs into an ordered list of image files.
//!
//! ## Input kinds
//!
//! ```text
//! photos/                 # existing directory: every supported image below it, sorted
//! "shots/**/*.{jpg,png}"  # contains * ? or {: glob pattern, supported matches, sorted
//! hero.jpg                # anything else: taken as a file path, even if missing
//! ```
//!
//! Every result is absolute. The same file reached through several inputs is
//! kept once, at its first position. Hidden files and directories are skipped
//! by directory scans and glob walks.
//!
//! A path that does not exist is *not* an error here; it fails later as a
//! batch item so the rest of the batch still runs.

use crate::types::has_supported_extension;
use globset::{GlobBuilder, GlobMatcher};
use std::collections::HashSet;
use std::path::{Component, Path, PathBuf};
use thiserror::Error;
use walkdir::{DirEntry, WalkDir};

#[derive(Error, Debug)]
pub enum ScanError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid glob pattern: {0}")]
    Pattern(#[from] globset::Error),
    #[error("cannot walk directory: {0}")]
    Walk(#[from] walkdir::Error),
}

/// Expand `inputs` into a de-duplicated list of absolute file paths.
pub fn resolve_input_paths(inputs: &[String]) -> Result<Vec<PathBuf>, ScanError> {
    let mut seen = HashSet::new();
    let mut results = Vec::new();

    for input in inputs {
        for path in resolve_single_input(input)? {
            if seen.insert(path.clone()) {
                results.push(path);
            }
        }
    }

    Ok(results)
}

fn resolve_single_input(input: &str) -> Result<Vec<PathBuf>, ScanError> {
    let path = Path::new(input);
    if path.is_dir() {
        return scan_directory(path);
    }
    if is_glob_pattern(input) {
        return expand_glob(input);
    }
    Ok(vec![std::path::absolute(path)?])
}

pub fn is_glob_pattern(input: &str) -> bool {
    input.contains(['*', '?', '{'])
}

fn is_hidden(entry: &DirEntry) -> bool {
    entry.depth() > 0
        && entry
            .file_name()
            .to_str()
            .is_some_and(|name| name.starts_with('.'))
}

/// All supported images under `dir`, recursively, sorted.
fn scan_directory(dir: &Path) -> Result<Vec<PathBuf>, ScanError> {
    let root = std::path::absolute(dir)?;
    let mut files = Vec::new();
    for entry in WalkDir::new(&root)
        .follow_links(true)
        .into_iter()
        .filter_entry(|e| !is_hidden(e))
    {
        let entry = entry?;
        if entry.file_type().is_file() && has_supported_extension(entry.path()) {
            files.push(entry.into_path());
        }
    }
    files.sort();
    Ok(files)
}

/// Files matching `pattern`, filtered to supported extensions, sorted.
///
/// Only the directory named by the pattern's literal prefix is walked, so
/// `photos/*.jpg` never looks outside `photos/`.
fn expand_glob(pattern: &str) -> Result<Vec<PathBuf>, ScanError> {
    let matcher = GlobBuilder::new(pattern)
        .literal_separator(true)
        .build()?
        .compile_matcher();
    let base = literal_prefix(pattern);
    let walk_root = if base.as_os_str().is_empty() {
        Path::new(".")
    } else {
        base.as_path()
    };
    if !walk_root.is_dir() {
        log::debug!("glob base {} does not exist", walk_root.display());
        return Ok(Vec::new());
    }

    let mut files = Vec::new();
    for entry in WalkDir::new(walk_root)
        .into_iter()
        .filter_entry(|e| !is_hidden(e))
    {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        if matches_pattern(&matcher, entry.path(), base.as_os_str().is_empty())
            && has_supported_extension(entry.path())
        {
            files.push(std::path::absolute(entry.path())?);
        }
    }
    files.sort();
    Ok(files)
}

/// Match a walked path against the pattern as the user wrote it.
///
/// Walking `.` yields `./a.png`; a relative pattern like `*.png` has to see `a.png`.
fn matches_pattern(matcher: &GlobMatcher, path: &Path, walked_cwd: bool) -> bool {
    let candidate = if walked_cwd {
        path.strip_prefix(".").unwrap_or(path)
    } else {
        path
    };
    matcher.is_match(candidate)
}

/// Leading path components that contain no glob metacharacters.
fn literal_prefix(pattern: &str) -> PathBuf {
    let mut base = PathBuf::new();
    for component in Path::new(pattern).components() {
        let literal = match component {
            Component::Normal(part) => !part.to_string_lossy().contains(['*', '?', '{', '[']),
            _ => true,
        };
        if !literal {
            break;
        }
        base.push(component);
    }
    // The final component may itself be a literal file name; its parent is the walk root.
    if base.as_os_str() == pattern {
        base.pop();
    }
    base
}
