//! Output path resolution.
//!
//! Every converted file is named after its input: the file stem plus `.webp`.
//! Where it lands depends on the `--output` target:
//!
//! - no target → next to the input (`/in/photo.jpg` → `/in/photo.webp`)
//! - target ending in `.webp` → used as-is
//! - anything else → a directory, existing or not (`/out` → `/out/photo.webp`)
//!
//! An existing regular file whose name does not end in `.webp` is still
//! treated as a directory; the write then fails for that item.

use std::ffi::OsString;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PathError {
    #[error("invalid output target {path}: {source}")]
    InvalidOutputTarget {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Whether `path` names a WebP file rather than a directory.
///
/// Case-sensitive: `OUT.WEBP` is a directory name.
pub fn is_webp_target(path: &Path) -> bool {
    path.to_string_lossy().ends_with(".webp")
}

/// `photo.jpg` → `photo.webp`.
pub fn webp_file_name(input: &Path) -> OsString {
    let mut name = input
        .file_stem()
        .map(OsString::from)
        .unwrap_or_else(|| OsString::from("output"));
    name.push(".webp");
    name
}

/// Destination path for converting `input`.
pub fn resolve_output_path(input: &Path, output: Option<&Path>) -> Result<PathBuf, PathError> {
    let file_name = webp_file_name(input);

    let Some(output) = output else {
        let dir = input.parent().unwrap_or(Path::new(""));
        return Ok(dir.join(file_name));
    };

    if is_webp_target(output) {
        return Ok(output.to_path_buf());
    }

    match std::fs::metadata(output) {
        Ok(meta) => {
            if !meta.is_dir() {
                log::debug!(
                    "output target {} is an existing file; treating it as a directory",
                    output.display()
                );
            }
            Ok(output.join(file_name))
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(output.join(file_name)),
        Err(source) => Err(PathError::InvalidOutputTarget {
            path: output.to_path_buf(),
            source,
        }),
    }
}
