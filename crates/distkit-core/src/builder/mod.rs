//! Archive assemblers.
//!
//! Both builders write into a temporary file inside the output directory and
//! rename it over the final name only once the container is closed. A failed
//! build drops the temporary file, which deletes it, so the output directory
//! never holds a partial archive under a final name.

pub mod sdist;
pub mod wheel;

use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use glob::{MatchOptions, Pattern};
use regex::Regex;
use tempfile::NamedTempFile;
use tracing::debug;

use crate::error::{BuildError, ContainerError, Result};

pub use sdist::SdistBuilder;
pub use wheel::WheelBuilder;

/// Root-level files shipped as license texts.
const LICENSE_PATTERNS: [&str; 2] = ["COPYING*", "LICENSE*"];

static UNSAFE_RUN: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(r"[^A-Za-z0-9.]+").ok());

/// Filename-safe form: every run of characters outside `[A-Za-z0-9.]`
/// becomes a single `_`.
///
/// ```
/// assert_eq!(distkit_core::builder::escape("My Package!"), "My_Package_");
/// assert_eq!(distkit_core::builder::escape("1.0-beta"), "1.0_beta");
/// ```
pub fn escape(component: &str) -> String {
    match UNSAFE_RUN.as_ref() {
        Some(re) => re.replace_all(component, "_").into_owned(),
        None => component.to_string(),
    }
}

/// [`escape`] for versions: the `+` opening a local label is kept, so
/// `1.0+cu118` stays intact.
///
/// ```
/// assert_eq!(distkit_core::builder::escape_version("1.0+ubuntu-1"), "1.0+ubuntu_1");
/// assert_eq!(distkit_core::builder::escape_version("1.0.post1"), "1.0.post1");
/// ```
pub fn escape_version(version: &str) -> String {
    match version.split_once('+') {
        Some((public, local)) => format!("{}+{}", escape(public), escape(local)),
        None => escape(version),
    }
}

/// License files at the project root, by name, sorted.
///
/// # Errors
///
/// [`BuildError::SourceRead`] if the project root cannot be listed.
pub fn license_files(root: &Path) -> Result<Vec<PathBuf>> {
    let options = MatchOptions {
        case_sensitive: false,
        ..MatchOptions::default()
    };
    let patterns: Vec<Pattern> = LICENSE_PATTERNS
        .iter()
        .filter_map(|p| Pattern::new(p).ok())
        .collect();

    let mut found = Vec::new();
    for entry in std::fs::read_dir(root).map_err(|e| BuildError::source_read(root, e))? {
        let entry = entry.map_err(|e| BuildError::source_read(root, e))?;
        let name = entry.file_name();
        let Some(name) = name.to_str() else {
            continue;
        };
        if entry.path().is_file() && patterns.iter().any(|p| p.matches_with(name, options)) {
            found.push(PathBuf::from(name));
        }
    }
    found.sort();
    Ok(found)
}

/// Write an archive through `write` and move it to `dist_dir/filename`.
///
/// `write` receives the temporary file and must hand it back once the
/// container is closed. Any error drops (and so deletes) the temporary file;
/// an existing archive at the destination is only replaced on success.
pub(crate) fn publish<F>(dist_dir: &Path, filename: &str, write: F) -> Result<PathBuf>
where
    F: FnOnce(NamedTempFile) -> Result<NamedTempFile>,
{
    std::fs::create_dir_all(dist_dir).map_err(ContainerError::Io)?;
    let temp = tempfile::Builder::new()
        .prefix(".distkit-")
        .suffix(".part")
        .tempfile_in(dist_dir)
        .map_err(ContainerError::Io)?;
    debug!(temp = %temp.path().display(), "writing archive");

    let temp = write(temp)?;
    temp.as_file().sync_all().map_err(ContainerError::Io)?;

    let dest = dist_dir.join(filename);
    temp.persist(&dest).map_err(|e| ContainerError::Publish {
        path: dest.clone(),
        source: e.error,
    })?;
    Ok(dest)
}
