//! Native build step for packages with a build script.
//!
//! The project tree is never written to: the synthesized `setup.py` and the
//! build output live in a private temporary directory that is removed when
//! the returned [`BuiltArtifacts`] is dropped.

use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::process::Command;

use tempfile::TempDir;
use tracing::{debug, info};
use walkdir::WalkDir;

use crate::error::{BuildError, Result};

/// Compiled files to merge into the module before packaging.
#[derive(Debug)]
pub struct BuiltArtifacts {
    lib_dir: PathBuf,
    _workspace: Option<TempDir>,
}

impl BuiltArtifacts {
    /// Artifacts already present in `lib_dir`.
    pub fn new(lib_dir: impl Into<PathBuf>) -> Self {
        Self {
            lib_dir: lib_dir.into(),
            _workspace: None,
        }
    }

    /// Directory holding the built tree.
    pub fn dir(&self) -> &Path {
        &self.lib_dir
    }

    /// Paths of every built file relative to [`dir`](Self::dir), sorted.
    ///
    /// # Errors
    ///
    /// [`BuildError::SourceRead`] if the directory cannot be walked.
    pub fn files(&self) -> Result<Vec<PathBuf>> {
        let mut files = Vec::new();
        for entry in WalkDir::new(&self.lib_dir).sort_by_file_name() {
            let entry = entry.map_err(|e| BuildError::source_read(&self.lib_dir, e.into()))?;
            if !entry.file_type().is_file() {
                continue;
            }
            if let Ok(relative) = entry.path().strip_prefix(&self.lib_dir) {
                files.push(relative.to_path_buf());
            }
        }
        Ok(files)
    }
}

/// Runs a package's native build.
pub trait NativeBuild {
    /// Build the project at `project_root` with `setup_script` and return the
    /// produced library tree, or `None` if the build produced nothing.
    ///
    /// # Errors
    ///
    /// [`BuildError::NativeBuildFailure`] if the build step fails.
    fn build(&self, project_root: &Path, setup_script: &str) -> Result<Option<BuiltArtifacts>>;
}

/// Runs `python setup.py build` on the synthesized script.
#[derive(Debug, Clone)]
pub struct SetupPyBuild {
    python: PathBuf,
}

impl SetupPyBuild {
    /// Build with the interpreter at `python`.
    pub fn new(python: impl Into<PathBuf>) -> Self {
        Self {
            python: python.into(),
        }
    }
}

impl Default for SetupPyBuild {
    fn default() -> Self {
        Self::new("python3")
    }
}

impl NativeBuild for SetupPyBuild {
    fn build(&self, project_root: &Path, setup_script: &str) -> Result<Option<BuiltArtifacts>> {
        let failure = |what: &str, e: std::io::Error| BuildError::NativeBuildFailure {
            stderr: format!("{what}: {e}"),
        };

        let workspace = tempfile::Builder::new()
            .prefix("distkit-build-")
            .tempdir()
            .map_err(|e| failure("could not create build directory", e))?;
        let setup = workspace.path().join("setup.py");
        std::fs::write(&setup, setup_script).map_err(|e| failure("could not write setup.py", e))?;
        let build_dir = workspace.path().join("build");

        info!(python = %self.python.display(), "running native build");
        let output = Command::new(&self.python)
            .arg(&setup)
            .arg("build")
            .arg("-b")
            .arg(&build_dir)
            .current_dir(project_root)
            .env("PYTHONPATH", project_root)
            .output()
            .map_err(|e| failure(&format!("could not run {}", self.python.display()), e))?;

        if !output.status.success() {
            return Err(BuildError::NativeBuildFailure {
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            });
        }

        let lib_dir = std::fs::read_dir(&build_dir)
            .ok()
            .into_iter()
            .flatten()
            .filter_map(std::result::Result::ok)
            .map(|e| e.path())
            .filter(|p| p.is_dir() && is_lib_dir(p))
            .min();

        let Some(lib_dir) = lib_dir else {
            debug!("native build produced no library tree");
            return Ok(None);
        };
        debug!(dir = %lib_dir.display(), "native build produced a library tree");
        Ok(Some(BuiltArtifacts {
            lib_dir,
            _workspace: Some(workspace),
        }))
    }
}

fn is_lib_dir(path: &Path) -> bool {
    path.file_name()
        .and_then(OsStr::to_str)
        .is_some_and(|n| n.starts_with("lib."))
}
