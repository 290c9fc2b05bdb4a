//! Build failures.
//!
//! Every failure aborts the build; nothing is retried. The variants name the
//! stage that failed and carry enough context to act on without a backtrace.

use std::path::PathBuf;

use thiserror::Error;

/// Why a build failed.
#[derive(Error, Debug)]
pub enum BuildError {
    /// A file selected for the archive could not be read.
    #[error("failed to read {}: {source}", path.display())]
    SourceRead {
        /// Path that could not be read.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The target interpreter could not be queried for its compatibility tag.
    #[error("failed to query the target environment: {0}")]
    EnvironmentQuery(String),

    /// A version constraint could not be parsed or expressed as a requirement.
    #[error("invalid constraint for '{dependency}': {message}")]
    ConstraintRender {
        /// Dependency whose constraint is at fault.
        dependency: String,
        /// What went wrong.
        message: String,
    },

    /// Writing the archive container failed.
    #[error("failed to write archive: {0}")]
    ContainerWrite(#[from] ContainerError),

    /// The native build step exited unsuccessfully.
    #[error("native build failed:\n{stderr}")]
    NativeBuildFailure {
        /// Captured standard error of the build step.
        stderr: String,
    },

    /// The project file could not be loaded.
    #[error("invalid project at {}: {message}", path.display())]
    Project {
        /// Project file.
        path: PathBuf,
        /// What went wrong.
        message: String,
    },
}

/// Lower-level archive I/O failures.
#[derive(Error, Debug)]
pub enum ContainerError {
    /// Plain I/O on the temporary archive or its final location.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// The zip encoder rejected an entry.
    #[error(transparent)]
    Zip(#[from] zip::result::ZipError),

    /// Moving the finished archive into place failed.
    #[error("could not publish {}: {source}", path.display())]
    Publish {
        /// Final archive path.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}

impl BuildError {
    /// Constraint failure attributed to `dependency`.
    pub fn constraint(dependency: impl Into<String>, message: impl std::fmt::Display) -> Self {
        Self::ConstraintRender {
            dependency: dependency.into(),
            message: message.to_string(),
        }
    }

    /// Source read failure for `path`.
    pub fn source_read(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::SourceRead {
            path: path.into(),
            source,
        }
    }
}

impl From<std::io::Error> for BuildError {
    fn from(err: std::io::Error) -> Self {
        Self::ContainerWrite(ContainerError::Io(err))
    }
}

impl From<zip::result::ZipError> for BuildError {
    fn from(err: zip::result::ZipError) -> Self {
        Self::ContainerWrite(ContainerError::Zip(err))
    }
}

/// Result alias for build operations.
pub type Result<T, E = BuildError> = std::result::Result<T, E>;
