//! distkit core - reproducible wheel and sdist builder.
//!
//! # Overview
//!
//! Given a [`Package`] and the project directory it was loaded from, the
//! builders produce a binary archive (`.whl`) and a source archive
//! (`.tar.gz`). Identical inputs give byte-identical archives: members are
//! written in sorted order with fixed timestamps and normalized permissions.
//!
//! # Architecture
//!
//! - [`requirements`]: projects dependencies into requirement strings.
//! - [`archive`]: zip and tar writers that hash and record every member.
//! - [`metadata`]: `METADATA`, `WHEEL` and `entry_points.txt` renderers.
//! - [`tags`]: compatibility tag resolution.
//! - [`builder`]: the two assemblers and atomic publishing.
//!
//! File discovery, interpreter queries and native builds sit behind the
//! [`FileSource`], [`TargetEnvironment`] and [`NativeBuild`] traits.

pub mod archive;
pub mod builder;
pub mod config;
pub mod discovery;
pub mod error;
pub mod metadata;
pub mod native;
pub mod pyproject;
pub mod requirements;
pub mod setup_py;
pub mod tags;

use std::path::{Path, PathBuf};

pub use builder::{SdistBuilder, WheelBuilder};
pub use config::{BuildConfig, Format};
pub use discovery::{FileSource, WalkSource};
pub use distkit_schema::Package;
pub use error::{BuildError, ContainerError, Result};
pub use native::{BuiltArtifacts, NativeBuild, SetupPyBuild};
pub use requirements::{GroupKey, Projection, Requirement, project};
pub use tags::{CompatibilityTag, InterpreterInfo, PythonInterpreter, TargetEnvironment};

/// Build every configured format of `package` from the project at `root`.
///
/// Returns the paths of the archives written, in build order.
///
/// # Errors
///
/// The first [`BuildError`] encountered; archives already built are kept.
pub fn build(package: &Package, root: &Path, config: &BuildConfig) -> Result<Vec<PathBuf>> {
    let dist_dir = config.dist_dir(root);
    let mut built = Vec::with_capacity(config.formats.len());
    for format in &config.formats {
        let path = match format {
            Format::Sdist => SdistBuilder::new(package, root).build(&dist_dir)?,
            Format::Wheel => WheelBuilder::new(package, root)
                .with_python(&config.python)
                .build(&dist_dir)?,
        };
        built.push(path);
    }
    Ok(built)
}

/// Load `<root>/pyproject.toml` and build it.
///
/// # Errors
///
/// See [`pyproject::load`] and [`build`].
pub fn build_project(root: &Path, config: &BuildConfig) -> Result<Vec<PathBuf>> {
    let package = pyproject::load(root)?;
    build(&package, root, config)
}
