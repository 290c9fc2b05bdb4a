//! Binary archive assembly.

use std::collections::BTreeMap;
use std::fmt;
use std::io::{Seek, Write};
use std::path::{Path, PathBuf};

use distkit_schema::{ModuleKind, Package};
use tracing::info;

use super::{escape, escape_version, license_files, publish};
use crate::archive::{WheelWriter, archive_path};
use crate::discovery::{FileSource, WalkSource};
use crate::error::Result;
use crate::metadata::{entry_point_registry, package_descriptor, wheel_descriptor};
use crate::native::{BuiltArtifacts, NativeBuild, SetupPyBuild};
use crate::requirements::{Projection, project};
use crate::setup_py::setup_script;
use crate::tags::{self, CompatibilityTag, PythonInterpreter, TargetEnvironment};

/// Builds a `.whl` for one package.
pub struct WheelBuilder<'a> {
    package: &'a Package,
    root: PathBuf,
    files: Box<dyn FileSource + 'a>,
    environment: Box<dyn TargetEnvironment + 'a>,
    native: Box<dyn NativeBuild + 'a>,
}

impl fmt::Debug for WheelBuilder<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WheelBuilder")
            .field("package", &self.package.name)
            .field("root", &self.root)
            .finish_non_exhaustive()
    }
}

impl<'a> WheelBuilder<'a> {
    /// Builder for `package` in the project at `root`, discovering files on
    /// disk and querying `python3` for native builds.
    pub fn new(package: &'a Package, root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        Self {
            files: Box::new(WalkSource::new(&root, package)),
            environment: Box::new(PythonInterpreter::default()),
            native: Box::new(SetupPyBuild::default()),
            package,
            root,
        }
    }

    /// Package exactly the files `files` lists.
    #[must_use]
    pub fn with_files(mut self, files: impl FileSource + 'a) -> Self {
        self.files = Box::new(files);
        self
    }

    /// Tag native builds for `environment`.
    #[must_use]
    pub fn with_environment(mut self, environment: impl TargetEnvironment + 'a) -> Self {
        self.environment = Box::new(environment);
        self
    }

    /// Run native builds through `native`.
    #[must_use]
    pub fn with_native_build(mut self, native: impl NativeBuild + 'a) -> Self {
        self.native = Box::new(native);
        self
    }

    /// Use the interpreter at `python` for both tag queries and native builds.
    #[must_use]
    pub fn with_python(self, python: &Path) -> Self {
        self.with_environment(PythonInterpreter::new(python))
            .with_native_build(SetupPyBuild::new(python))
    }

    /// `{name}-{version}.dist-info`
    pub fn dist_info(&self) -> String {
        format!(
            "{}-{}.dist-info",
            escape(&self.package.name),
            escape_version(&self.package.version.to_string())
        )
    }

    /// `{name}-{version}-{tag}.whl`
    pub fn filename(&self, tag: &CompatibilityTag) -> String {
        format!(
            "{}-{}-{tag}.whl",
            escape(&self.package.name),
            escape_version(&self.package.version.to_string())
        )
    }

    /// Build the wheel into `dist_dir` and return its path.
    ///
    /// # Errors
    ///
    /// Any [`BuildError`](crate::BuildError); nothing is left at the final
    /// path when one is returned.
    pub fn build(&self, dist_dir: &Path) -> Result<PathBuf> {
        let tag = tags::resolve(self.package, self.environment.as_ref())?;
        let projection = project(self.package, &self.package.dependencies)?;
        let files = self.files.files()?;
        let artifacts = self.native_build(&files, &projection)?;

        let filename = self.filename(&tag);
        info!(package = %self.package.name, %filename, "building wheel");
        let path = publish(dist_dir, &filename, |file| {
            self.write(WheelWriter::new(file), &tag, &projection, &files, artifacts.as_ref())
        })?;
        info!(path = %path.display(), "built wheel");
        Ok(path)
    }

    /// Write every member into `writer` and close it.
    ///
    /// Module files come first in path order, then license files, then the
    /// metadata members, then `RECORD`.
    ///
    /// # Errors
    ///
    /// [`BuildError::SourceRead`](crate::BuildError::SourceRead) or
    /// [`BuildError::ContainerWrite`](crate::BuildError::ContainerWrite).
    pub fn write<W: Write + Seek>(
        &self,
        mut writer: WheelWriter<W>,
        tag: &CompatibilityTag,
        projection: &Projection,
        files: &[PathBuf],
        artifacts: Option<&BuiltArtifacts>,
    ) -> Result<W> {
        for (archive, source) in self.module_members(files, artifacts)? {
            writer.add_file(&source, &archive)?;
        }

        let dist_info = self.dist_info();
        for license in license_files(&self.root)? {
            let archive = format!("{dist_info}/{}", archive_path(&license));
            writer.add_file(&self.root.join(&license), &archive)?;
        }

        if let Some(registry) = entry_point_registry(self.package) {
            writer.add_text(&format!("{dist_info}/entry_points.txt"), &registry)?;
        }
        let purelib = !self.package.has_native_build();
        writer.add_text(&format!("{dist_info}/WHEEL"), &wheel_descriptor(purelib, tag))?;
        writer.add_text(
            &format!("{dist_info}/METADATA"),
            &package_descriptor(self.package, projection),
        )?;

        writer.finalize(&format!("{dist_info}/RECORD"))
    }

    /// Archive path → file on disk, with built artifacts taking precedence
    /// over same-named module files.
    fn module_members(
        &self,
        files: &[PathBuf],
        artifacts: Option<&BuiltArtifacts>,
    ) -> Result<BTreeMap<String, PathBuf>> {
        let module = &self.package.module;
        let mut members = BTreeMap::new();
        for file in files {
            let topmost = file.parent().is_none_or(|p| p.as_os_str().is_empty());
            if module.kind == ModuleKind::Package && topmost {
                continue;
            }
            let relative = match &module.source_root {
                Some(root) => file.strip_prefix(root).unwrap_or(file),
                None => file.as_path(),
            };
            members.insert(archive_path(relative), self.root.join(file));
        }

        if let Some(artifacts) = artifacts {
            for file in artifacts.files()? {
                members.insert(archive_path(&file), artifacts.dir().join(&file));
            }
        }
        Ok(members)
    }

    fn native_build(
        &self,
        files: &[PathBuf],
        projection: &Projection,
    ) -> Result<Option<BuiltArtifacts>> {
        if !self.package.has_native_build() {
            return Ok(None);
        }
        let script = setup_script(self.package, files, projection);
        self.native.build(&self.root, &script)
    }
}
