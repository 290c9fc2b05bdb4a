//! Source archive assembly.

use std::collections::BTreeSet;
use std::fmt;
use std::io::Write;
use std::path::{Path, PathBuf};

use distkit_schema::Package;
use tracing::info;

use super::{license_files, publish};
use crate::archive::{TarWriter, archive_path};
use crate::discovery::{FileSource, WalkSource};
use crate::error::Result;
use crate::metadata::package_descriptor;
use crate::pyproject::PYPROJECT;
use crate::requirements::project;
use crate::setup_py::setup_script;

/// Generated members that replace any same-named project file.
const GENERATED: [&str; 2] = ["setup.py", "PKG-INFO"];

/// Builds a `.tar.gz` for one package.
pub struct SdistBuilder<'a> {
    package: &'a Package,
    root: PathBuf,
    files: Box<dyn FileSource + 'a>,
}

impl fmt::Debug for SdistBuilder<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SdistBuilder")
            .field("package", &self.package.name)
            .field("root", &self.root)
            .finish_non_exhaustive()
    }
}

impl<'a> SdistBuilder<'a> {
    /// Builder for `package` in the project at `root`.
    pub fn new(package: &'a Package, root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        Self {
            files: Box::new(WalkSource::new(&root, package)),
            package,
            root,
        }
    }

    /// Package the module files `files` lists.
    #[must_use]
    pub fn with_files(mut self, files: impl FileSource + 'a) -> Self {
        self.files = Box::new(files);
        self
    }

    /// `{name}-{version}`, the archive's top-level directory.
    pub fn base_dir(&self) -> String {
        format!("{}-{}", self.package.name, self.package.version)
    }

    /// `{name}-{version}.tar.gz`
    pub fn filename(&self) -> String {
        format!("{}.tar.gz", self.base_dir())
    }

    /// Build the source archive into `dist_dir` and return its path.
    ///
    /// # Errors
    ///
    /// Any [`BuildError`](crate::BuildError); nothing is left at the final
    /// path when one is returned.
    pub fn build(&self, dist_dir: &Path) -> Result<PathBuf> {
        let files = self.collect_files()?;
        let filename = self.filename();
        info!(package = %self.package.name, %filename, "building sdist");

        let path = publish(dist_dir, &filename, |file| {
            self.write(TarWriter::new(file), &files)
        })?;
        info!(path = %path.display(), "built sdist");
        Ok(path)
    }

    /// Write the project files, `setup.py` and `PKG-INFO` into `writer` and
    /// close it.
    ///
    /// # Errors
    ///
    /// [`BuildError::ConstraintRender`](crate::BuildError::ConstraintRender),
    /// [`BuildError::SourceRead`](crate::BuildError::SourceRead) or
    /// [`BuildError::ContainerWrite`](crate::BuildError::ContainerWrite).
    pub fn write<W: Write>(&self, mut writer: TarWriter<W>, files: &[PathBuf]) -> Result<W> {
        let projection = project(self.package, &self.package.dependencies)?;
        let base = self.base_dir();

        for file in files {
            let archive = format!("{base}/{}", archive_path(file));
            writer.add_file(&self.root.join(file), &archive)?;
        }
        writer.add_text(
            &format!("{base}/setup.py"),
            &setup_script(self.package, files, &projection),
        )?;
        writer.add_text(
            &format!("{base}/PKG-INFO"),
            &package_descriptor(self.package, &projection),
        )?;
        writer.finish()
    }

    /// Module files plus the project file, readme, license texts and build
    /// script found at the root, sorted.
    ///
    /// # Errors
    ///
    /// [`BuildError::SourceRead`](crate::BuildError::SourceRead) if the
    /// project cannot be listed.
    pub fn collect_files(&self) -> Result<Vec<PathBuf>> {
        let mut files: BTreeSet<PathBuf> = self.files.files()?.into_iter().collect();

        let mut extras: Vec<PathBuf> = vec![PathBuf::from(PYPROJECT)];
        extras.extend(self.package.readme.clone());
        extras.extend(self.package.build_script.clone());
        extras.extend(license_files(&self.root)?);
        for extra in extras {
            if self.root.join(&extra).is_file() {
                files.insert(extra);
            }
        }

        files.retain(|f| !GENERATED.iter().any(|g| f.as_path() == Path::new(g)));
        Ok(files.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use distkit_schema::Dependency;
    use flate2::read::GzDecoder;
    use std::io::Read;

    fn project_dir(files: &[(&str, &str)]) -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        for (path, content) in files {
            let path = dir.path().join(path);
            std::fs::create_dir_all(path.parent().unwrap()).unwrap();
            std::fs::write(path, content).unwrap();
        }
        dir
    }

    fn members(bytes: &[u8]) -> Vec<(String, String)> {
        let mut archive = tar::Archive::new(GzDecoder::new(bytes));
        archive
            .entries()
            .unwrap()
            .map(|entry| {
                let mut entry = entry.unwrap();
                let path = entry.path().unwrap().to_string_lossy().into_owned();
                let mut content = String::new();
                entry.read_to_string(&mut content).unwrap();
                (path, content)
            })
            .collect()
    }

    #[test]
    fn archive_holds_sources_setup_and_pkg_info() {
        let dir = project_dir(&[
            ("pyproject.toml", "[tool.poetry]\n"),
            ("README.rst", "readme"),
            ("LICENSE", "MIT"),
            ("setup.py", "# hand written\n"),
            ("my_package/__init__.py", ""),
            ("my_package/data.json", "{}"),
        ]);
        let mut pkg = Package::new("my-package", "1.2.3".parse().unwrap());
        pkg.readme = Some("README.rst".into());
        pkg.dependencies.push(Dependency::new("cleo", "^0.6").unwrap());

        let builder = SdistBuilder::new(&pkg, dir.path());
        let files = builder.collect_files().unwrap();
        let bytes = builder.write(TarWriter::new(Vec::new()), &files).unwrap();
        let members = members(&bytes);

        let paths: Vec<&str> = members.iter().map(|(p, _)| p.as_str()).collect();
        assert_eq!(
            paths,
            vec![
                "my-package-1.2.3/LICENSE",
                "my-package-1.2.3/README.rst",
                "my-package-1.2.3/my_package/__init__.py",
                "my-package-1.2.3/my_package/data.json",
                "my-package-1.2.3/pyproject.toml",
                "my-package-1.2.3/setup.py",
                "my-package-1.2.3/PKG-INFO",
            ]
        );

        let setup = &members[5].1;
        assert!(setup.contains("install_requires = \\\n['cleo>=0.6,<0.7']\n"));
        assert!(setup.contains("package_data = \\\n{'my_package': ['data.json']}\n"));
        let pkg_info = &members[6].1;
        assert!(pkg_info.starts_with("Metadata-Version: 2.1\nName: my-package\n"));
        assert!(pkg_info.contains("Requires-Dist: cleo (>=0.6,<0.7)\n"));
    }

    #[test]
    fn relocated_sources_keep_their_layout() {
        let dir = project_dir(&[("src/package_src/__init__.py", "")]);
        let mut pkg = Package::new("package-src", "0.1".parse().unwrap());
        pkg.module = distkit_schema::Module::package("package_src").in_source_root("src");

        let builder = SdistBuilder::new(&pkg, dir.path());
        let files = builder.collect_files().unwrap();
        let bytes = builder.write(TarWriter::new(Vec::new()), &files).unwrap();
        let members = members(&bytes);
        assert_eq!(members[0].0, "package-src-0.1/src/package_src/__init__.py");
        assert!(members[1].1.contains("package_dir = \\\n{'': 'src'}\n"));
    }

    #[test]
    fn filename_keeps_the_declared_name() {
        let pkg = Package::new("my-package", "1.2.3".parse().unwrap());
        let builder = SdistBuilder::new(&pkg, "/nowhere");
        assert_eq!(builder.filename(), "my-package-1.2.3.tar.gz");
    }
}
