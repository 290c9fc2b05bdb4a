//! Which project files belong in an archive.

use std::io;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};

use distkit_schema::{ModuleKind, Package};
use walkdir::{DirEntry, WalkDir};

use crate::error::{BuildError, Result};

/// Directories never descended into.
const SKIPPED_DIRS: &[&str] = &["__pycache__", ".git", ".hg", ".svn", ".bzr"];

/// Extensions of compiled bytecode, never packaged.
const SKIPPED_EXTENSIONS: &[&str] = &["pyc", "pyo"];

/// Supplies the project-relative paths of the files to package.
pub trait FileSource {
    /// Paths relative to the project root, in any order.
    ///
    /// # Errors
    ///
    /// [`BuildError::SourceRead`] if the project cannot be listed.
    fn files(&self) -> Result<Vec<PathBuf>>;
}

/// A fixed list.
impl FileSource for Vec<PathBuf> {
    fn files(&self) -> Result<Vec<PathBuf>> {
        Ok(self.clone())
    }
}

/// Walks a package's module on disk.
#[derive(Debug, Clone)]
pub struct WalkSource {
    root: PathBuf,
    module: PathBuf,
    kind: ModuleKind,
}

impl WalkSource {
    /// Walk `package`'s module under the project at `root`.
    pub fn new(root: impl Into<PathBuf>, package: &Package) -> Self {
        Self {
            root: root.into(),
            module: package.module.path(),
            kind: package.module.kind,
        }
    }
}

impl FileSource for WalkSource {
    fn files(&self) -> Result<Vec<PathBuf>> {
        let start = self.root.join(&self.module);
        if self.kind == ModuleKind::SingleFile {
            if !start.is_file() {
                return Err(BuildError::source_read(
                    start,
                    io::Error::new(io::ErrorKind::NotFound, "module file not found"),
                ));
            }
            return Ok(vec![self.module.clone()]);
        }

        let mut files = Vec::new();
        let walker = WalkDir::new(&start)
            .follow_links(true)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| !is_skipped_dir(e));
        for entry in walker {
            let entry = entry.map_err(|e| {
                let path = e.path().map_or_else(|| start.clone(), Path::to_path_buf);
                BuildError::source_read(path, e.into())
            })?;
            if !entry.file_type().is_file() || is_bytecode(entry.path()) {
                continue;
            }
            if let Ok(relative) = entry.path().strip_prefix(&self.root) {
                files.push(relative.to_path_buf());
            }
        }
        files.sort();
        Ok(files)
    }
}

fn is_skipped_dir(entry: &DirEntry) -> bool {
    entry.file_type().is_dir()
        && entry
            .file_name()
            .to_str()
            .is_some_and(|name| SKIPPED_DIRS.contains(&name))
}

fn is_bytecode(path: &Path) -> bool {
    path.extension()
        .and_then(OsStr::to_str)
        .is_some_and(|ext| SKIPPED_EXTENSIONS.contains(&ext))
}

#[cfg(test)]
mod tests {
    use super::*;
    use distkit_schema::Module;
    use std::fs;

    fn touch(root: &Path, rel: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, "").unwrap();
    }

    #[test]
    fn walks_package_sorted_without_bytecode() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        touch(root, "demo/__init__.py");
        touch(root, "demo/sub/b.py");
        touch(root, "demo/a.json");
        touch(root, "demo/__pycache__/a.cpython-37.pyc");
        touch(root, "demo/stale.pyc");
        touch(root, "outside.py");

        let pkg = Package::new("demo", "0.1".parse().unwrap());
        let files = WalkSource::new(root, &pkg).files().unwrap();
        assert_eq!(
            files,
            vec![
                PathBuf::from("demo/__init__.py"),
                PathBuf::from("demo/a.json"),
                PathBuf::from("demo/sub/b.py"),
            ]
        );
    }

    #[test]
    fn single_file_module_is_listed_alone() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "src/tool.py");
        touch(dir.path(), "src/other.py");

        let mut pkg = Package::new("tool", "0.1".parse().unwrap());
        pkg.module = Module::single_file("tool").in_source_root("src");
        let files = WalkSource::new(dir.path(), &pkg).files().unwrap();
        assert_eq!(files, vec![PathBuf::from("src/tool.py")]);
    }

    #[test]
    fn missing_module_is_a_read_error() {
        let dir = tempfile::tempdir().unwrap();
        let pkg = Package::new("ghost", "0.1".parse().unwrap());
        let err = WalkSource::new(dir.path(), &pkg).files().unwrap_err();
        assert!(matches!(err, BuildError::SourceRead { .. }));
    }
}
