//! Gzip-compressed tar writer for source archives.

use std::fmt;
use std::fs::File;
use std::io::{self, Read, Write};
use std::path::Path;

use flate2::Compression;
use flate2::GzBuilder;
use flate2::write::GzEncoder;
use tar::{EntryType, Header};
use tracing::debug;

use super::{Permission, TEXT_EPOCH};
use crate::error::{BuildError, Result};

/// Tar container writer with reproducible headers.
///
/// Every entry gets GNU headers, the fixed [`TEXT_EPOCH`] mtime, uid/gid 0
/// with empty owner names, and a `755`/`644` mode. The gzip header carries
/// no file name and a zero mtime.
pub struct TarWriter<W: Write> {
    tar: tar::Builder<GzEncoder<W>>,
    members: Vec<String>,
}

impl<W: Write> fmt::Debug for TarWriter<W> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TarWriter")
            .field("members", &self.members)
            .finish_non_exhaustive()
    }
}

impl<W: Write> TarWriter<W> {
    /// Start a new gzip-compressed tar stream on `inner`.
    pub fn new(inner: W) -> Self {
        let gz = GzBuilder::new().mtime(0).write(inner, Compression::default());
        Self {
            tar: tar::Builder::new(gz),
            members: Vec::new(),
        }
    }

    /// Paths written so far, in order.
    pub fn members(&self) -> &[String] {
        &self.members
    }

    /// Copy the regular file at `source` into the archive at `archive_path`.
    ///
    /// # Errors
    ///
    /// [`BuildError::SourceRead`] if `source` cannot be read,
    /// [`BuildError::ContainerWrite`] if the tar stream cannot be written.
    pub fn add_file(&mut self, source: &Path, archive_path: &str) -> Result<()> {
        let file = File::open(source).map_err(|e| BuildError::source_read(source, e))?;
        let metadata = file
            .metadata()
            .map_err(|e| BuildError::source_read(source, e))?;
        self.append_source(
            source,
            archive_path,
            file,
            metadata.len(),
            Permission::of(&metadata),
        )
    }

    /// Append `len` bytes of `data`, read from `source`.
    fn append_source(
        &mut self,
        source: &Path,
        archive_path: &str,
        data: impl Read,
        len: u64,
        permission: Permission,
    ) -> Result<()> {
        let mut header = header(len, permission);
        let mut reader = SourceReader {
            inner: data,
            read: 0,
            failed: false,
        };
        match self
            .tar
            .append_data(&mut header, archive_path, reader.by_ref().take(len))
        {
            Err(e) if reader.failed => return Err(BuildError::source_read(source, e)),
            Err(e) => return Err(e.into()),
            Ok(()) => {}
        }
        if reader.read != len {
            let short = io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("expected {len} bytes, read {}", reader.read),
            );
            return Err(BuildError::source_read(source, short));
        }
        self.push(archive_path, len);
        Ok(())
    }

    /// Store `content` as a regular file at `archive_path`.
    ///
    /// # Errors
    ///
    /// [`BuildError::ContainerWrite`] if the tar stream cannot be written.
    pub fn add_text(&mut self, archive_path: &str, content: &str) -> Result<()> {
        let bytes = content.as_bytes();
        let mut header = header(bytes.len() as u64, Permission::Regular);
        self.tar.append_data(&mut header, archive_path, bytes)?;
        self.push(archive_path, bytes.len() as u64);
        Ok(())
    }

    /// Write the tar trailer and gzip footer and return the underlying writer.
    ///
    /// # Errors
    ///
    /// [`BuildError::ContainerWrite`] if the trailers cannot be written.
    pub fn finish(self) -> Result<W> {
        let gz = self.tar.into_inner()?;
        Ok(gz.finish()?)
    }

    fn push(&mut self, path: &str, size: u64) {
        debug!(path, size, "added member");
        self.members.push(path.to_string());
    }
}

/// Counts what the source yields and flags its failures, which the tar
/// builder would otherwise report as its own.
struct SourceReader<R> {
    inner: R,
    read: u64,
    failed: bool,
}

impl<R: Read> Read for SourceReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self.inner.read(buf) {
            Ok(n) => {
                self.read += n as u64;
                Ok(n)
            }
            Err(e) => {
                if e.kind() != io::ErrorKind::Interrupted {
                    self.failed = true;
                }
                Err(e)
            }
        }
    }
}

fn header(size: u64, permission: Permission) -> Header {
    let mut header = Header::new_gnu();
    header.set_entry_type(EntryType::Regular);
    header.set_size(size);
    header.set_mode(permission.mode());
    header.set_mtime(TEXT_EPOCH);
    header.set_uid(0);
    header.set_gid(0);
    header
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::read::GzDecoder;
    use std::io::Read;

    fn entries(bytes: &[u8]) -> Vec<(String, u32, u64, String)> {
        let mut archive = tar::Archive::new(GzDecoder::new(bytes));
        archive
            .entries()
            .unwrap()
            .map(|entry| {
                let mut entry = entry.unwrap();
                let path = entry.path().unwrap().to_string_lossy().into_owned();
                let mode = entry.header().mode().unwrap();
                let mtime = entry.header().mtime().unwrap();
                let mut content = String::new();
                entry.read_to_string(&mut content).unwrap();
                (path, mode, mtime, content)
            })
            .collect()
    }

    #[test]
    fn writes_files_and_text_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("module.py");
        std::fs::write(&source, "x = 1\n").unwrap();

        let mut writer = TarWriter::new(Vec::new());
        writer.add_text("pkg-0.1/setup.py", "setup()\n").unwrap();
        writer.add_file(&source, "pkg-0.1/module.py").unwrap();
        assert_eq!(writer.members(), ["pkg-0.1/setup.py", "pkg-0.1/module.py"]);
        let bytes = writer.finish().unwrap();

        let found = entries(&bytes);
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].0, "pkg-0.1/setup.py");
        assert_eq!(found[0].3, "setup()\n");
        assert_eq!(found[1], ("pkg-0.1/module.py".into(), 0o644, TEXT_EPOCH, "x = 1\n".into()));
    }

    #[test]
    fn output_is_reproducible() {
        let build = || {
            let mut writer = TarWriter::new(Vec::new());
            writer.add_text("a/PKG-INFO", "Name: a\n").unwrap();
            writer.finish().unwrap()
        };
        assert_eq!(build(), build());
    }

    /// Yields a few bytes, then fails like a disk error.
    struct FailingRead {
        served: bool,
    }

    impl Read for FailingRead {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            if self.served {
                return Err(io::Error::other("device error"));
            }
            self.served = true;
            buf[..4].copy_from_slice(b"x = ");
            Ok(4)
        }
    }

    #[test]
    fn failure_while_reading_source_is_a_read_error() {
        let mut writer = TarWriter::new(Vec::new());
        let err = writer
            .append_source(
                Path::new("pkg/mod.py"),
                "pkg-0.1/pkg/mod.py",
                FailingRead { served: false },
                64,
                Permission::Regular,
            )
            .unwrap_err();
        assert!(
            matches!(err, BuildError::SourceRead { ref path, .. } if path == Path::new("pkg/mod.py"))
        );
        assert!(writer.members().is_empty());
    }

    #[test]
    fn source_shorter_than_its_size_is_a_read_error() {
        let mut writer = TarWriter::new(Vec::new());
        let err = writer
            .append_source(
                Path::new("pkg/mod.py"),
                "pkg-0.1/pkg/mod.py",
                &b"x = 1\n"[..],
                64,
                Permission::Regular,
            )
            .unwrap_err();
        assert!(matches!(err, BuildError::SourceRead { .. }));
    }

    #[test]
    fn missing_source_is_a_read_error() {
        let mut writer = TarWriter::new(Vec::new());
        let err = writer
            .add_file(Path::new("/no/such/file.py"), "x/file.py")
            .unwrap_err();
        assert!(matches!(err, BuildError::SourceRead { .. }));
    }
}
