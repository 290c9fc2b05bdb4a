//! Append-only zip writer that records every member for `RECORD`.

use std::fmt;
use std::fs::File;
use std::io::{Read, Seek, Write};
use std::path::Path;

use sha2::{Digest, Sha256};
use tracing::debug;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, DateTime, ZipWriter};

use super::{CHUNK_SIZE, Permission, TEXT_DATE, record_digest};
use crate::error::{BuildError, Result};

/// One line of `RECORD`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordEntry {
    /// Member path inside the archive.
    pub path: String,
    /// URL-safe base64 SHA-256 of the member's uncompressed bytes.
    pub hash: String,
    /// Uncompressed size in bytes.
    pub size: u64,
}

impl RecordEntry {
    /// `path,sha256=<hash>,<size>`
    pub fn line(&self) -> String {
        format!("{},sha256={},{}", csv_field(&self.path), self.hash, self.size)
    }
}

fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

/// Zip container writer for binary archives.
///
/// Members are written in call order and never rewritten. The writer keeps the
/// running member list so that [`finalize`](Self::finalize) can emit the
/// install manifest as the very last member.
pub struct WheelWriter<W: Write + Seek> {
    zip: ZipWriter<W>,
    records: Vec<RecordEntry>,
}

impl<W: Write + Seek> fmt::Debug for WheelWriter<W> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WheelWriter")
            .field("records", &self.records.len())
            .finish_non_exhaustive()
    }
}

impl<W: Write + Seek> WheelWriter<W> {
    /// Start a new container on `inner`.
    pub fn new(inner: W) -> Self {
        Self {
            zip: ZipWriter::new(inner),
            records: Vec::new(),
        }
    }

    /// Members written so far, in order.
    pub fn records(&self) -> &[RecordEntry] {
        &self.records
    }

    /// Copy the file at `source` into the archive at `archive_path`.
    ///
    /// The file is streamed through the hash in [`CHUNK_SIZE`] pieces. Its
    /// mode is reduced to `755` or `644`; directories become directory
    /// entries.
    ///
    /// # Errors
    ///
    /// [`BuildError::SourceRead`] if `source` cannot be read,
    /// [`BuildError::ContainerWrite`] if the zip encoder fails.
    pub fn add_file(&mut self, source: &Path, archive_path: &str) -> Result<RecordEntry> {
        let metadata =
            std::fs::metadata(source).map_err(|e| BuildError::source_read(source, e))?;
        let permission = Permission::of(&metadata);
        let options = SimpleFileOptions::default()
            .compression_method(CompressionMethod::Deflated)
            .last_modified_time(DateTime::default())
            .unix_permissions(permission.mode());

        if permission == Permission::Directory {
            self.zip.add_directory(archive_path, options)?;
            return Ok(self.record(archive_path, Sha256::new(), 0));
        }

        let mut file = File::open(source).map_err(|e| BuildError::source_read(source, e))?;
        self.zip.start_file(archive_path, options)?;

        let mut hasher = Sha256::new();
        let mut buffer = vec![0u8; CHUNK_SIZE];
        let mut size = 0u64;
        loop {
            let read = file
                .read(&mut buffer)
                .map_err(|e| BuildError::source_read(source, e))?;
            if read == 0 {
                break;
            }
            hasher.update(&buffer[..read]);
            self.zip.write_all(&buffer[..read])?;
            size += read as u64;
        }

        Ok(self.record(archive_path, hasher, size))
    }

    /// Open a text member at `archive_path`. Content written to the returned
    /// handle is stored when [`TextMember::finish`] is called.
    pub fn text(&mut self, archive_path: impl Into<String>) -> TextMember<'_, W> {
        TextMember {
            writer: self,
            path: archive_path.into(),
            buffer: String::new(),
        }
    }

    /// Store `content` as a UTF-8 member with the fixed text timestamp.
    ///
    /// # Errors
    ///
    /// [`BuildError::ContainerWrite`] if the zip encoder fails.
    pub fn add_text(&mut self, archive_path: &str, content: &str) -> Result<RecordEntry> {
        let (year, month, day) = TEXT_DATE;
        let timestamp =
            DateTime::from_date_and_time(year, month, day, 0, 0, 0).unwrap_or_default();
        let options = SimpleFileOptions::default()
            .compression_method(CompressionMethod::Deflated)
            .last_modified_time(timestamp)
            .unix_permissions(Permission::Regular.mode());

        let bytes = content.as_bytes();
        self.zip.start_file(archive_path, options)?;
        self.zip.write_all(bytes)?;

        let mut hasher = Sha256::new();
        hasher.update(bytes);
        Ok(self.record(archive_path, hasher, bytes.len() as u64))
    }

    /// Write the install manifest at `record_path` and close the container.
    ///
    /// Every member written so far is listed with its hash and size; the
    /// manifest lists itself last with both fields empty.
    ///
    /// # Errors
    ///
    /// [`BuildError::ContainerWrite`] if the manifest or the zip trailer
    /// cannot be written.
    pub fn finalize(mut self, record_path: &str) -> Result<W> {
        let mut manifest = String::new();
        for entry in &self.records {
            manifest.push_str(&entry.line());
            manifest.push('\n');
        }
        manifest.push_str(&csv_field(record_path));
        manifest.push_str(",,\n");

        self.add_text(record_path, &manifest)?;
        Ok(self.zip.finish()?)
    }

    fn record(&mut self, path: &str, hasher: Sha256, size: u64) -> RecordEntry {
        let entry = RecordEntry {
            path: path.to_string(),
            hash: record_digest(&hasher.finalize()),
            size,
        };
        debug!(path, size, "added member");
        self.records.push(entry.clone());
        entry
    }
}

/// A text member being composed. See [`WheelWriter::text`].
pub struct TextMember<'a, W: Write + Seek> {
    writer: &'a mut WheelWriter<W>,
    path: String,
    buffer: String,
}

impl<W: Write + Seek> fmt::Debug for TextMember<'_, W> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TextMember")
            .field("path", &self.path)
            .field("len", &self.buffer.len())
            .finish_non_exhaustive()
    }
}

impl<W: Write + Seek> TextMember<'_, W> {
    /// Append `line` and a newline.
    pub fn line(&mut self, line: &str) {
        self.buffer.push_str(line);
        self.buffer.push('\n');
    }

    /// Hash and store the accumulated content.
    ///
    /// # Errors
    ///
    /// [`BuildError::ContainerWrite`] if the zip encoder fails.
    pub fn finish(self) -> Result<RecordEntry> {
        self.writer.add_text(&self.path, &self.buffer)
    }
}

impl<W: Write + Seek> fmt::Write for TextMember<'_, W> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        self.buffer.push_str(s);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fmt::Write as _;
    use std::io::Cursor;

    fn read_member(bytes: &[u8], name: &str) -> Vec<u8> {
        let mut archive = zip::ZipArchive::new(Cursor::new(bytes)).unwrap();
        let mut member = archive.by_name(name).unwrap();
        let mut out = Vec::new();
        member.read_to_end(&mut out).unwrap();
        out
    }

    #[test]
    fn record_lists_members_then_itself() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("mod.py");
        std::fs::write(&source, "print('hi')\n").unwrap();

        let mut writer = WheelWriter::new(Cursor::new(Vec::new()));
        let file_entry = writer.add_file(&source, "pkg/mod.py").unwrap();
        writer.add_text("pkg-1.0.dist-info/WHEEL", "Wheel-Version: 1.0\n").unwrap();
        let bytes = writer.finalize("pkg-1.0.dist-info/RECORD").unwrap().into_inner();

        let record = String::from_utf8(read_member(&bytes, "pkg-1.0.dist-info/RECORD")).unwrap();
        let lines: Vec<&str> = record.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], file_entry.line());
        assert!(lines[1].starts_with("pkg-1.0.dist-info/WHEEL,sha256="));
        assert!(lines[1].ends_with(",19"));
        assert_eq!(lines[2], "pkg-1.0.dist-info/RECORD,,");
    }

    #[test]
    fn hash_matches_stored_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("data.bin");
        let payload: Vec<u8> = (0..20_000u32).map(|i| (i % 251) as u8).collect();
        std::fs::write(&source, &payload).unwrap();

        let mut writer = WheelWriter::new(Cursor::new(Vec::new()));
        let entry = writer.add_file(&source, "pkg/data.bin").unwrap();
        let bytes = writer.finalize("pkg.dist-info/RECORD").unwrap().into_inner();

        let stored = read_member(&bytes, "pkg/data.bin");
        assert_eq!(stored, payload);
        assert_eq!(entry.size, payload.len() as u64);
        assert_eq!(entry.hash, record_digest(&Sha256::digest(&stored)));
    }

    #[test]
    fn text_member_is_deferred_until_finish() {
        let mut writer = WheelWriter::new(Cursor::new(Vec::new()));
        let mut member = writer.text("pkg.dist-info/METADATA");
        member.line("Metadata-Version: 2.1");
        writeln!(member, "Name: pkg").unwrap();
        let entry = member.finish().unwrap();
        assert_eq!(entry.size, "Metadata-Version: 2.1\nName: pkg\n".len() as u64);
        assert_eq!(writer.records().len(), 1);
    }

    #[test]
    fn text_members_carry_fixed_timestamp() {
        let mut writer = WheelWriter::new(Cursor::new(Vec::new()));
        writer.add_text("a.txt", "x").unwrap();
        let bytes = writer.finalize("RECORD").unwrap().into_inner();

        let mut archive = zip::ZipArchive::new(Cursor::new(bytes)).unwrap();
        let member = archive.by_name("a.txt").unwrap();
        let modified = member.last_modified().unwrap();
        assert_eq!(
            (modified.year(), modified.month(), modified.day()),
            (2016, 1, 1)
        );
    }

    #[test]
    fn identical_input_gives_identical_bytes() {
        let build = || {
            let mut writer = WheelWriter::new(Cursor::new(Vec::new()));
            writer.add_text("x/METADATA", "Name: x\n").unwrap();
            writer.finalize("x/RECORD").unwrap().into_inner()
        };
        assert_eq!(build(), build());
    }

    #[test]
    fn missing_source_is_a_read_error() {
        let mut writer = WheelWriter::new(Cursor::new(Vec::new()));
        let err = writer
            .add_file(Path::new("/definitely/not/here.py"), "here.py")
            .unwrap_err();
        assert!(matches!(err, BuildError::SourceRead { .. }));
        assert!(writer.records().is_empty());
    }

    #[test]
    fn commas_in_paths_are_quoted() {
        let entry = RecordEntry {
            path: "a,b.txt".into(),
            hash: "h".into(),
            size: 1,
        };
        assert_eq!(entry.line(), "\"a,b.txt\",sha256=h,1");
    }
}
