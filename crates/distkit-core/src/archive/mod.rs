//! Deterministic archive containers.
//!
//! Both writers stamp every member with fixed timestamps and normalized
//! permissions so that rebuilding identical inputs yields identical bytes.

pub mod sdist;
pub mod wheel;

use std::path::{Component, Path};

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;

pub use sdist::TarWriter;
pub use wheel::{RecordEntry, TextMember, WheelWriter};

/// Read buffer size used while hashing source files.
pub const CHUNK_SIZE: usize = 8 * 1024;

/// Timestamp of synthesized text members, 2016-01-01T00:00:00Z.
pub const TEXT_DATE: (u16, u8, u8) = (2016, 1, 1);

/// The same instant as seconds since the UNIX epoch, used for tar headers.
pub const TEXT_EPOCH: u64 = 1_451_606_400;

/// Permission class of an archive member.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Permission {
    /// `755`
    Executable,
    /// `644`
    Regular,
    /// `755` plus the container's directory flag.
    Directory,
}

impl Permission {
    /// Unix mode bits stored in the container.
    pub fn mode(self) -> u32 {
        match self {
            Self::Executable | Self::Directory => 0o755,
            Self::Regular => 0o644,
        }
    }

    /// Classify `metadata`: any execute bit makes a file executable.
    pub fn of(metadata: &std::fs::Metadata) -> Self {
        if metadata.is_dir() {
            return Self::Directory;
        }
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            if metadata.permissions().mode() & 0o111 != 0 {
                return Self::Executable;
            }
        }
        Self::Regular
    }
}

/// Encode a raw digest the way `RECORD` expects: URL-safe base64, no padding.
pub fn record_digest(digest: &[u8]) -> String {
    URL_SAFE_NO_PAD.encode(digest)
}

/// `/`-separated form of a relative path, whatever the host separator.
pub fn archive_path(path: &Path) -> String {
    path.components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use super::*;
    use sha2::{Digest, Sha256};

    #[test]
    fn digest_is_urlsafe_and_unpadded() {
        let digest = Sha256::digest(b"");
        assert_eq!(
            record_digest(&digest),
            "47DEQpj8HBSa-_TImW-5JCeuQeRkm5NMpJWZG3hSuFU"
        );
    }

    #[test]
    fn archive_paths_use_forward_slashes() {
        let path: std::path::PathBuf = ["my_package", "sub", "__init__.py"].iter().collect();
        assert_eq!(archive_path(&path), "my_package/sub/__init__.py");
        assert_eq!(archive_path(Path::new("./a/b.py")), "a/b.py");
    }

    #[test]
    fn modes_collapse_to_two_classes() {
        assert_eq!(Permission::Executable.mode(), 0o755);
        assert_eq!(Permission::Regular.mode(), 0o644);
        assert_eq!(Permission::Directory.mode(), 0o755);
    }

    #[cfg(unix)]
    #[test]
    fn execute_bit_marks_executable() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("run.sh");
        std::fs::write(&script, "#!/bin/sh\n").unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o700)).unwrap();
        let meta = std::fs::metadata(&script).unwrap();
        assert_eq!(Permission::of(&meta), Permission::Executable);

        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o600)).unwrap();
        let meta = std::fs::metadata(&script).unwrap();
        assert_eq!(Permission::of(&meta), Permission::Regular);

        let meta = std::fs::metadata(dir.path()).unwrap();
        assert_eq!(Permission::of(&meta), Permission::Directory);
    }
}
