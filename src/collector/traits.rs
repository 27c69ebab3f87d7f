//! Abstractions for filesystem access during endpoint discovery.
//!
//! The `FileSystem` trait lets the registry scan the real filesystem for
//! server sockets in production and an in-memory layout in tests.

use std::io;
use std::path::{Path, PathBuf};

/// Abstraction for the filesystem operations discovery needs.
pub trait FileSystem: Send + Sync {
    /// Checks if a path is a directory.
    fn is_dir(&self, path: &Path) -> bool;

    /// Checks if a path is a connectable socket.
    ///
    /// Missing paths are not sockets. Other stat failures are logged by the
    /// implementation and reported as `false`.
    fn is_socket(&self, path: &Path) -> bool;

    /// Lists entries in a directory.
    ///
    /// # Returns
    /// A vector of paths to entries in the directory, or an I/O error.
    fn read_dir(&self, path: &Path) -> io::Result<Vec<PathBuf>>;
}

/// Real filesystem implementation that delegates to `std::fs`.
#[derive(Debug, Default, Clone, Copy)]
pub struct RealFs;

impl RealFs {
    /// Creates a new `RealFs` instance.
    pub fn new() -> Self {
        Self
    }
}

impl FileSystem for RealFs {
    fn is_dir(&self, path: &Path) -> bool {
        path.is_dir()
    }

    #[cfg(unix)]
    fn is_socket(&self, path: &Path) -> bool {
        use std::os::unix::fs::FileTypeExt;

        match std::fs::metadata(path) {
            Ok(meta) => meta.file_type().is_socket(),
            Err(e) if e.kind() == io::ErrorKind::NotFound => false,
            Err(e) => {
                tracing::warn!("couldn't stat {}: {}", path.display(), e);
                false
            }
        }
    }

    #[cfg(not(unix))]
    fn is_socket(&self, _path: &Path) -> bool {
        false
    }

    fn read_dir(&self, path: &Path) -> io::Result<Vec<PathBuf>> {
        let entries = std::fs::read_dir(path)?;
        let mut paths = Vec::new();
        for entry in entries {
            paths.push(entry?.path());
        }
        paths.sort();
        Ok(paths)
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::os::unix::net::UnixListener;

    #[test]
    fn test_real_fs_detects_socket() {
        let dir = tempfile::tempdir().unwrap();
        let sock = dir.path().join("mysqld.sock");
        let _listener = UnixListener::bind(&sock).unwrap();

        let fs = RealFs::new();
        assert!(fs.is_socket(&sock));
        assert!(!fs.is_dir(&sock));
    }

    #[test]
    fn test_real_fs_regular_file_is_not_socket() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("mysql.sock");
        std::fs::write(&file, "not a socket").unwrap();

        let fs = RealFs::new();
        assert!(!fs.is_socket(&file));
        assert!(!fs.is_socket(Path::new("/nonexistent/path/12345.sock")));
    }

    #[test]
    fn test_real_fs_read_dir_sorted() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("mysql-b")).unwrap();
        std::fs::create_dir(dir.path().join("mysql-a")).unwrap();

        let fs = RealFs::new();
        assert!(fs.is_dir(dir.path()));
        let entries = fs.read_dir(dir.path()).unwrap();
        assert_eq!(
            entries,
            vec![dir.path().join("mysql-a"), dir.path().join("mysql-b")]
        );
    }
}
