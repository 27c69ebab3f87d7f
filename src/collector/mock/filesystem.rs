//! In-memory mock filesystem for testing discovery without real sockets.

use crate::collector::traits::FileSystem;
use std::collections::{BTreeSet, HashSet};
use std::io;
use std::path::{Path, PathBuf};

/// In-memory filesystem for testing.
///
/// Stores plain files, sockets and directories, so tests can lay out
/// `/var/lib/mysql/mysql-<name>/…` trees without touching the disk.
#[derive(Debug, Clone, Default)]
pub struct MockFs {
    /// Regular files.
    files: HashSet<PathBuf>,
    /// Socket files.
    sockets: HashSet<PathBuf>,
    /// Set of directories (for read_dir support).
    directories: HashSet<PathBuf>,
}

impl MockFs {
    /// Creates a new empty mock filesystem.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a regular file. Parent directories are created.
    pub fn add_file(&mut self, path: impl AsRef<Path>) {
        let path = path.as_ref().to_path_buf();
        self.add_parents(&path);
        self.files.insert(path);
    }

    /// Adds a socket file. Parent directories are created.
    pub fn add_socket(&mut self, path: impl AsRef<Path>) {
        let path = path.as_ref().to_path_buf();
        self.add_parents(&path);
        self.sockets.insert(path);
    }

    /// Removes a socket, as when a server shuts down.
    pub fn remove_socket(&mut self, path: impl AsRef<Path>) {
        self.sockets.remove(path.as_ref());
    }

    /// Adds an empty directory.
    pub fn add_dir(&mut self, path: impl AsRef<Path>) {
        let path = path.as_ref().to_path_buf();
        self.add_parents(&path);
        self.directories.insert(path);
    }

    fn add_parents(&mut self, path: &Path) {
        let mut parent = path.parent();
        while let Some(p) = parent {
            if !p.as_os_str().is_empty() {
                self.directories.insert(p.to_path_buf());
            }
            parent = p.parent();
        }
    }
}

impl FileSystem for MockFs {
    fn is_dir(&self, path: &Path) -> bool {
        self.directories.contains(path)
    }

    fn is_socket(&self, path: &Path) -> bool {
        self.sockets.contains(path)
    }

    fn read_dir(&self, path: &Path) -> io::Result<Vec<PathBuf>> {
        if !self.directories.contains(path) {
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("directory not found: {:?}", path),
            ));
        }

        // Find all direct children, sorted like RealFs.
        let entries: BTreeSet<PathBuf> = self
            .files
            .iter()
            .chain(self.sockets.iter())
            .chain(self.directories.iter())
            .filter(|p| p.as_path() != path && p.parent().is_some_and(|parent| parent == path))
            .cloned()
            .collect();

        Ok(entries.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_fs_add_socket() {
        let mut fs = MockFs::new();
        fs.add_socket("/var/lib/mysql/mysql-a/a.sock");

        assert!(fs.is_socket(Path::new("/var/lib/mysql/mysql-a/a.sock")));
        assert!(fs.is_dir(Path::new("/var/lib/mysql/mysql-a")));
        assert!(fs.is_dir(Path::new("/var/lib/mysql")));
        assert!(!fs.is_dir(Path::new("/var/lib/mysql/mysql-a/a.sock")));
    }

    #[test]
    fn test_mock_fs_read_dir() {
        let mut fs = MockFs::new();
        fs.add_socket("/var/lib/mysql/mysql-b/b.sock");
        fs.add_file("/var/lib/mysql/mysql-b/ibdata1");
        fs.add_dir("/var/lib/mysql/mysql-a");

        let entries = fs.read_dir(Path::new("/var/lib/mysql")).unwrap();
        assert_eq!(
            entries,
            vec![
                PathBuf::from("/var/lib/mysql/mysql-a"),
                PathBuf::from("/var/lib/mysql/mysql-b"),
            ]
        );
        assert_eq!(fs.read_dir(Path::new("/var/lib/mysql/mysql-b")).unwrap().len(), 2);
        assert!(fs.read_dir(Path::new("/nonexistent")).is_err());
    }

    #[test]
    fn test_mock_fs_remove_socket() {
        let mut fs = MockFs::new();
        fs.add_socket("/tmp/mysql.sock");
        fs.remove_socket("/tmp/mysql.sock");
        assert!(!fs.is_socket(Path::new("/tmp/mysql.sock")));
    }
}
