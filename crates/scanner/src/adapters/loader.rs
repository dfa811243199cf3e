//! Loader contexts: the places a unit's compiled bytes can be loaded from.
//!
//! The bytecode adapter asks each configured loader in turn for a unit by its
//! qualified name; the first loader that produces the unit wins.

use crate::errors::VfsError;
use crate::vfs::{Container, Entry, ZipContainer};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

pub trait UnitLoader: Send + Sync + fmt::Display {
    /// Loads the compiled bytes of `qualified_name`. `entry` is the entry
    /// being resolved; loaders other than [`EntryLoader`] look the unit up
    /// by name instead.
    fn load(&self, qualified_name: &str, entry: &dyn Entry) -> Result<Vec<u8>, VfsError>;
}

/// `a.b.C` to `a/b/C.class`.
pub fn unit_path(qualified_name: &str) -> String {
    format!("{}.class", qualified_name.replace('.', "/"))
}

/// Reads the entry's own bytes.
#[derive(Debug, Default, Clone, Copy)]
pub struct EntryLoader;

impl UnitLoader for EntryLoader {
    fn load(&self, _qualified_name: &str, entry: &dyn Entry) -> Result<Vec<u8>, VfsError> {
        entry.read_bytes()
    }
}

impl fmt::Display for EntryLoader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("entry")
    }
}

/// Looks units up below a directory root.
#[derive(Debug, Clone)]
pub struct DirectoryLoader {
    root: PathBuf,
}

impl DirectoryLoader {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl UnitLoader for DirectoryLoader {
    fn load(&self, qualified_name: &str, _entry: &dyn Entry) -> Result<Vec<u8>, VfsError> {
        let path = self.root.join(unit_path(qualified_name));
        fs::read(&path).map_err(|source| VfsError::Io {
            path: path.to_string_lossy().to_string(),
            source,
        })
    }
}

impl fmt::Display for DirectoryLoader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "directory {}", self.root.display())
    }
}

/// Looks units up inside an archive. The archive stays open for the
/// loader's lifetime.
pub struct ArchiveLoader {
    archive: ZipContainer,
}

impl ArchiveLoader {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, VfsError> {
        Ok(Self {
            archive: ZipContainer::open(path)?,
        })
    }
}

impl UnitLoader for ArchiveLoader {
    fn load(&self, qualified_name: &str, _entry: &dyn Entry) -> Result<Vec<u8>, VfsError> {
        self.archive.read_entry(&unit_path(qualified_name))
    }
}

impl fmt::Display for ArchiveLoader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "archive {}", self.archive.path())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vfs::DirectoryContainer;
    use std::fs;
    use tempfile::TempDir;
    use testing::jar::write_jar;

    fn any_entry(dir: &TempDir) -> Box<dyn Entry> {
        fs::write(dir.path().join("Any.class"), b"entry-bytes").unwrap();
        let container = DirectoryContainer::open(dir.path()).unwrap();
        container.entries().next().unwrap().unwrap()
    }

    #[test]
    fn test_unit_path() {
        assert_eq!(unit_path("a.b.C"), "a/b/C.class");
        assert_eq!(unit_path("a.C$1"), "a/C$1.class");
        assert_eq!(unit_path("Top"), "Top.class");
    }

    #[test]
    fn test_entry_loader_reads_entry() {
        let dir = TempDir::new().unwrap();
        let entry = any_entry(&dir);
        assert_eq!(EntryLoader.load("ignored", entry.as_ref()).unwrap(), b"entry-bytes");
    }

    #[test]
    fn test_directory_loader_reads_by_name() {
        let dir = TempDir::new().unwrap();
        let entry = any_entry(&dir);
        let classes = dir.path().join("classes");
        fs::create_dir_all(classes.join("a")).unwrap();
        fs::write(classes.join("a/B.class"), b"from-dir").unwrap();

        let loader = DirectoryLoader::new(&classes);
        assert_eq!(loader.load("a.B", entry.as_ref()).unwrap(), b"from-dir");
        assert!(matches!(
            loader.load("a.Missing", entry.as_ref()),
            Err(VfsError::Io { .. })
        ));
    }

    #[test]
    fn test_archive_loader_reads_by_name() {
        let dir = TempDir::new().unwrap();
        let entry = any_entry(&dir);
        let jar = dir.path().join("lib.jar");
        write_jar(&jar, &[("a/B.class", b"from-jar".as_slice())]).unwrap();

        let loader = ArchiveLoader::open(&jar).unwrap();
        assert_eq!(loader.load("a.B", entry.as_ref()).unwrap(), b"from-jar");
        assert!(matches!(
            loader.load("a.Missing", entry.as_ref()),
            Err(VfsError::Zip { .. })
        ));
        assert!(loader.to_string().starts_with("archive "));
    }
}
