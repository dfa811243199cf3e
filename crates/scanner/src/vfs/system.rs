use super::{Container, Entries, Entry, normalize_path};
use crate::errors::VfsError;
use std::fmt;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, warn};
use walkdir::WalkDir;

/// A container backed by a plain directory tree.
pub struct DirectoryContainer {
    root: PathBuf,
    path: Arc<str>,
    closed: AtomicBool,
}

impl DirectoryContainer {
    /// Opens `root` as a container. A missing directory yields no entries.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, VfsError> {
        let mut root = root.into();
        if root.as_os_str().is_empty() {
            root = PathBuf::from(".");
        }
        if root.exists() && !root.is_dir() {
            return Err(VfsError::NotADirectory { path: root });
        }
        let path = normalize_display(&root);
        Ok(Self {
            root,
            path: Arc::from(path),
            closed: AtomicBool::new(false),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

fn normalize_display(root: &Path) -> String {
    let display = root.to_string_lossy().replace('\\', "/");
    match display.trim_end_matches('/') {
        "" if display.starts_with('/') => "/".to_string(),
        "" | "." => ".".to_string(),
        trimmed => trimmed.to_string(),
    }
}

impl Container for DirectoryContainer {
    fn path(&self) -> &str {
        &self.path
    }

    fn entries(&self) -> Entries<'_> {
        if self.closed.load(Ordering::Acquire) {
            let closed = VfsError::Closed {
                path: self.path.to_string(),
            };
            return Box::new(std::iter::once(Err(closed)));
        }
        if !self.root.exists() {
            debug!("Directory {} does not exist, no entries", self.path);
            return Box::new(std::iter::empty());
        }

        let walker = WalkDir::new(&self.root)
            .follow_links(false)
            .sort_by_file_name()
            .into_iter();
        Box::new(DirectoryEntries {
            container: self,
            walker,
            done: false,
        })
    }

    fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            debug!("Directory {} already closed", self.path);
        }
    }
}

impl fmt::Display for DirectoryContainer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.path)
    }
}

struct DirectoryEntries<'a> {
    container: &'a DirectoryContainer,
    walker: walkdir::IntoIter,
    done: bool,
}

impl Iterator for DirectoryEntries<'_> {
    type Item = Result<Box<dyn Entry>, VfsError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        if self.container.closed.load(Ordering::Acquire) {
            self.done = true;
            return Some(Err(VfsError::Closed {
                path: self.container.path.to_string(),
            }));
        }

        for item in self.walker.by_ref() {
            let dir_entry = match item {
                Ok(dir_entry) => dir_entry,
                Err(source) => {
                    warn!("Stopped enumerating {}: {source}", self.container.path);
                    self.done = true;
                    return Some(Err(VfsError::Walk {
                        path: self.container.path.to_string(),
                        source,
                    }));
                }
            };
            if dir_entry.file_type().is_dir() {
                continue;
            }

            let Ok(relative) = dir_entry.path().strip_prefix(&self.container.root) else {
                continue;
            };
            let relative_path = normalize_path(&relative.to_string_lossy());
            if relative_path.is_empty() {
                continue;
            }

            return Some(Ok(Box::new(DirectoryEntry {
                container_path: Arc::clone(&self.container.path),
                relative_path,
                full_path: dir_entry.into_path(),
            })));
        }

        self.done = true;
        None
    }
}

/// One regular file below a [`DirectoryContainer`] root.
#[derive(Debug, Clone)]
pub struct DirectoryEntry {
    container_path: Arc<str>,
    relative_path: String,
    full_path: PathBuf,
}

impl DirectoryEntry {
    pub fn full_path(&self) -> &Path {
        &self.full_path
    }
}

impl Entry for DirectoryEntry {
    fn relative_path(&self) -> &str {
        &self.relative_path
    }

    fn container_path(&self) -> &str {
        &self.container_path
    }

    fn size(&self) -> Option<u64> {
        self.full_path.metadata().ok().map(|metadata| metadata.len())
    }

    fn open_stream(&self) -> Result<Box<dyn Read + Send>, VfsError> {
        let file = File::open(&self.full_path).map_err(|source| VfsError::Io {
            path: self.to_string(),
            source,
        })?;
        Ok(Box::new(file))
    }
}

impl fmt::Display for DirectoryEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.container_path.ends_with('/') {
            write!(f, "{}{}", self.container_path, self.relative_path)
        } else {
            write!(f, "{}/{}", self.container_path, self.relative_path)
        }
    }
}
