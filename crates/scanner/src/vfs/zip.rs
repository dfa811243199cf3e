use super::{Container, Entries, Entry, capacity_hint, normalize_path};
use crate::errors::VfsError;
use ::zip::ZipArchive;
use std::fmt;
use std::fs::File;
use std::io::{Cursor, Read, Seek};
use std::path::Path;
use std::sync::{Arc, Mutex, Weak};
use tracing::{debug, warn};

type SharedArchive<R> = Mutex<Option<ZipArchive<R>>>;

/// A container backed by a zip/jar archive.
///
/// The archive handle is shared with the entries only through weak
/// references: entries never keep a closed archive alive.
pub struct ZipContainer<R: Read + Seek + Send + 'static = File> {
    path: Arc<str>,
    archive: Arc<SharedArchive<R>>,
}

impl ZipContainer<File> {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, VfsError> {
        let path = path.as_ref();
        let display = path.to_string_lossy().to_string();
        let file = File::open(path).map_err(|source| VfsError::Io {
            path: display.clone(),
            source,
        })?;
        Self::from_reader(display, file)
    }
}

impl<R: Read + Seek + Send + 'static> ZipContainer<R> {
    pub fn from_reader(path: impl Into<String>, reader: R) -> Result<Self, VfsError> {
        let path = path.into();
        if path.is_empty() {
            return Err(VfsError::EmptyPath);
        }
        let archive = ZipArchive::new(reader).map_err(|source| VfsError::Zip {
            path: path.clone(),
            source,
        })?;
        debug!("Opened archive {path} with {} entries", archive.len());
        Ok(Self {
            path: Arc::from(path),
            archive: Arc::new(Mutex::new(Some(archive))),
        })
    }

    pub fn is_closed(&self) -> bool {
        match self.archive.lock() {
            Ok(guard) => guard.is_none(),
            Err(poisoned) => poisoned.into_inner().is_none(),
        }
    }

    /// Reads the record stored under `relative_path`.
    pub fn read_entry(&self, relative_path: &str) -> Result<Vec<u8>, VfsError> {
        let closed = || VfsError::Closed {
            path: self.path.to_string(),
        };
        let mut guard = self.archive.lock().map_err(|_| closed())?;
        let archive = guard.as_mut().ok_or_else(closed)?;

        let entry_path = format!("{}!/{relative_path}", self.path);
        let mut file = archive
            .by_name(relative_path)
            .map_err(|source| VfsError::Zip {
                path: entry_path.clone(),
                source,
            })?;
        let mut bytes = Vec::with_capacity(capacity_hint(file.size()));
        file.read_to_end(&mut bytes)
            .map_err(|source| VfsError::Io {
                path: entry_path,
                source,
            })?;
        Ok(bytes)
    }

    /// Drops the archive handle. Returns false if it was already released.
    fn release(&self) -> bool {
        let released = match self.archive.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => {
                warn!(
                    "Could not close archive {} cleanly: lock poisoned",
                    self.path
                );
                poisoned.into_inner().take()
            }
        };
        released.is_some()
    }
}

impl<R: Read + Seek + Send + 'static> Container for ZipContainer<R> {
    fn path(&self) -> &str {
        &self.path
    }

    fn entries(&self) -> Entries<'_> {
        Box::new(ZipEntries {
            path: Arc::clone(&self.path),
            archive: &self.archive,
            index: 0,
            done: false,
        })
    }

    fn close(&self) {
        if self.release() {
            debug!("Closed archive {}", self.path);
        } else {
            debug!("Archive {} already closed", self.path);
        }
    }
}

impl<R: Read + Seek + Send + 'static> Drop for ZipContainer<R> {
    fn drop(&mut self) {
        if self.release() {
            debug!("Closed archive {} on drop", self.path);
        }
    }
}

impl<R: Read + Seek + Send + 'static> fmt::Display for ZipContainer<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.path)
    }
}

/// Walks the archive index one record at a time, skipping directory markers.
struct ZipEntries<'a, R: Read + Seek + Send + 'static> {
    path: Arc<str>,
    archive: &'a Arc<SharedArchive<R>>,
    index: usize,
    done: bool,
}

impl<R: Read + Seek + Send + 'static> ZipEntries<'_, R> {
    fn fail(&mut self, error: VfsError) -> Option<Result<Box<dyn Entry>, VfsError>> {
        warn!("Stopped enumerating {}: {error}", self.path);
        self.done = true;
        Some(Err(error))
    }
}

impl<R: Read + Seek + Send + 'static> Iterator for ZipEntries<'_, R> {
    type Item = Result<Box<dyn Entry>, VfsError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        let shared = self.archive;
        let mut guard = match shared.lock() {
            Ok(guard) => guard,
            Err(_) => {
                let path = self.path.to_string();
                return self.fail(VfsError::Closed { path });
            }
        };
        let Some(archive) = guard.as_mut() else {
            let path = self.path.to_string();
            return self.fail(VfsError::Closed { path });
        };

        while self.index < archive.len() {
            let index = self.index;
            self.index += 1;

            let record = match archive.by_index_raw(index) {
                Ok(record) => record,
                Err(source) => {
                    let path = self.path.to_string();
                    return self.fail(VfsError::Zip { path, source });
                }
            };
            if record.is_dir() {
                continue;
            }

            let relative_path = normalize_path(record.name());
            if relative_path.is_empty() {
                continue;
            }

            return Some(Ok(Box::new(ZipEntry {
                container_path: Arc::clone(&self.path),
                relative_path,
                index,
                size: record.size(),
                archive: Arc::downgrade(shared),
            })));
        }

        self.done = true;
        None
    }
}

/// One non-directory record of a [`ZipContainer`].
pub struct ZipEntry<R: Read + Seek + Send + 'static = File> {
    container_path: Arc<str>,
    relative_path: String,
    index: usize,
    size: u64,
    archive: Weak<SharedArchive<R>>,
}

impl<R: Read + Seek + Send + 'static> ZipEntry<R> {
    fn closed(&self) -> VfsError {
        VfsError::Closed {
            path: self.container_path.to_string(),
        }
    }
}

impl<R: Read + Seek + Send + 'static> Entry for ZipEntry<R> {
    fn relative_path(&self) -> &str {
        &self.relative_path
    }

    fn container_path(&self) -> &str {
        &self.container_path
    }

    fn size(&self) -> Option<u64> {
        Some(self.size)
    }

    fn open_stream(&self) -> Result<Box<dyn Read + Send>, VfsError> {
        let archive = self.archive.upgrade().ok_or_else(|| self.closed())?;
        let mut guard = archive.lock().map_err(|_| self.closed())?;
        let archive = guard.as_mut().ok_or_else(|| self.closed())?;

        let mut file = archive.by_index(self.index).map_err(|source| VfsError::Zip {
            path: self.to_string(),
            source,
        })?;
        let mut bytes = Vec::with_capacity(capacity_hint(self.size));
        file.read_to_end(&mut bytes)
            .map_err(|source| VfsError::Io {
                path: self.to_string(),
                source,
            })?;
        Ok(Box::new(Cursor::new(bytes)))
    }
}

impl<R: Read + Seek + Send + 'static> fmt::Display for ZipEntry<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}!/{}", self.container_path, self.relative_path)
    }
}
