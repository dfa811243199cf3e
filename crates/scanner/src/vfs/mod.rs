//! Uniform access to the entries of directories and archives.
//!
//! A [`Container`] is opened by its caller, enumerated lazily and closed
//! exactly once; closing is best-effort and never fails the caller. Each
//! [`Entry`] knows its owning container's identity but never owns it.

pub mod system;
pub mod zip;

use crate::config::DEFAULT_MAX_ENTRY_BYTES;
use crate::errors::VfsError;
use std::fmt;
use std::io::Read;

pub use self::system::{DirectoryContainer, DirectoryEntry};
pub use self::zip::{ZipContainer, ZipEntry};

/// Lazy, single-pass sequence of entries. Exhausted after the first error.
pub type Entries<'a> = Box<dyn Iterator<Item = Result<Box<dyn Entry>, VfsError>> + 'a>;

pub trait Container: Send + Sync {
    /// Identity of the container, never empty.
    fn path(&self) -> &str;

    /// Enumerates the container's non-directory entries.
    fn entries(&self) -> Entries<'_>;

    /// Releases underlying resources. Safe to call more than once; failures
    /// are logged and swallowed.
    fn close(&self);
}

pub trait Entry: Send + Sync + fmt::Display {
    /// Path below the container root, `/`-separated.
    fn relative_path(&self) -> &str;

    /// Identity of the owning container.
    fn container_path(&self) -> &str;

    fn open_stream(&self) -> Result<Box<dyn Read + Send>, VfsError>;

    /// Uncompressed size, when the container knows it without reading.
    fn size(&self) -> Option<u64> {
        None
    }

    fn name(&self) -> &str {
        file_name(self.relative_path())
    }

    fn read_bytes(&self) -> Result<Vec<u8>, VfsError> {
        let mut stream = self.open_stream()?;
        let mut bytes = Vec::with_capacity(capacity_hint(self.size().unwrap_or(0)));
        stream
            .read_to_end(&mut bytes)
            .map_err(|source| VfsError::Io {
                path: self.to_string(),
                source,
            })?;
        Ok(bytes)
    }
}

/// Buffer size to reserve for an entry whose declared size is `size`.
/// Declared sizes come from the container and are not trusted.
pub(crate) fn capacity_hint(size: u64) -> usize {
    usize::try_from(size.min(DEFAULT_MAX_ENTRY_BYTES)).unwrap_or(0)
}

/// Normalize path separators and strip leading separators.
pub fn normalize_path(path: &str) -> String {
    let normalized = path.replace('\\', "/");
    let trimmed = normalized.trim_start_matches("./").trim_start_matches('/');
    trimmed.to_string()
}

/// Last segment of a `/`-separated path.
pub fn file_name(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}
