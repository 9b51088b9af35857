//! Read-only sources of raw asset bytes.
//!
//! The cache never touches `std::fs` directly; image and shader files are
//! read through an [`AssetSource`], which lets tests and embedded builds
//! serve assets from memory.

use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::error::SourceError;

/// A provider of raw file contents, addressed by forward-slash paths.
pub trait AssetSource: Send + Sync {
    /// Read the entire contents of a file.
    fn read(&self, path: &str) -> Result<Vec<u8>, SourceError>;

    /// Check whether a file exists.
    fn exists(&self, path: &str) -> bool {
        self.read(path).is_ok()
    }
}

/// Reads assets from disk, relative to a root directory.
///
/// # Example
///
/// ```ignore
/// let source = FileSystemSource::new("./assets");
/// // Reads ./assets/ui/icon.png
/// let bytes = source.read("ui/icon.png")?;
/// ```
#[derive(Debug, Clone)]
pub struct FileSystemSource {
    root: PathBuf,
}

impl FileSystemSource {
    /// Create a source rooted at the given directory.
    ///
    /// The directory does not need to exist yet; it is checked at read time.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Join `path` onto the root, refusing anything that would leave it.
    fn resolve(&self, path: &str) -> Result<PathBuf, SourceError> {
        let invalid = |reason: &str| SourceError::InvalidPath {
            path: path.to_string(),
            reason: reason.to_string(),
        };
        for component in Path::new(path).components() {
            match component {
                Component::Normal(_) | Component::CurDir => {}
                Component::ParentDir => return Err(invalid("path traversal (..) not allowed")),
                Component::RootDir | Component::Prefix(_) => {
                    return Err(invalid("absolute paths not allowed"))
                }
            }
        }
        Ok(self.root.join(path))
    }
}

impl AssetSource for FileSystemSource {
    fn read(&self, path: &str) -> Result<Vec<u8>, SourceError> {
        let full_path = self.resolve(path)?;
        log::trace!("FileSystemSource: reading {}", full_path.display());
        std::fs::read(&full_path).map_err(|e| SourceError::from_io(path, e))
    }

    fn exists(&self, path: &str) -> bool {
        self.resolve(path).is_ok_and(|p| p.is_file())
    }
}

/// In-memory source for tests and embedded assets.
///
/// Cloning is cheap and clones share the same file map, so a test can keep a
/// clone and replace file contents after the source has been handed to a
/// cache.
///
/// # Example
///
/// ```ignore
/// let mem = MemorySource::new();
/// mem.insert("shaders/basic.wgsl", shader_text.as_bytes().to_vec());
/// ```
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    files: Arc<RwLock<HashMap<String, Vec<u8>>>>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a file, overwriting any previous contents at the same path.
    pub fn insert(&self, path: impl Into<String>, data: impl Into<Vec<u8>>) {
        self.files.write().insert(path.into(), data.into());
    }

    /// Builder-style variant of [`MemorySource::insert`].
    pub fn with_file(self, path: impl Into<String>, data: impl Into<Vec<u8>>) -> Self {
        self.insert(path, data);
        self
    }

    /// Remove a file, returning its data if it existed.
    pub fn remove(&self, path: &str) -> Option<Vec<u8>> {
        self.files.write().remove(path)
    }

    pub fn len(&self) -> usize {
        self.files.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.read().is_empty()
    }
}

impl AssetSource for MemorySource {
    fn read(&self, path: &str) -> Result<Vec<u8>, SourceError> {
        self.files
            .read()
            .get(path)
            .cloned()
            .ok_or_else(|| SourceError::NotFound(path.to_string()))
    }

    fn exists(&self, path: &str) -> bool {
        self.files.read().contains_key(path)
    }
}
