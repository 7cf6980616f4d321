//! Archive cache on disk.
//!
//! The cache is a flat directory of `<fingerprint>.tar.gz` files. The
//! filename is the whole key: existence means the archive is complete,
//! because builds publish with an atomic rename. Nothing here expires
//! entries; removing cached files is an operator concern.

use std::path::{Path, PathBuf};

use ocibay_image::{validate, ImageRef};

/// Locates cached archives for image references.
#[derive(Debug, Clone)]
pub struct ImageCache {
    dir: PathBuf,
}

impl ImageCache {
    /// Creates a cache rooted at `dir`.
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Returns the cache directory.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Computes the archive path for a reference and proves it stays inside
    /// the cache directory.
    ///
    /// The filename is built from sanitized components, so escaping should
    /// be impossible; the containment check is defense in depth against
    /// sanitizer regressions. `None` signals a traversal attempt.
    #[must_use]
    pub fn entry_path(&self, reference: &ImageRef) -> Option<PathBuf> {
        let path = self.dir.join(reference.cache_filename());
        validate::path_is_contained(&self.dir, &path).then_some(path)
    }

    /// Returns the archive path if a completed archive exists.
    #[must_use]
    pub fn lookup(&self, reference: &ImageRef) -> Option<PathBuf> {
        let path = self.entry_path(reference)?;
        path.is_file().then_some(path)
    }
}
