//! Flat-directory artifact storage.
//!
//! The filesystem is ground truth: there is no separate index, and
//! [`ArtifactStore::list`] re-reads the directory on every call so
//! external additions and deletions are always reflected.

use std::path::{Path, PathBuf};
use std::time::SystemTime;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// File extensions recognized as artifacts by [`ArtifactStore::list`].
pub const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "gif", "bmp", "webp"];

/// Encodings the presentation layer cannot display natively; the
/// [`ArtifactStore::normalize`] pass re-encodes these to PNG.
const NON_NATIVE_EXTENSIONS: &[&str] = &["webp"];

/// Filename timestamp layout (local time, millisecond suffix).
const TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S_%3f";

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// One artifact on disk.
#[derive(Debug, Clone)]
pub struct ArtifactEntry {
    pub path: PathBuf,
    pub modified: SystemTime,
}

/// Errors from the artifact store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// An encoding normalization pass could not re-encode a file.
    #[error("Failed to re-encode {path}: {detail}")]
    Convert { path: String, detail: String },
}

/// Filesystem-backed persistence for generated artifacts.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    root: PathBuf,
}

impl ArtifactStore {
    /// A store rooted at `root`. The directory is created lazily on the
    /// first write.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// The output directory this store manages.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Create the output directory if it does not exist yet.
    pub fn ensure_root(&self) -> Result<(), StoreError> {
        std::fs::create_dir_all(&self.root).map_err(|source| StoreError::Io {
            path: self.root.display().to_string(),
            source,
        })
    }

    /// Persist bytes under `file_name` in the output directory,
    /// returning the full path.
    pub fn save(&self, file_name: &str, bytes: &[u8]) -> Result<PathBuf, StoreError> {
        self.ensure_root()?;
        let path = self.root.join(file_name);
        self.write(&path, bytes)?;
        Ok(path)
    }

    /// Overwrite an existing artifact path with new bytes.
    pub fn write(&self, path: &Path, bytes: &[u8]) -> Result<(), StoreError> {
        std::fs::write(path, bytes).map_err(|source| StoreError::Io {
            path: path.display().to_string(),
            source,
        })
    }

    /// Read an artifact's bytes.
    pub fn load(&self, path: &Path) -> Result<Vec<u8>, StoreError> {
        std::fs::read(path).map_err(|source| StoreError::Io {
            path: path.display().to_string(),
            source,
        })
    }

    /// Remove an artifact. Immediate and not recoverable.
    pub fn delete(&self, path: &Path) -> Result<(), StoreError> {
        std::fs::remove_file(path).map_err(|source| StoreError::Io {
            path: path.display().to_string(),
            source,
        })
    }

    /// List recognized artifacts, most recently modified first.
    ///
    /// A missing output directory is an empty listing, not an error.
    pub fn list(&self) -> Result<Vec<ArtifactEntry>, StoreError> {
        let read_dir = match std::fs::read_dir(&self.root) {
            Ok(read_dir) => read_dir,
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => {
                return Ok(Vec::new());
            }
            Err(source) => {
                return Err(StoreError::Io {
                    path: self.root.display().to_string(),
                    source,
                });
            }
        };

        let mut entries = Vec::new();
        for dir_entry in read_dir {
            let dir_entry = dir_entry.map_err(|source| StoreError::Io {
                path: self.root.display().to_string(),
                source,
            })?;
            let path = dir_entry.path();
            if !has_extension(&path, IMAGE_EXTENSIONS) {
                continue;
            }
            let modified = dir_entry
                .metadata()
                .and_then(|meta| meta.modified())
                .map_err(|source| StoreError::Io {
                    path: path.display().to_string(),
                    source,
                })?;
            entries.push(ArtifactEntry { path, modified });
        }

        entries.sort_by(|a, b| b.modified.cmp(&a.modified));
        Ok(entries)
    }

    /// Re-encode artifacts the presentation layer cannot display
    /// natively (currently WebP) to PNG, deleting the originals.
    ///
    /// Idempotent: running on an already-normalized directory converts
    /// nothing. Returns the number of files converted.
    pub fn normalize(&self) -> Result<usize, StoreError> {
        let mut converted = 0;
        for entry in self.list()? {
            if !has_extension(&entry.path, NON_NATIVE_EXTENSIONS) {
                continue;
            }
            let bytes = self.load(&entry.path)?;
            let decoded = image::load_from_memory(&bytes).map_err(|error| StoreError::Convert {
                path: entry.path.display().to_string(),
                detail: error.to_string(),
            })?;

            let target = entry.path.with_extension("png");
            if target.exists() {
                // An unrelated file already owns the target name; leave
                // both untouched rather than clobber it.
                tracing::warn!(
                    from = %entry.path.display(),
                    to = %target.display(),
                    "Normalization target already exists, skipping",
                );
                continue;
            }
            let mut out = Vec::new();
            decoded
                .write_to(&mut std::io::Cursor::new(&mut out), image::ImageFormat::Png)
                .map_err(|error| StoreError::Convert {
                    path: target.display().to_string(),
                    detail: error.to_string(),
                })?;
            self.write(&target, &out)?;
            self.delete(&entry.path)?;

            tracing::debug!(
                from = %entry.path.display(),
                to = %target.display(),
                "Normalized artifact encoding",
            );
            converted += 1;
        }
        Ok(converted)
    }
}

// ---------------------------------------------------------------------------
// Naming
// ---------------------------------------------------------------------------

/// Filename for the `index`-th artifact of a run that produced `total`.
///
/// The index suffix is omitted when the run produced exactly one.
pub fn generation_file_name(timestamp: &str, index: usize, total: usize) -> String {
    if total > 1 {
        format!("img_{timestamp}_{index}.png")
    } else {
        format!("img_{timestamp}.png")
    }
}

/// Filename timestamp for a run starting now.
pub fn run_timestamp() -> String {
    chrono::Local::now().format(TIMESTAMP_FORMAT).to_string()
}

fn has_extension(path: &Path, extensions: &[&str]) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase())
        .is_some_and(|ext| extensions.contains(&ext.as_str()))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
