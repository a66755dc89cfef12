//! Blob storage for uploaded listing photos.

use anyhow::{Context, Result};
use std::fs::{self, File};
use std::io::{self, Read};
use std::path::{Component, Path, PathBuf};

/// Where uploaded photo bytes live. Records only keep the returned path.
pub trait MediaStore: Send + Sync {
    /// Persists `bytes` under `path` (relative, `/`-separated).
    fn save(&self, path: &str, bytes: &[u8]) -> Result<()>;

    /// Opens a previously saved blob for streaming.
    fn open(&self, path: &str) -> io::Result<Box<dyn Read + Send>>;

    /// Deletes a blob. Removing one that is already gone is not an error.
    fn remove(&self, path: &str) -> Result<()>;
}

/// Stores blobs as plain files below a root directory.
#[derive(Debug, Clone)]
pub struct FsMediaStore {
    root: PathBuf,
}

impl FsMediaStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn resolve(&self, path: &str) -> io::Result<PathBuf> {
        let relative = Path::new(path);
        let escapes = relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_)));
        if escapes {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("media path {path:?} must be relative"),
            ));
        }
        Ok(self.root.join(relative))
    }
}

impl MediaStore for FsMediaStore {
    fn save(&self, path: &str, bytes: &[u8]) -> Result<()> {
        let target = self.resolve(path)?;
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create media directory {:?}", parent))?;
        }
        fs::write(&target, bytes).with_context(|| format!("failed to write {:?}", target))?;
        Ok(())
    }

    fn open(&self, path: &str) -> io::Result<Box<dyn Read + Send>> {
        let file = File::open(self.resolve(path)?)?;
        Ok(Box::new(file))
    }

    fn remove(&self, path: &str) -> Result<()> {
        let target = self.resolve(path)?;
        match fs::remove_file(&target) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e).with_context(|| format!("failed to remove {:?}", target)),
        }
    }
}

/// Lowercase extension of an uploaded file name, if it looks like one.
pub fn file_extension(file_name: &str) -> Option<String> {
    let (_, ext) = file_name.rsplit_once('.')?;
    let ok = !ext.is_empty() && ext.len() <= 5 && ext.chars().all(|c| c.is_ascii_alphanumeric());
    ok.then(|| ext.to_ascii_lowercase())
}

/// MIME type served for a stored photo, judged by its extension.
pub fn content_type(path: &str) -> &'static str {
    match file_extension(path).as_deref() {
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("png") => "image/png",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        _ => "application/octet-stream",
    }
}
