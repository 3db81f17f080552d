use std::fs;
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};

use super::repository::{BlobError, BlobStore};

/// Blob store writing evidence files below a root directory.
#[derive(Debug, Clone)]
pub struct FsBlobStore {
    root: PathBuf,
}

impl FsBlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn resolve(&self, path: &str) -> Result<PathBuf, BlobError> {
        let relative = Path::new(path);
        let safe = !path.is_empty()
            && relative
                .components()
                .all(|component| matches!(component, Component::Normal(_)));
        if !safe {
            return Err(BlobError::InvalidPath(path.to_string()));
        }
        Ok(self.root.join(relative))
    }
}

fn io_error(path: &str, source: std::io::Error) -> BlobError {
    if source.kind() == ErrorKind::NotFound {
        BlobError::NotFound(path.to_string())
    } else {
        BlobError::Io {
            path: path.to_string(),
            source,
        }
    }
}

impl BlobStore for FsBlobStore {
    fn put(&self, path: &str, bytes: &[u8]) -> Result<(), BlobError> {
        let target = self.resolve(path)?;
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).map_err(|source| io_error(path, source))?;
        }
        fs::write(&target, bytes).map_err(|source| io_error(path, source))
    }

    fn get(&self, path: &str) -> Result<Vec<u8>, BlobError> {
        let target = self.resolve(path)?;
        fs::read(&target).map_err(|source| io_error(path, source))
    }

    fn remove(&self, path: &str) -> Result<(), BlobError> {
        let target = self.resolve(path)?;
        fs::remove_file(&target).map_err(|source| io_error(path, source))
    }
}
