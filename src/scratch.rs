use std::{
    fs, io,
    path::{Path, PathBuf},
};
use tracing::{debug, warn};

/// Removes a file or directory tree when dropped.
#[derive(Debug)]
pub struct ScratchPath {
    path: Option<PathBuf>,
}

impl ScratchPath {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Disarms the guard, leaving the path on disk.
    pub fn keep(mut self) -> PathBuf {
        self.path.take().unwrap_or_default()
    }
}

impl Drop for ScratchPath {
    fn drop(&mut self) {
        let path = match self.path.take() {
            Some(path) => path,
            None => return,
        };

        let res = if path.is_dir() {
            fs::remove_dir_all(&path)
        } else {
            fs::remove_file(&path)
        };

        match res {
            Ok(()) => debug!(path = %path.display(), "removed"),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => warn!(path = %path.display(), error = %e, "failed to remove"),
        }
    }
}
