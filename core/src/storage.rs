//! Durable placement of downloaded files.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use uuid::Uuid;

/// Filesystem capability used to keep a finished download.
pub trait Storage: Send + Sync {
    /// A name no other call will use.
    fn unique_name(&self) -> String {
        Uuid::new_v4().to_string()
    }

    /// Move `artifact` somewhere the transport will not clean up and return
    /// the new location.
    fn persist(&self, artifact: &Path) -> io::Result<PathBuf>;
}

/// Moves downloads into one cache directory, each under a fresh UUID name.
#[derive(Debug, Clone)]
pub struct CacheDirStorage {
    dir: PathBuf,
}

impl CacheDirStorage {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl Storage for CacheDirStorage {
    fn persist(&self, artifact: &Path) -> io::Result<PathBuf> {
        fs::create_dir_all(&self.dir)?;
        let destination = self.dir.join(self.unique_name());

        if let Err(err) = fs::rename(artifact, &destination) {
            // rename fails across filesystems; fall back to copy + remove.
            tracing::debug!(error = %err, "rename failed, copying download instead");
            fs::copy(artifact, &destination)?;
            if let Err(err) = fs::remove_file(artifact) {
                tracing::warn!(path = %artifact.display(), error = %err, "could not remove transport artifact");
            }
        }

        tracing::debug!(from = %artifact.display(), to = %destination.display(), "download relocated");
        Ok(destination)
    }
}
