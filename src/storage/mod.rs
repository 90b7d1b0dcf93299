//! # Artifact Storage
//!
//! Local content-addressed artifact store. Artifacts live at
//! `<root>/<kind>/<namespace>/<name>/<filename>` and are advertised at a
//! URL under the configured hostname. Writes under a given artifact
//! directory are serialized by a per-path lock; garbage collection keeps a
//! grace window so concurrent downstream readers are not starved of a
//! just-published version.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime};

use thiserror::Error;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::warn;

use crate::builder::{hash, tarball, BuildError};
use crate::crd::Artifact;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage i/o at '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to archive artifact: {0}")]
    Archive(#[from] BuildError),

    #[error("artifact '{0}' not found in storage")]
    NotFound(String),
}

impl StorageError {
    fn io(path: &Path, source: std::io::Error) -> Self {
        StorageError::Io {
            path: path.display().to_string(),
            source,
        }
    }
}

/// The local artifact store shared by all generators
#[derive(Debug)]
pub struct Storage {
    root: PathBuf,
    hostname: String,
    locks: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl Storage {
    /// Open (creating if needed) a store rooted at `root`, advertising
    /// URLs under `hostname`
    pub fn new(root: &Path, hostname: &str) -> Result<Self, StorageError> {
        std::fs::create_dir_all(root).map_err(|e| StorageError::io(root, e))?;
        Ok(Self {
            root: root.to_path_buf(),
            hostname: hostname.to_string(),
            locks: Mutex::new(HashMap::new()),
        })
    }

    /// Root directory of the store
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Construct an artifact record for an object, without touching disk
    pub fn new_artifact_for(
        &self,
        kind: &str,
        namespace: &str,
        name: &str,
        filename: &str,
    ) -> Artifact {
        let path = format!("{kind}/{namespace}/{name}/{filename}");
        let url = format!("http://{}/{}", self.hostname, path);
        Artifact {
            path,
            url,
            digest: String::new(),
            revision: String::new(),
            metadata: None,
        }
    }

    /// Absolute path of an artifact inside the store
    pub fn artifact_path(&self, artifact: &Artifact) -> PathBuf {
        self.root.join(&artifact.path)
    }

    /// Create the artifact's directory, idempotent on exists
    pub fn mkdir_all(&self, artifact: &Artifact) -> Result<(), StorageError> {
        let dir = self.artifact_dir(artifact);
        std::fs::create_dir_all(&dir).map_err(|e| StorageError::io(&dir, e))
    }

    /// Acquire the exclusive per-artifact lock.
    ///
    /// The guard releases the lock on drop, on every exit path.
    pub async fn lock(&self, artifact: &Artifact) -> OwnedMutexGuard<()> {
        let key = self
            .artifact_dir(artifact)
            .to_string_lossy()
            .into_owned();
        let mutex = {
            let mut locks = self.locks.lock().expect("storage lock table poisoned");
            Arc::clone(locks.entry(key).or_insert_with(|| Arc::new(AsyncMutex::new(()))))
        };
        mutex.lock_owned().await
    }

    /// Archive a staged directory tree as the artifact's tarball
    pub fn archive(&self, artifact: &Artifact, dir: &Path) -> Result<(), StorageError> {
        let dest = self.artifact_path(artifact);
        if let Some(parent) = dest.parent() {
            std::fs::create_dir_all(parent).map_err(|e| StorageError::io(parent, e))?;
        }
        tarball::archive_dir(dir, &dest)?;
        Ok(())
    }

    /// Whether the artifact's tarball exists in the store
    pub fn artifact_exist(&self, artifact: &Artifact) -> bool {
        self.artifact_path(artifact).is_file()
    }

    /// Verify the stored tarball still matches the artifact's content
    /// digest by unpacking it into a scratch directory and recomputing the
    /// dir hash
    pub fn verify_artifact(&self, artifact: &Artifact) -> Result<bool, StorageError> {
        let path = self.artifact_path(artifact);
        if !path.is_file() {
            return Err(StorageError::NotFound(artifact.path.clone()));
        }
        let scratch = tempfile::tempdir().map_err(|e| StorageError::io(&path, e))?;
        let recomputed = match tarball::extract(&path, scratch.path())
            .and_then(|()| hash::hash_directory(scratch.path()))
        {
            Ok(digest) => digest,
            // an unreadable tarball is by definition not matching its digest
            Err(_) => return Ok(false),
        };
        let expected = artifact
            .digest
            .strip_prefix("sha256:")
            .unwrap_or(&artifact.digest);
        Ok(recomputed == expected)
    }

    /// Remove the artifact's tarball, tolerating absence
    pub fn remove(&self, artifact: &Artifact) -> Result<(), StorageError> {
        let path = self.artifact_path(artifact);
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StorageError::io(&path, e)),
        }
    }

    /// Remove everything stored for the artifact's object
    pub fn remove_all(&self, artifact: &Artifact) -> Result<String, StorageError> {
        let dir = self.artifact_dir(artifact);
        match std::fs::remove_dir_all(&dir) {
            Ok(()) => Ok(dir.display().to_string()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(dir.display().to_string()),
            Err(e) => Err(StorageError::io(&dir, e)),
        }
    }

    /// Delete superseded versions of the artifact older than `max_age`,
    /// returning the removed filenames
    pub fn garbage_collect(
        &self,
        artifact: &Artifact,
        max_age: Duration,
    ) -> Result<Vec<String>, StorageError> {
        let dir = self.artifact_dir(artifact);
        let current = artifact.filename();
        let mut removed = Vec::new();

        let entries = match std::fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(removed),
            Err(e) => return Err(StorageError::io(&dir, e)),
        };

        let cutoff = SystemTime::now()
            .checked_sub(max_age)
            .unwrap_or(SystemTime::UNIX_EPOCH);

        for entry in entries {
            let entry = entry.map_err(|e| StorageError::io(&dir, e))?;
            let name = entry.file_name().to_string_lossy().into_owned();
            if name == current {
                continue;
            }
            let meta = match entry.metadata() {
                Ok(meta) if meta.is_file() => meta,
                _ => continue,
            };
            let modified = meta.modified().unwrap_or(SystemTime::UNIX_EPOCH);
            if modified > cutoff {
                continue;
            }
            if let Err(e) = std::fs::remove_file(entry.path()) {
                warn!("failed to garbage collect {}: {}", entry.path().display(), e);
                continue;
            }
            removed.push(name);
        }

        Ok(removed)
    }

    fn artifact_dir(&self, artifact: &Artifact) -> PathBuf {
        self.artifact_path(artifact)
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| self.root.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_artifact_for_layout() {
        let tmp = tempfile::tempdir().unwrap();
        let storage = Storage::new(tmp.path(), "storage.example:9090").unwrap();
        let artifact = storage.new_artifact_for("ExternalArtifact", "apps", "bundle", "abc.tar.gz");
        assert_eq!(artifact.path, "ExternalArtifact/apps/bundle/abc.tar.gz");
        assert_eq!(
            artifact.url,
            "http://storage.example:9090/ExternalArtifact/apps/bundle/abc.tar.gz"
        );
        assert_eq!(artifact.filename(), "abc.tar.gz");
    }

    #[tokio::test]
    async fn test_lock_serializes_same_artifact() {
        let tmp = tempfile::tempdir().unwrap();
        let storage = Storage::new(tmp.path(), "h").unwrap();
        let artifact = storage.new_artifact_for("ExternalArtifact", "ns", "a", "x.tar.gz");

        let guard = storage.lock(&artifact).await;
        let second = tokio::time::timeout(Duration::from_millis(50), storage.lock(&artifact));
        assert!(second.await.is_err(), "second lock should block");
        drop(guard);
        let _ = storage.lock(&artifact).await;
    }
}
