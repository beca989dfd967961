//! Workspace lifecycle management
//!
//! Every execution owns one scratch directory for its source file and
//! compiler artifacts. Directories are created with unpredictable unique
//! names under the scratch root and removed when the execution ends.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tempfile::TempDir;
use thiserror::Error;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::{debug, instrument, warn};

/// Prefix of every workspace directory name
pub const WORKSPACE_PREFIX: &str = "ferrule-";

/// Errors that occur while managing workspaces
#[derive(Debug, Error)]
pub enum WorkspaceError {
    #[error("failed to create workspace under {root}: {source}")]
    Create {
        root: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to remove workspace {path}: {source}")]
    Remove {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("workspace manager is shut down")]
    Closed,

    #[error("invalid path: {0}")]
    InvalidPath(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A scratch directory exclusively owned by one execution
///
/// Release it through [`WorkspaceManager::release`]. Dropping a workspace
/// that was not released still removes the directory (best effort) and logs
/// a warning, which covers panics and cancelled tasks.
#[derive(Debug)]
pub struct Workspace {
    /// Backing directory, `None` once removed
    dir: Option<TempDir>,

    /// Path to the directory
    path: PathBuf,

    /// Concurrency permit held for the lifetime of the workspace
    _permit: Option<OwnedSemaphorePermit>,
}

impl Workspace {
    /// Create a workspace directly under `root` without a concurrency permit
    pub fn create_in(root: &Path) -> Result<Self, WorkspaceError> {
        std::fs::create_dir_all(root).map_err(|source| WorkspaceError::Create {
            root: root.to_path_buf(),
            source,
        })?;

        let dir = tempfile::Builder::new()
            .prefix(WORKSPACE_PREFIX)
            .tempdir_in(root)
            .map_err(|source| WorkspaceError::Create {
                root: root.to_path_buf(),
                source,
            })?;
        let path = dir.path().to_path_buf();

        debug!(?path, "workspace created");

        Ok(Self {
            dir: Some(dir),
            path,
            _permit: None,
        })
    }

    /// Get the path to the workspace directory
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Get the path to a file inside the workspace
    ///
    /// Returns an error if the name would escape the workspace.
    pub fn file_path(&self, name: &str) -> Result<PathBuf, WorkspaceError> {
        if name.is_empty() || name.contains("..") || name.starts_with('/') {
            return Err(WorkspaceError::InvalidPath(format!(
                "path traversal not allowed: {name}"
            )));
        }
        Ok(self.path.join(name))
    }

    /// Write a file into the workspace
    #[instrument(skip(self, content))]
    pub async fn write_file(&self, name: &str, content: &[u8]) -> Result<PathBuf, WorkspaceError> {
        let path = self.file_path(name)?;

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        tokio::fs::write(&path, content).await?;
        debug!(?path, len = content.len(), "wrote file to workspace");
        Ok(path)
    }

    /// Read a file from the workspace
    pub async fn read_file(&self, name: &str) -> Result<Vec<u8>, WorkspaceError> {
        let path = self.file_path(name)?;
        Ok(tokio::fs::read(&path).await?)
    }

    /// Check if a file exists in the workspace
    pub async fn file_exists(&self, name: &str) -> Result<bool, WorkspaceError> {
        let path = self.file_path(name)?;
        Ok(tokio::fs::try_exists(&path).await?)
    }

    /// Remove the directory and everything in it
    pub async fn remove(&mut self) -> Result<(), WorkspaceError> {
        let Some(dir) = self.dir.take() else {
            return Ok(());
        };

        let path = self.path.clone();
        let result = tokio::task::spawn_blocking(move || dir.close())
            .await
            .map_err(|join| std::io::Error::other(join.to_string()))
            .and_then(|removed| removed);

        result.map_err(|source| WorkspaceError::Remove { path, source })
    }

    fn with_permit(mut self, permit: OwnedSemaphorePermit) -> Self {
        self._permit = Some(permit);
        self
    }
}

impl Drop for Workspace {
    fn drop(&mut self) {
        if let Some(dir) = self.dir.take() {
            warn!(
                path = %self.path.display(),
                "workspace dropped without release, removing it now"
            );
            if let Err(error) = dir.close() {
                warn!(path = %self.path.display(), %error, "best-effort workspace removal failed");
            }
        }
    }
}

/// Hands out workspaces under one scratch root, bounding how many exist at once
#[derive(Debug, Clone)]
pub struct WorkspaceManager {
    /// Directory that holds all workspaces
    root: PathBuf,

    /// Maximum number of live workspaces
    capacity: usize,

    /// Semaphore limiting live workspaces
    semaphore: Arc<Semaphore>,
}

impl WorkspaceManager {
    /// Create a new manager
    pub fn new(root: impl Into<PathBuf>, capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            root: root.into(),
            capacity,
            semaphore: Arc::new(Semaphore::new(capacity)),
        }
    }

    /// Acquire a fresh, empty workspace
    ///
    /// Waits while `capacity` workspaces are live.
    #[instrument(skip(self), fields(root = %self.root.display()))]
    pub async fn acquire(&self) -> Result<Workspace, WorkspaceError> {
        let permit = self
            .semaphore
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| WorkspaceError::Closed)?;

        let root = self.root.clone();
        let workspace = tokio::task::spawn_blocking(move || Workspace::create_in(&root))
            .await
            .map_err(|join| WorkspaceError::Io(std::io::Error::other(join.to_string())))??;
        Ok(workspace.with_permit(permit))
    }

    /// Remove a workspace, logging instead of returning removal failures
    #[instrument(skip(self, workspace), fields(path = %workspace.path().display()))]
    pub async fn release(&self, mut workspace: Workspace) {
        match workspace.remove().await {
            Ok(()) => debug!("workspace removed"),
            Err(error) => warn!(%error, "failed to remove workspace"),
        }
    }

    /// Directory that holds all workspaces
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Number of workspaces that can still be acquired without waiting
    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }

    /// Maximum number of live workspaces
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn acquire_creates_unique_empty_directories() {
        let root = tempfile::tempdir().unwrap();
        let manager = WorkspaceManager::new(root.path(), 4);

        let first = manager.acquire().await.unwrap();
        let second = manager.acquire().await.unwrap();

        assert_ne!(first.path(), second.path());
        assert!(first.path().starts_with(root.path()));
        assert!(
            first
                .path()
                .file_name()
                .unwrap()
                .to_string_lossy()
                .starts_with(WORKSPACE_PREFIX)
        );
        assert_eq!(std::fs::read_dir(first.path()).unwrap().count(), 0);

        manager.release(first).await;
        manager.release(second).await;
    }

    #[tokio::test(flavor = "current_thread")]
    async fn failed_creation_returns_the_permit() {
        let scratch = tempfile::tempdir().unwrap();
        let blocker = scratch.path().join("not-a-directory");
        std::fs::write(&blocker, b"").unwrap();
        let manager = WorkspaceManager::new(blocker.join("root"), 1);

        for _ in 0..2 {
            let result =
                tokio::time::timeout(std::time::Duration::from_secs(5), manager.acquire())
                    .await
                    .expect("acquire must not wait for a leaked permit");
            assert!(matches!(result, Err(WorkspaceError::Create { .. })));
        }
    }

    #[tokio::test]
    async fn release_removes_directory_and_contents() {
        let root = tempfile::tempdir().unwrap();
        let manager = WorkspaceManager::new(root.path(), 1);

        let workspace = manager.acquire().await.unwrap();
        workspace.write_file("main.py", b"print(1)").await.unwrap();
        workspace.write_file("nested/out.txt", b"x").await.unwrap();
        let path = workspace.path().to_path_buf();

        manager.release(workspace).await;
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn drop_without_release_still_removes() {
        let root = tempfile::tempdir().unwrap();
        let workspace = Workspace::create_in(root.path()).unwrap();
        let path = workspace.path().to_path_buf();
        assert!(path.exists());

        drop(workspace);
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn release_tolerates_already_removed_directory() {
        let root = tempfile::tempdir().unwrap();
        let manager = WorkspaceManager::new(root.path(), 1);
        let workspace = manager.acquire().await.unwrap();

        std::fs::remove_dir_all(workspace.path()).unwrap();
        manager.release(workspace).await;
        assert_eq!(manager.available(), 1);
    }

    #[tokio::test]
    async fn permits_are_returned_on_release() {
        let root = tempfile::tempdir().unwrap();
        let manager = WorkspaceManager::new(root.path(), 2);

        let workspace = manager.acquire().await.unwrap();
        assert_eq!(manager.available(), 1);

        manager.release(workspace).await;
        assert_eq!(manager.available(), 2);
    }

    #[tokio::test]
    async fn acquire_waits_for_capacity() {
        let root = tempfile::tempdir().unwrap();
        let manager = WorkspaceManager::new(root.path(), 1);

        let held = manager.acquire().await.unwrap();
        let blocked =
            tokio::time::timeout(std::time::Duration::from_millis(50), manager.acquire()).await;
        assert!(blocked.is_err());

        manager.release(held).await;
        let next = manager.acquire().await.unwrap();
        manager.release(next).await;
    }

    #[tokio::test]
    async fn acquire_creates_missing_root() {
        let root = tempfile::tempdir().unwrap();
        let nested = root.path().join("a").join("b");
        let manager = WorkspaceManager::new(&nested, 1);

        let workspace = manager.acquire().await.unwrap();
        assert!(workspace.path().starts_with(&nested));
        manager.release(workspace).await;
    }

    #[tokio::test]
    async fn file_operations() {
        let root = tempfile::tempdir().unwrap();
        let manager = WorkspaceManager::new(root.path(), 1);
        let workspace = manager.acquire().await.unwrap();

        assert!(!workspace.file_exists("main.cpp").await.unwrap());
        let written = workspace.write_file("main.cpp", b"int main(){}").await.unwrap();
        assert_eq!(written, workspace.path().join("main.cpp"));
        assert!(workspace.file_exists("main.cpp").await.unwrap());
        assert_eq!(
            workspace.read_file("main.cpp").await.unwrap(),
            b"int main(){}"
        );

        manager.release(workspace).await;
    }

    #[test]
    fn test_file_path_validation() {
        let root = tempfile::tempdir().unwrap();
        let workspace = Workspace::create_in(root.path()).unwrap();

        assert!(workspace.file_path("main.cpp").is_ok());
        assert!(workspace.file_path("subdir/file.txt").is_ok());

        assert!(workspace.file_path("../escape").is_err());
        assert!(workspace.file_path("foo/../bar").is_err());
        assert!(workspace.file_path("/absolute/path").is_err());
        assert!(workspace.file_path("").is_err());
    }
}
