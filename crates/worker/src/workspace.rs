// Per-run scratch directories.
//
// Each run gets `<root>/<unix-seconds>-<uuid>`. The leaf is created with
// `create_dir`, never `create_dir_all`, so a name that already exists is an
// error instead of a shared directory. Removal happens in `Drop`.

use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

/// Default workspace root below the system temp directory.
pub fn default_workspace_root() -> PathBuf {
    std::env::temp_dir().join("repository-sync").join("repos")
}

#[derive(Debug, Error)]
pub enum WorkspaceError {
    #[error("failed to create workspace root `{path}`: {source}")]
    CreateRoot { path: PathBuf, source: io::Error },

    #[error("workspace `{path}` already exists")]
    Collision { path: PathBuf },

    #[error("failed to create workspace `{path}`: {source}")]
    Create { path: PathBuf, source: io::Error },
}

#[derive(Debug, Clone)]
pub struct WorkspaceManager {
    root: PathBuf,
    retain: bool,
}

impl WorkspaceManager {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into(), retain: false }
    }

    /// Keep workspaces on disk after the run (development mode).
    pub fn retaining(mut self, retain: bool) -> Self {
        self.retain = retain;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn acquire(&self) -> Result<Workspace, WorkspaceError> {
        std::fs::create_dir_all(&self.root)
            .map_err(|source| WorkspaceError::CreateRoot { path: self.root.clone(), source })?;

        let created_at = Utc::now();
        let leaf = format!("{}-{}", created_at.timestamp(), Uuid::new_v4().simple());
        let path = self.root.join(leaf);

        match std::fs::create_dir(&path) {
            Ok(()) => {}
            Err(error) if error.kind() == io::ErrorKind::AlreadyExists => {
                return Err(WorkspaceError::Collision { path });
            }
            Err(source) => return Err(WorkspaceError::Create { path, source }),
        }

        info!(path = %path.display(), "workspace created");
        Ok(Workspace { path, created_at, retain: self.retain })
    }

    /// Run `f` inside a fresh workspace. The directory is removed when `f`
    /// returns or unwinds, unless the manager retains workspaces.
    pub fn with_workspace<T>(&self, f: impl FnOnce(&Workspace) -> T) -> Result<T, WorkspaceError> {
        let workspace = self.acquire()?;
        Ok(f(&workspace))
    }
}

/// An acquired workspace directory. Removed on drop.
#[derive(Debug)]
pub struct Workspace {
    path: PathBuf,
    created_at: DateTime<Utc>,
    retain: bool,
}

impl Workspace {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}

impl Drop for Workspace {
    fn drop(&mut self) {
        if self.retain {
            info!(path = %self.path.display(), "retaining workspace for inspection");
            return;
        }

        match std::fs::remove_dir_all(&self.path) {
            Ok(()) => info!(path = %self.path.display(), "workspace removed"),
            Err(error) if error.kind() == io::ErrorKind::NotFound => {}
            Err(error) => {
                warn!(path = %self.path.display(), error = %error, "failed to remove workspace")
            }
        }
    }
}
