// Populates a workspace with a clone of the destination repository.

use std::path::Path;
use std::sync::Arc;

use repository_sync_common::credentials::RemoteUrlBuilder;
use repository_sync_common::types::RepoSlug;
use tracing::info;

use crate::git::executor::CommandExecutor;
use crate::git::worker::GitWorker;
use crate::outcome::{SyncFailure, SyncStage, SyncState};

/// A local clone of the destination repository.
#[derive(Debug, Clone)]
pub struct ClonedRepo<E> {
    pub destination: RepoSlug,
    pub worker: GitWorker<E>,
}

#[derive(Clone)]
pub struct RepositoryCloner<E> {
    executor: E,
    urls: Arc<dyn RemoteUrlBuilder>,
}

impl<E: CommandExecutor + Clone> RepositoryCloner<E> {
    pub fn new(executor: E, urls: Arc<dyn RemoteUrlBuilder>) -> Self {
        Self { executor, urls }
    }

    /// Clone `destination` into `<workspace>/<owner>/<name>`.
    pub fn clone_repo(
        &self,
        destination: &RepoSlug,
        token: &str,
        workspace: &Path,
    ) -> Result<ClonedRepo<E>, SyncFailure> {
        let url = self
            .urls
            .authenticated_url(destination, token)
            .map_err(|error| {
                SyncFailure::from_credentials(SyncStage::Clone, SyncState::Started, error)
            })?;

        info!(destination = %destination, "cloning destination repository");
        let worker = GitWorker::clone_into(
            self.executor.clone(),
            workspace,
            &url,
            &destination.to_string(),
            token,
        )
        .map_err(|error| SyncFailure::from_git(SyncStage::Clone, SyncState::Started, error))?;

        Ok(ClonedRepo { destination: destination.clone(), worker })
    }
}
