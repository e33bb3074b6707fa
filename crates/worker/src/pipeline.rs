// One sync run end to end: workspace → clone → merge sequence → cleanup.

use std::path::PathBuf;
use std::sync::Arc;

use repository_sync_common::credentials::{RemoteUrlBuilder, TokenUrlBuilder};
use repository_sync_common::types::SyncRequest;
use tracing::{info, warn};

use crate::clone::RepositoryCloner;
use crate::engine::{ConflictPolicy, SyncEngine};
use crate::git::executor::{CommandExecutor, ProcessCommandExecutor};
use crate::git::worker::CommitIdentity;
use crate::outcome::{SyncFailure, SyncOutcome};
use crate::workspace::{default_workspace_root, WorkspaceManager};

/// Runs a validated request to completion. Blocking.
pub trait SyncRunner: Send + Sync {
    fn run(&self, request: &SyncRequest) -> Result<SyncOutcome, SyncFailure>;
}

#[derive(Clone)]
pub struct PipelineSettings {
    pub workspace_root: PathBuf,
    pub retain_workspaces: bool,
    pub urls: Arc<dyn RemoteUrlBuilder>,
    pub conflict_policy: ConflictPolicy,
    pub identity: CommitIdentity,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            workspace_root: default_workspace_root(),
            retain_workspaces: false,
            urls: Arc::new(TokenUrlBuilder::default()),
            conflict_policy: ConflictPolicy::default(),
            identity: CommitIdentity::default(),
        }
    }
}

#[derive(Clone)]
pub struct SyncPipeline<E = ProcessCommandExecutor> {
    workspaces: WorkspaceManager,
    cloner: RepositoryCloner<E>,
    engine: SyncEngine,
}

impl SyncPipeline<ProcessCommandExecutor> {
    pub fn new(settings: PipelineSettings) -> Self {
        Self::with_executor(settings, ProcessCommandExecutor::non_interactive())
    }
}

impl<E: CommandExecutor + Clone> SyncPipeline<E> {
    pub fn with_executor(settings: PipelineSettings, executor: E) -> Self {
        Self {
            workspaces: WorkspaceManager::new(settings.workspace_root)
                .retaining(settings.retain_workspaces),
            cloner: RepositoryCloner::new(executor, Arc::clone(&settings.urls)),
            engine: SyncEngine::new(settings.urls)
                .with_conflict_policy(settings.conflict_policy)
                .with_identity(settings.identity),
        }
    }
}

impl<E: CommandExecutor + Clone> SyncRunner for SyncPipeline<E> {
    fn run(&self, request: &SyncRequest) -> Result<SyncOutcome, SyncFailure> {
        info!(
            destination = %request.destination(),
            origin = %request.origin(),
            "starting sync"
        );

        let result = self
            .workspaces
            .with_workspace(|workspace| {
                let repo = self.cloner.clone_repo(
                    request.destination(),
                    request.token(),
                    workspace.path(),
                )?;
                self.engine.synchronize(&repo, request.origin(), request.token())
            })
            .map_err(SyncFailure::from_workspace)
            .and_then(|result| result);

        match &result {
            Ok(outcome) => info!(
                destination = %outcome.destination,
                branch = %outcome.branch,
                merge_clean = outcome.merge_clean,
                "sync finished"
            ),
            Err(failure) => warn!(
                destination = %request.destination(),
                stage = failure.stage.as_str(),
                code = ?failure.code,
                output = %failure.output.trim(),
                "sync failed"
            ),
        }

        result
    }
}
