// Results of a sync run: the stage/state model and the success and failure
// values handed back to the caller.

use std::fmt::{Display, Formatter};

use repository_sync_common::credentials::CredentialError;
use repository_sync_common::types::RepoSlug;
use thiserror::Error;

use crate::git::worker::GitWorkerError;
use crate::workspace::WorkspaceError;

/// The step of the pipeline an error came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SyncStage {
    Workspace,
    Clone,
    Remote,
    Fetch,
    Branch,
    Merge,
    Commit,
    Push,
}

impl SyncStage {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Workspace => "workspace",
            Self::Clone => "clone",
            Self::Remote => "remote",
            Self::Fetch => "fetch",
            Self::Branch => "branch",
            Self::Merge => "merge",
            Self::Commit => "commit",
            Self::Push => "push",
        }
    }
}

impl Display for SyncStage {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Progress of one run. Advances strictly in declaration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum SyncState {
    Started,
    Cloned,
    RemoteAdded,
    Fetched,
    BranchCreated,
    Merged,
    Committed,
    Pushed,
}

impl SyncState {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Started => "started",
            Self::Cloned => "cloned",
            Self::RemoteAdded => "remote_added",
            Self::Fetched => "fetched",
            Self::BranchCreated => "branch_created",
            Self::Merged => "merged",
            Self::Committed => "committed",
            Self::Pushed => "pushed",
        }
    }

    /// The stage that moves a run out of this state, or `None` once done.
    pub const fn next_stage(self) -> Option<SyncStage> {
        match self {
            Self::Started => Some(SyncStage::Clone),
            Self::Cloned => Some(SyncStage::Remote),
            Self::RemoteAdded => Some(SyncStage::Fetch),
            Self::Fetched => Some(SyncStage::Branch),
            Self::BranchCreated => Some(SyncStage::Merge),
            Self::Merged => Some(SyncStage::Commit),
            Self::Committed => Some(SyncStage::Push),
            Self::Pushed => None,
        }
    }

    /// The state reached once `next_stage` succeeds.
    pub const fn advance(self) -> Self {
        match self {
            Self::Started => Self::Cloned,
            Self::Cloned => Self::RemoteAdded,
            Self::RemoteAdded => Self::Fetched,
            Self::Fetched => Self::BranchCreated,
            Self::BranchCreated => Self::Merged,
            Self::Merged => Self::Committed,
            Self::Committed | Self::Pushed => Self::Pushed,
        }
    }
}

/// A completed run: the new branch is on the destination's `origin`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncOutcome {
    pub destination: RepoSlug,
    pub origin: RepoSlug,
    pub remote: String,
    pub branch: String,
    /// False when the squash merge exited non-zero and the run continued.
    pub merge_clean: bool,
}

/// A run that stopped at `stage`. Command and output are already redacted.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("sync failed during `{stage}` stage: {message}")]
pub struct SyncFailure {
    pub stage: SyncStage,
    /// Last state the run reached before failing.
    pub reached: SyncState,
    pub message: String,
    pub command: Option<String>,
    pub code: Option<i32>,
    pub output: String,
}

impl SyncFailure {
    pub fn from_git(stage: SyncStage, reached: SyncState, error: GitWorkerError) -> Self {
        let message = error.to_string();
        match error {
            GitWorkerError::SpawnFailed { command, .. } => Self {
                stage,
                reached,
                message,
                command: Some(command),
                code: None,
                output: String::new(),
            },
            GitWorkerError::CommandFailed { command, code, output } => {
                Self { stage, reached, message, command: Some(command), code, output }
            }
        }
    }

    pub fn from_credentials(stage: SyncStage, reached: SyncState, error: CredentialError) -> Self {
        Self {
            stage,
            reached,
            message: error.to_string(),
            command: None,
            code: None,
            output: String::new(),
        }
    }

    pub fn from_workspace(error: WorkspaceError) -> Self {
        Self {
            stage: SyncStage::Workspace,
            reached: SyncState::Started,
            message: error.to_string(),
            command: None,
            code: None,
            output: String::new(),
        }
    }
}
