use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};

use repository_sync_common::credentials::{redact_secret, AuthenticatedUrl};
use tracing::info;

use super::executor::{CommandExecutor, OutputStream, ProcessCommandExecutor};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GitCommandOutput {
    pub stdout: String,
    pub stderr: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GitWorkerError {
    SpawnFailed { command: String, message: String },
    CommandFailed { command: String, code: Option<i32>, output: String },
}

impl GitWorkerError {
    pub fn command(&self) -> &str {
        match self {
            GitWorkerError::SpawnFailed { command, .. }
            | GitWorkerError::CommandFailed { command, .. } => command,
        }
    }
}

impl Display for GitWorkerError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            GitWorkerError::SpawnFailed { command, message } => {
                write!(f, "failed to run `{command}`: {message}")
            }
            GitWorkerError::CommandFailed { command, code, output } => {
                write!(f, "`{command}` failed with code {:?}: {}", code, output.trim())
            }
        }
    }
}

impl Error for GitWorkerError {}

/// Name and email recorded on sync commits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitIdentity {
    pub name: String,
    pub email: String,
}

impl Default for CommitIdentity {
    fn default() -> Self {
        Self { name: "Repository Sync".to_string(), email: "repository-sync@localhost".to_string() }
    }
}

/// Runs git commands against one local repository.
///
/// Every command's output is streamed to the log line by line. When a secret
/// is attached it is scrubbed from logged lines, command strings and error
/// output.
#[derive(Clone)]
pub struct GitWorker<E = ProcessCommandExecutor> {
    repo_path: PathBuf,
    executor: E,
    secret: Option<String>,
}

impl<E> std::fmt::Debug for GitWorker<E> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GitWorker")
            .field("repo_path", &self.repo_path)
            .field("secret", &self.secret.as_ref().map(|_| "***"))
            .finish_non_exhaustive()
    }
}

impl<E: CommandExecutor> GitWorker<E> {
    pub fn with_executor(repo_path: impl Into<PathBuf>, executor: E) -> Self {
        Self { repo_path: repo_path.into(), executor, secret: None }
    }

    pub fn with_secret(mut self, secret: impl Into<String>) -> Self {
        let secret = secret.into();
        self.secret = if secret.is_empty() { None } else { Some(secret) };
        self
    }

    /// `git clone <url> <target>` run from `parent`; returns a worker bound to
    /// `parent/target`.
    pub fn clone_into(
        executor: E,
        parent: &Path,
        url: &AuthenticatedUrl,
        target: &str,
        secret: &str,
    ) -> Result<Self, GitWorkerError> {
        let launcher = Self::with_executor(parent, executor).with_secret(secret);
        launcher.run_displayed(
            vec!["clone".to_string(), url.expose().to_string(), target.to_string()],
            format!("clone {url} {target}"),
        )?;
        Ok(Self { repo_path: parent.join(target), ..launcher })
    }

    pub fn repo_path(&self) -> &Path {
        &self.repo_path
    }

    pub fn add_remote(
        &self,
        name: &str,
        url: &AuthenticatedUrl,
    ) -> Result<GitCommandOutput, GitWorkerError> {
        self.run_displayed(
            vec![
                "remote".to_string(),
                "add".to_string(),
                name.to_string(),
                url.expose().to_string(),
            ],
            format!("remote add {name} {url}"),
        )
    }

    pub fn fetch(&self, remote: &str) -> Result<GitCommandOutput, GitWorkerError> {
        self.run(vec!["fetch".to_string(), remote.to_string()])
    }

    pub fn checkout_new_branch(&self, branch: &str) -> Result<GitCommandOutput, GitWorkerError> {
        self.run(vec!["checkout".to_string(), "-b".to_string(), branch.to_string()])
    }

    /// Stage `revision` onto the current branch without creating a merge commit.
    pub fn merge_squash(&self, revision: &str) -> Result<GitCommandOutput, GitWorkerError> {
        self.run(vec!["merge".to_string(), "--squash".to_string(), revision.to_string()])
    }

    pub fn commit(
        &self,
        message: &str,
        identity: &CommitIdentity,
    ) -> Result<GitCommandOutput, GitWorkerError> {
        self.run(vec![
            "-c".to_string(),
            format!("user.name={}", identity.name),
            "-c".to_string(),
            format!("user.email={}", identity.email),
            "commit".to_string(),
            "-m".to_string(),
            message.to_string(),
        ])
    }

    /// Paths a conflicting merge left unmerged in the index.
    pub fn unmerged_paths(&self) -> Result<Vec<String>, GitWorkerError> {
        let output = self.run(vec![
            "diff".to_string(),
            "--name-only".to_string(),
            "--diff-filter=U".to_string(),
        ])?;
        Ok(output
            .stdout
            .lines()
            .map(str::trim)
            .filter(|path| !path.is_empty())
            .map(str::to_string)
            .collect())
    }

    pub fn push(&self, remote: &str, branch: &str) -> Result<GitCommandOutput, GitWorkerError> {
        self.run(vec!["push".to_string(), remote.to_string(), branch.to_string()])
    }

    fn redact(&self, text: &str) -> String {
        match &self.secret {
            Some(secret) => redact_secret(text, secret),
            None => text.to_string(),
        }
    }

    fn run(&self, args: Vec<String>) -> Result<GitCommandOutput, GitWorkerError> {
        let display = args.join(" ");
        self.run_displayed(args, display)
    }

    /// Run `args`, logging and reporting the command as `git <display>`.
    /// Arguments that carry a URL are shown in their redacted form.
    fn run_displayed(
        &self,
        args: Vec<String>,
        display: String,
    ) -> Result<GitCommandOutput, GitWorkerError> {
        let command = self.redact(&format!("git {display}"));
        let subcommand = args.iter().find(|arg| !arg.starts_with('-') && !arg.contains('='));
        let subcommand = subcommand.map(String::as_str).unwrap_or("git");

        info!(command = %command, "running git");
        let on_line = |stream: OutputStream, line: &str| {
            info!(git = subcommand, stream = stream.as_str(), "{}", self.redact(line));
        };

        let result =
            self.executor.execute("git", &args, &self.repo_path, &on_line).map_err(|error| {
                GitWorkerError::SpawnFailed { command: command.clone(), message: error.to_string() }
            })?;

        if result.success {
            return Ok(GitCommandOutput {
                stdout: self.redact(&result.stdout),
                stderr: self.redact(&result.stderr),
            });
        }

        let output = if result.stderr.trim().is_empty() { result.stdout } else { result.stderr };

        Err(GitWorkerError::CommandFailed {
            command,
            code: result.code,
            output: self.redact(&output),
        })
    }
}
