// Server configuration.
//
// Everything is read from environment variables once at startup, with
// defaults for local development.

use std::fmt::{Debug, Formatter};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use repository_sync_common::credentials::{CredentialError, TokenUrlBuilder, DEFAULT_GIT_BASE_URL};
use repository_sync_worker::engine::ConflictPolicy;
use repository_sync_worker::git::worker::CommitIdentity;
use repository_sync_worker::pipeline::PipelineSettings;
use repository_sync_worker::validate::TokenPolicy;
use repository_sync_worker::workspace::default_workspace_root;
use thiserror::Error;

/// Runtime environment. Development disables the token check and keeps
/// workspaces on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Development,
    Production,
}

impl Environment {
    fn parse(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "development" | "dev" => Self::Development,
            _ => Self::Production,
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("REPOSITORY_SYNC_TOKEN must be set outside development mode")]
    MissingToken,

    #[error(transparent)]
    GitBaseUrl(#[from] CredentialError),
}

/// Core server configuration.
///
/// Constructed via [`ServerConfig::from_env`].
#[derive(Clone)]
pub struct ServerConfig {
    /// Listen address (host:port).
    pub listen_addr: SocketAddr,
    pub environment: Environment,
    /// Expected `token` parameter on webhook calls.
    pub sync_token: Option<String>,
    /// Directory that per-run workspaces are created under.
    pub workspace_root: PathBuf,
    /// Host (and optional path prefix) of the repositories being synced.
    pub git_base_url: String,
    pub committer_name: String,
    pub committer_email: String,
    /// Fail the run when the squash merge is not clean.
    pub abort_on_conflict: bool,
    /// Log filter directive used when `RUST_LOG` is unset.
    pub log_filter: String,
}

impl ServerConfig {
    /// Parse configuration from environment variables.
    ///
    /// | Variable | Default |
    /// |---|---|
    /// | `REPOSITORY_SYNC_HOST` | `0.0.0.0` |
    /// | `REPOSITORY_SYNC_PORT` | `4567` |
    /// | `REPOSITORY_SYNC_ENV` | `production` |
    /// | `REPOSITORY_SYNC_TOKEN` | *(none, required in production)* |
    /// | `REPOSITORY_SYNC_WORKSPACE_ROOT` | `<temp>/repository-sync/repos` |
    /// | `REPOSITORY_SYNC_GIT_BASE_URL` | `https://github.com` |
    /// | `REPOSITORY_SYNC_COMMITTER_NAME` | `Repository Sync` |
    /// | `REPOSITORY_SYNC_COMMITTER_EMAIL` | `repository-sync@localhost` |
    /// | `REPOSITORY_SYNC_ABORT_ON_CONFLICT` | `false` |
    /// | `REPOSITORY_SYNC_LOG_FILTER` | `info` |
    pub fn from_env() -> Self {
        Self::from_env_fn(|key| std::env::var(key))
    }

    fn from_env_fn<F>(env: F) -> Self
    where
        F: Fn(&str) -> Result<String, std::env::VarError>,
    {
        let host = env("REPOSITORY_SYNC_HOST").unwrap_or_else(|_| "0.0.0.0".into());
        let port: u16 =
            env("REPOSITORY_SYNC_PORT").ok().and_then(|v| v.parse().ok()).unwrap_or(4567);
        let listen_addr = format!("{host}:{port}")
            .parse()
            .unwrap_or_else(|_| SocketAddr::from(([0, 0, 0, 0], port)));

        let environment = env("REPOSITORY_SYNC_ENV")
            .map(|v| Environment::parse(&v))
            .unwrap_or(Environment::Production);

        let sync_token = env("REPOSITORY_SYNC_TOKEN").ok().filter(|v| !v.is_empty());

        let workspace_root = env("REPOSITORY_SYNC_WORKSPACE_ROOT")
            .ok()
            .filter(|v| !v.trim().is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(default_workspace_root);

        let git_base_url =
            env("REPOSITORY_SYNC_GIT_BASE_URL").unwrap_or_else(|_| DEFAULT_GIT_BASE_URL.into());

        let identity = CommitIdentity::default();
        let committer_name = env("REPOSITORY_SYNC_COMMITTER_NAME").unwrap_or(identity.name);
        let committer_email = env("REPOSITORY_SYNC_COMMITTER_EMAIL").unwrap_or(identity.email);

        let abort_on_conflict =
            env("REPOSITORY_SYNC_ABORT_ON_CONFLICT").map(|v| parse_flag(&v)).unwrap_or(false);

        let log_filter = env("REPOSITORY_SYNC_LOG_FILTER").unwrap_or_else(|_| "info".into());

        Self {
            listen_addr,
            environment,
            sync_token,
            workspace_root,
            git_base_url,
            committer_name,
            committer_email,
            abort_on_conflict,
            log_filter,
        }
    }

    pub fn is_development(&self) -> bool {
        self.environment == Environment::Development
    }

    pub fn token_policy(&self) -> Result<TokenPolicy, ConfigError> {
        if self.is_development() {
            return Ok(TokenPolicy::AllowAll);
        }
        self.sync_token.clone().map(TokenPolicy::Require).ok_or(ConfigError::MissingToken)
    }

    pub fn pipeline_settings(&self) -> Result<PipelineSettings, ConfigError> {
        let urls = TokenUrlBuilder::new(&self.git_base_url)?;
        Ok(PipelineSettings {
            workspace_root: self.workspace_root.clone(),
            retain_workspaces: self.is_development(),
            urls: Arc::new(urls),
            conflict_policy: if self.abort_on_conflict {
                ConflictPolicy::Abort
            } else {
                ConflictPolicy::Proceed
            },
            identity: CommitIdentity {
                name: self.committer_name.clone(),
                email: self.committer_email.clone(),
            },
        })
    }
}

impl Debug for ServerConfig {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerConfig")
            .field("listen_addr", &self.listen_addr)
            .field("environment", &self.environment)
            .field("sync_token", &self.sync_token.as_ref().map(|_| "***"))
            .field("workspace_root", &self.workspace_root)
            .field("git_base_url", &self.git_base_url)
            .field("committer_name", &self.committer_name)
            .field("committer_email", &self.committer_email)
            .field("abort_on_conflict", &self.abort_on_conflict)
            .field("log_filter", &self.log_filter)
            .finish()
    }
}

fn parse_flag(value: &str) -> bool {
    matches!(value.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on")
}
