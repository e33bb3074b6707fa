// Core domain types shared across all repository-sync crates.

use std::fmt::{Debug, Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The only ref a push event may target for a sync to run.
pub const MASTER_REF: &str = "refs/heads/master";

/// Maximum length of a single `owner` or `name` segment.
const MAX_SEGMENT_CHARS: usize = 100;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RepoSlugError {
    #[error("repository identifier is empty")]
    Empty,

    #[error("repository identifier must have the form `owner/name`: {0}")]
    Shape(String),

    #[error("repository segment exceeds maximum length of {MAX_SEGMENT_CHARS} characters")]
    TooLong,

    #[error("repository segment is not allowed: {0}")]
    InvalidSegment(String),
}

/// A validated `owner/name` repository identifier.
///
/// Segments are restricted to ASCII alphanumerics, `-`, `_` and `.`, which
/// keeps them safe both as URL path segments and as directory names inside a
/// workspace.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RepoSlug {
    owner: String,
    name: String,
}

impl RepoSlug {
    pub fn new(owner: &str, name: &str) -> Result<Self, RepoSlugError> {
        validate_segment(owner)?;
        validate_segment(name)?;
        // The URL builder appends `.git` itself.
        if name.to_ascii_lowercase().ends_with(".git") {
            return Err(RepoSlugError::InvalidSegment(name.to_string()));
        }
        Ok(Self { owner: owner.to_string(), name: name.to_string() })
    }

    /// Parse `owner/name`. Surrounding whitespace is ignored.
    pub fn parse(input: &str) -> Result<Self, RepoSlugError> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(RepoSlugError::Empty);
        }

        let (owner, name) =
            trimmed.split_once('/').ok_or_else(|| RepoSlugError::Shape(trimmed.to_string()))?;
        if name.contains('/') {
            return Err(RepoSlugError::Shape(trimmed.to_string()));
        }

        Self::new(owner, name)
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

fn validate_segment(segment: &str) -> Result<(), RepoSlugError> {
    if segment.is_empty() {
        return Err(RepoSlugError::InvalidSegment("(empty segment)".to_string()));
    }
    if segment.chars().count() > MAX_SEGMENT_CHARS {
        return Err(RepoSlugError::TooLong);
    }
    if segment == "." || segment == ".." {
        return Err(RepoSlugError::InvalidSegment(segment.to_string()));
    }
    if !segment.chars().all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.')) {
        return Err(RepoSlugError::InvalidSegment(segment.to_string()));
    }
    Ok(())
}

impl Display for RepoSlug {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}

impl Debug for RepoSlug {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "RepoSlug({self})")
    }
}

impl FromStr for RepoSlug {
    type Err = RepoSlugError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for RepoSlug {
    type Error = RepoSlugError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<RepoSlug> for String {
    fn from(value: RepoSlug) -> Self {
        value.to_string()
    }
}

// ── Webhook payload ────────────────────────────────────────────────

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PayloadError {
    #[error("payload is not valid JSON: {0}")]
    Json(String),

    #[error("payload repository has no owner name")]
    MissingOwner,

    #[error("payload repository is invalid: {0}")]
    Origin(#[from] RepoSlugError),
}

/// The subset of a push event the sync needs.
///
/// Unknown fields are ignored so full GitHub push events deserialize as-is.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebhookPayload {
    pub repository: PayloadRepository,
    #[serde(rename = "ref")]
    pub reference: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayloadRepository {
    pub owner: PayloadOwner,
    pub name: String,
}

/// Form-encoded push events carry `owner.name`; JSON ones carry `owner.login`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayloadOwner {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub login: Option<String>,
}

impl WebhookPayload {
    pub fn parse(raw: &str) -> Result<Self, PayloadError> {
        serde_json::from_str(raw).map_err(|error| PayloadError::Json(error.to_string()))
    }

    pub fn owner_name(&self) -> Option<&str> {
        self.repository
            .owner
            .name
            .as_deref()
            .or(self.repository.owner.login.as_deref())
            .filter(|owner| !owner.is_empty())
    }

    pub fn repository_name(&self) -> &str {
        &self.repository.name
    }

    pub fn is_master(&self) -> bool {
        self.reference == MASTER_REF
    }

    /// The repository the push landed on, as `owner/name`.
    pub fn origin(&self) -> Result<RepoSlug, PayloadError> {
        let owner = self.owner_name().ok_or(PayloadError::MissingOwner)?;
        Ok(RepoSlug::new(owner, self.repository_name())?)
    }
}

// ── Request parameters ─────────────────────────────────────────────

/// Raw `/update_public` parameters, before validation.
#[derive(Clone, Default, PartialEq, Eq, Deserialize)]
pub struct SyncParams {
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub payload: Option<String>,
    #[serde(default)]
    pub dest_repo: Option<String>,
}

impl SyncParams {
    /// Overlay `other` on top of `self`; values present in `other` win.
    pub fn merged_with(self, other: SyncParams) -> SyncParams {
        SyncParams {
            token: other.token.or(self.token),
            payload: other.payload.or(self.payload),
            dest_repo: other.dest_repo.or(self.dest_repo),
        }
    }
}

impl Debug for SyncParams {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncParams")
            .field("token", &self.token.as_ref().map(|_| "***"))
            .field("payload_bytes", &self.payload.as_ref().map(String::len))
            .field("dest_repo", &self.dest_repo)
            .finish()
    }
}

// ── Validated request ──────────────────────────────────────────────

/// One validated sync request. Built once per inbound request and never
/// mutated afterwards.
#[derive(Clone, PartialEq, Eq)]
pub struct SyncRequest {
    token: String,
    destination: RepoSlug,
    origin: RepoSlug,
    payload: WebhookPayload,
}

impl SyncRequest {
    pub fn new(
        token: impl Into<String>,
        destination: RepoSlug,
        payload: WebhookPayload,
    ) -> Result<Self, PayloadError> {
        let origin = payload.origin()?;
        Ok(Self { token: token.into(), destination, origin, payload })
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn destination(&self) -> &RepoSlug {
        &self.destination
    }

    pub fn origin(&self) -> &RepoSlug {
        &self.origin
    }

    pub fn payload(&self) -> &WebhookPayload {
        &self.payload
    }
}

impl Debug for SyncRequest {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncRequest")
            .field("token", &"***")
            .field("destination", &self.destination)
            .field("origin", &self.origin)
            .field("ref", &self.payload.reference)
            .finish()
    }
}
