// Request gatekeeping: authorization, required parameters and the branch
// policy, checked in that order before any filesystem or network work.

use repository_sync_common::types::{
    PayloadError, RepoSlug, RepoSlugError, SyncParams, SyncRequest, WebhookPayload,
};
use thiserror::Error;

/// How the inbound `token` parameter is checked.
#[derive(Clone, PartialEq, Eq)]
pub enum TokenPolicy {
    /// The token must equal this secret.
    Require(String),
    /// Development mode: every token passes.
    AllowAll,
}

impl std::fmt::Debug for TokenPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Require(_) => f.write_str("Require(***)"),
            Self::AllowAll => f.write_str("AllowAll"),
        }
    }
}

impl TokenPolicy {
    pub fn permits(&self, token: Option<&str>) -> bool {
        match self {
            Self::AllowAll => true,
            Self::Require(secret) => {
                token.is_some_and(|token| constant_time_eq(token.as_bytes(), secret.as_bytes()))
            }
        }
    }
}

fn constant_time_eq(left: &[u8], right: &[u8]) -> bool {
    if left.len() != right.len() {
        return false;
    }
    left.iter().zip(right).fold(0u8, |acc, (a, b)| acc | (a ^ b)) == 0
}

/// Broad class of a rejection, used to pick the response status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectKind {
    Authentication,
    Validation,
    Policy,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RejectReason {
    #[error("token did not match")]
    TokenMismatch,

    #[error("missing destination")]
    MissingDestination,

    #[error("invalid destination: {0}")]
    InvalidDestination(#[source] RepoSlugError),

    #[error("missing payload")]
    MissingPayload,

    #[error("invalid payload: {0}")]
    InvalidPayload(#[source] PayloadError),

    #[error("not master: {reference}")]
    NotMaster { reference: String },
}

impl RejectReason {
    pub const fn kind(&self) -> RejectKind {
        match self {
            Self::TokenMismatch => RejectKind::Authentication,
            Self::MissingDestination
            | Self::InvalidDestination(_)
            | Self::MissingPayload
            | Self::InvalidPayload(_) => RejectKind::Validation,
            Self::NotMaster { .. } => RejectKind::Policy,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PayloadValidator {
    policy: TokenPolicy,
}

impl PayloadValidator {
    pub fn new(policy: TokenPolicy) -> Self {
        Self { policy }
    }

    /// Check `params` and build the request the pipeline runs on.
    ///
    /// Stops at the first failure: token, then destination, then payload,
    /// then the ref.
    pub fn validate(&self, params: &SyncParams) -> Result<SyncRequest, RejectReason> {
        let token = params.token.as_deref();
        if !self.policy.permits(token) {
            return Err(RejectReason::TokenMismatch);
        }

        let destination = params
            .dest_repo
            .as_deref()
            .filter(|value| !value.trim().is_empty())
            .ok_or(RejectReason::MissingDestination)?;
        let destination = RepoSlug::parse(destination).map_err(RejectReason::InvalidDestination)?;

        let raw_payload = params
            .payload
            .as_deref()
            .filter(|value| !value.trim().is_empty())
            .ok_or(RejectReason::MissingPayload)?;
        let payload = WebhookPayload::parse(raw_payload).map_err(RejectReason::InvalidPayload)?;

        if !payload.is_master() {
            return Err(RejectReason::NotMaster { reference: payload.reference });
        }

        SyncRequest::new(token.unwrap_or_default(), destination, payload)
            .map_err(RejectReason::InvalidPayload)
    }
}
