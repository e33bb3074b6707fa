// Token-embedded remote URLs for non-interactive git access.
//
// The URLs built here carry a secret. They must only ever be handed to a
// subprocess as an argument; everything that is logged or stored goes through
// the redacted `Display` form or `redact_secret`.

use std::fmt::{Debug, Display, Formatter};

use thiserror::Error;
use url::Url;

use crate::types::RepoSlug;

/// Default host for destination and origin repositories.
pub const DEFAULT_GIT_BASE_URL: &str = "https://github.com";

/// Password GitHub expects alongside a token used as the username.
pub const OAUTH_BASIC_PASSWORD: &str = "x-oauth-basic";

const REDACTED: &str = "***";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CredentialError {
    #[error("invalid git base URL `{0}`")]
    InvalidBaseUrl(String),

    #[error("git base URL `{0}` cannot carry credentials")]
    CannotCarryCredentials(String),
}

/// A remote URL that may embed an access token.
///
/// `Debug` and `Display` show the redacted form.
#[derive(Clone, PartialEq, Eq)]
pub struct AuthenticatedUrl {
    value: String,
    redacted: String,
}

impl AuthenticatedUrl {
    /// Wrap a remote location that carries no credentials (e.g. a local path).
    pub fn plain(location: impl Into<String>) -> Self {
        let value = location.into();
        Self { redacted: value.clone(), value }
    }

    fn from_url(url: Url) -> Self {
        let mut redacted = url.clone();
        if !redacted.username().is_empty() {
            // Both setters only fail for URLs that cannot carry credentials,
            // which `url` could not have had credentials set on either.
            let _ = redacted.set_username(REDACTED);
            let _ = redacted.set_password(None);
        }
        Self { value: url.into(), redacted: redacted.into() }
    }

    /// The real URL, including the token. Pass it to git; never log it.
    pub fn expose(&self) -> &str {
        &self.value
    }
}

impl Display for AuthenticatedUrl {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.redacted)
    }
}

impl Debug for AuthenticatedUrl {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "AuthenticatedUrl({})", self.redacted)
    }
}

/// Build `https://<token>:x-oauth-basic@<host>/<owner>/<name>.git`.
///
/// Any path on `base` is kept as a prefix, so a base of
/// `https://git.example.com/mirror` yields
/// `https://<token>:x-oauth-basic@git.example.com/mirror/<owner>/<name>.git`.
/// An empty token produces an anonymous URL.
pub fn build_authenticated_url(
    base: &Url,
    repo: &RepoSlug,
    token: &str,
) -> Result<AuthenticatedUrl, CredentialError> {
    if base.cannot_be_a_base() {
        return Err(CredentialError::CannotCarryCredentials(base.to_string()));
    }

    let mut url = base.clone();
    let prefix = url.path().trim_end_matches('/').to_string();
    url.set_path(&format!("{prefix}/{}/{}.git", repo.owner(), repo.name()));
    url.set_query(None);
    url.set_fragment(None);

    if !token.is_empty() {
        url.set_username(token)
            .map_err(|_| CredentialError::CannotCarryCredentials(base.to_string()))?;
        url.set_password(Some(OAUTH_BASIC_PASSWORD))
            .map_err(|_| CredentialError::CannotCarryCredentials(base.to_string()))?;
    }

    Ok(AuthenticatedUrl::from_url(url))
}

/// Replace every occurrence of `secret` in `text` with `***`, both verbatim
/// and in the percent-encoded form it takes inside a URL's userinfo.
pub fn redact_secret(text: &str, secret: &str) -> String {
    if secret.is_empty() {
        return text.to_string();
    }
    let mut redacted = text.to_string();
    if let Some(encoded) = userinfo_encoded(secret).filter(|encoded| encoded != secret) {
        redacted = redacted.replace(&encoded, REDACTED);
    }
    redacted.replace(secret, REDACTED)
}

fn userinfo_encoded(secret: &str) -> Option<String> {
    let mut carrier = Url::parse("https://redacted.invalid").ok()?;
    carrier.set_username(secret).ok()?;
    Some(carrier.username().to_string())
}

/// Resolves a repository identifier to the remote URL git should use.
pub trait RemoteUrlBuilder: Send + Sync {
    fn authenticated_url(
        &self,
        repo: &RepoSlug,
        token: &str,
    ) -> Result<AuthenticatedUrl, CredentialError>;
}

/// Builds token-embedded HTTPS URLs under a fixed base.
#[derive(Debug, Clone)]
pub struct TokenUrlBuilder {
    base: Url,
}

impl TokenUrlBuilder {
    pub fn new(base: &str) -> Result<Self, CredentialError> {
        let base = Url::parse(base).map_err(|_| CredentialError::InvalidBaseUrl(base.to_string()))?;
        if base.cannot_be_a_base() || base.host_str().is_none() {
            return Err(CredentialError::CannotCarryCredentials(base.to_string()));
        }
        Ok(Self { base })
    }

    pub fn base(&self) -> &Url {
        &self.base
    }
}

impl Default for TokenUrlBuilder {
    fn default() -> Self {
        Self { base: Url::parse(DEFAULT_GIT_BASE_URL).expect("default git base URL is valid") }
    }
}

impl RemoteUrlBuilder for TokenUrlBuilder {
    fn authenticated_url(
        &self,
        repo: &RepoSlug,
        token: &str,
    ) -> Result<AuthenticatedUrl, CredentialError> {
        build_authenticated_url(&self.base, repo, token)
    }
}
