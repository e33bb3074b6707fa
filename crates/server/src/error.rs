use std::future::Future;

use axum::{
    http::{header::HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use repository_sync_worker::outcome::SyncFailure;
use repository_sync_worker::validate::RejectReason;
use uuid::Uuid;

pub const REQUEST_ID_HEADER: &str = "x-request-id";

tokio::task_local! {
    static REQUEST_ID: String;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    TokenMismatch,
    MissingDestination,
    InvalidDestination,
    MissingPayload,
    InvalidPayload,
    NotMaster,
    SyncFailed,
    InternalError,
}

impl ErrorCode {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::TokenMismatch => "TOKEN_MISMATCH",
            Self::MissingDestination => "MISSING_DESTINATION",
            Self::InvalidDestination => "INVALID_DESTINATION",
            Self::MissingPayload => "MISSING_PAYLOAD",
            Self::InvalidPayload => "INVALID_PAYLOAD",
            Self::NotMaster => "NOT_MASTER",
            Self::SyncFailed => "SYNC_FAILED",
            Self::InternalError => "INTERNAL_ERROR",
        }
    }

    /// Rejected requests answer 500, except the branch policy (406).
    pub const fn status(self) -> StatusCode {
        match self {
            Self::TokenMismatch
            | Self::MissingDestination
            | Self::InvalidDestination
            | Self::MissingPayload
            | Self::InvalidPayload
            | Self::InternalError => StatusCode::INTERNAL_SERVER_ERROR,
            Self::NotMaster => StatusCode::NOT_ACCEPTABLE,
            Self::SyncFailed => StatusCode::BAD_GATEWAY,
        }
    }

    pub const fn default_message(self) -> &'static str {
        match self {
            Self::TokenMismatch => "Tokens didn't match!",
            Self::MissingDestination => "Missing `dest_repo` argument",
            Self::InvalidDestination => "Invalid `dest_repo` argument",
            Self::MissingPayload => "Missing `payload` argument",
            Self::InvalidPayload => "Invalid `payload` argument",
            Self::NotMaster => "Payload was not for master, aborting.",
            Self::SyncFailed => "Sync failed, aborting.",
            Self::InternalError => "Sync failed unexpectedly.",
        }
    }
}

impl From<&RejectReason> for ErrorCode {
    fn from(reason: &RejectReason) -> Self {
        match reason {
            RejectReason::TokenMismatch => Self::TokenMismatch,
            RejectReason::MissingDestination => Self::MissingDestination,
            RejectReason::InvalidDestination(_) => Self::InvalidDestination,
            RejectReason::MissingPayload => Self::MissingPayload,
            RejectReason::InvalidPayload(_) => Self::InvalidPayload,
            RejectReason::NotMaster { .. } => Self::NotMaster,
        }
    }
}

/// Plain-text error response for the webhook endpoint.
#[derive(Debug, Clone)]
pub struct SyncHttpError {
    code: ErrorCode,
    message: String,
}

impl SyncHttpError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self { code, message: message.into() }
    }

    pub fn from_code(code: ErrorCode) -> Self {
        Self::new(code, code.default_message())
    }

    pub fn from_reject(reason: &RejectReason) -> Self {
        Self::from_code(ErrorCode::from(reason))
    }

    /// Names the failed stage only; subprocess output stays in the logs.
    pub fn from_failure(failure: &SyncFailure) -> Self {
        Self::new(
            ErrorCode::SyncFailed,
            format!("Sync failed during `{}` stage, aborting.", failure.stage),
        )
    }

    pub fn code(&self) -> ErrorCode {
        self.code
    }
}

impl IntoResponse for SyncHttpError {
    fn into_response(self) -> Response {
        let mut response = (self.code.status(), self.message).into_response();

        if let Some(request_id) = current_request_id() {
            attach_request_id_header(&mut response, &request_id);
        }

        response
    }
}

pub async fn with_request_id_scope<F>(request_id: String, future: F) -> F::Output
where
    F: Future,
{
    REQUEST_ID.scope(request_id, future).await
}

pub fn current_request_id() -> Option<String> {
    REQUEST_ID.try_with(Clone::clone).ok()
}

pub fn request_id_from_headers_or_generate(headers: &HeaderMap) -> String {
    headers
        .get(REQUEST_ID_HEADER)
        .and_then(|value| value.to_str().ok())
        .filter(|value| !value.trim().is_empty())
        .map(ToOwned::to_owned)
        .unwrap_or_else(|| Uuid::new_v4().to_string())
}

pub fn attach_request_id_header(response: &mut Response, request_id: &str) {
    if let Ok(header) = HeaderValue::from_str(request_id) {
        response.headers_mut().insert(REQUEST_ID_HEADER, header);
    }
}
