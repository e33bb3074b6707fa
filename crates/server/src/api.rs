// Webhook routes: the landing page and `/update_public`.

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{Query, State},
    http::{header::CONTENT_TYPE, HeaderMap, StatusCode},
    routing::{get, post},
    Router,
};
use repository_sync_common::types::SyncParams;
use repository_sync_worker::pipeline::SyncRunner;
use repository_sync_worker::validate::{PayloadValidator, RejectKind, TokenPolicy};
use tracing::{error, info, warn};

use crate::error::{current_request_id, ErrorCode, SyncHttpError};

pub const LANDING_MESSAGE: &str = "I think you misunderstand how to use this.";
pub const SUCCESS_MESSAGE: &str = "Hey, you did it!";

#[derive(Clone)]
pub struct AppState {
    validator: Arc<PayloadValidator>,
    runner: Arc<dyn SyncRunner>,
}

impl AppState {
    pub fn new(policy: TokenPolicy, runner: Arc<dyn SyncRunner>) -> Self {
        Self { validator: Arc::new(PayloadValidator::new(policy)), runner }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(landing))
        .route("/update_public", post(update_public))
        .with_state(state)
}

async fn landing() -> (StatusCode, &'static str) {
    (StatusCode::OK, LANDING_MESSAGE)
}

async fn update_public(
    State(state): State<AppState>,
    Query(query): Query<SyncParams>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<(StatusCode, &'static str), SyncHttpError> {
    let params = query.merged_with(body_params(&headers, &body));
    let request_id = current_request_id().unwrap_or_default();

    let request = state.validator.validate(&params).map_err(|reason| {
        let rejection = SyncHttpError::from_reject(&reason);
        let code = rejection.code().as_str();
        match reason.kind() {
            RejectKind::Policy => {
                info!(request_id = %request_id, code, reason = %reason, "ignoring push")
            }
            RejectKind::Authentication | RejectKind::Validation => {
                warn!(request_id = %request_id, code, reason = %reason, "rejected sync request")
            }
        }
        rejection
    })?;

    info!(
        request_id = %request_id,
        destination = %request.destination(),
        origin = %request.origin(),
        "accepted sync request"
    );

    let runner = Arc::clone(&state.runner);
    match tokio::task::spawn_blocking(move || runner.run(&request)).await {
        Ok(Ok(_outcome)) => Ok((StatusCode::OK, SUCCESS_MESSAGE)),
        Ok(Err(failure)) => Err(SyncHttpError::from_failure(&failure)),
        Err(join_error) => {
            error!(request_id = %request_id, ?join_error, "sync task did not complete");
            Err(SyncHttpError::from_code(ErrorCode::InternalError))
        }
    }
}

/// Parameters carried in the request body.
///
/// A form body may carry any of the parameters. A JSON body is the push
/// event itself, as sent by webhooks configured with `application/json`.
fn body_params(headers: &HeaderMap, body: &[u8]) -> SyncParams {
    let media_type = headers
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(';').next())
        .map(|value| value.trim().to_ascii_lowercase())
        .unwrap_or_default();

    match media_type.as_str() {
        "application/x-www-form-urlencoded" => form_params(body),
        "application/json" => SyncParams {
            payload: Some(String::from_utf8_lossy(body).into_owned()),
            ..SyncParams::default()
        },
        _ => SyncParams::default(),
    }
}

fn form_params(body: &[u8]) -> SyncParams {
    let mut params = SyncParams::default();
    for (key, value) in url::form_urlencoded::parse(body) {
        match key.as_ref() {
            "token" => params.token = Some(value.into_owned()),
            "payload" => params.payload = Some(value.into_owned()),
            "dest_repo" => params.dest_repo = Some(value.into_owned()),
            _ => {}
        }
    }
    params
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use axum::{
        body::{to_bytes, Body},
        http::{Method, Request},
        response::Response,
    };
    use repository_sync_common::types::SyncRequest;
    use repository_sync_worker::outcome::{SyncFailure, SyncOutcome, SyncStage, SyncState};
    use repository_sync_worker::pipeline::{PipelineSettings, SyncPipeline};
    use tempfile::TempDir;
    use tower::ServiceExt;

    use super::*;

    const SECRET: &str = "hook-secret";
    const MASTER_PAYLOAD: &str =
        r#"{"repository":{"owner":{"name":"acme"},"name":"lib"},"ref":"refs/heads/master"}"#;
    const FEATURE_PAYLOAD: &str =
        r#"{"repository":{"owner":{"name":"acme"},"name":"lib"},"ref":"refs/heads/feature-x"}"#;

    #[derive(Default)]
    struct RecordingRunner {
        requests: Mutex<Vec<SyncRequest>>,
        fail_at: Option<SyncStage>,
        panics: bool,
    }

    impl RecordingRunner {
        fn failing_at(stage: SyncStage) -> Self {
            Self { fail_at: Some(stage), ..Self::default() }
        }

        fn requests(&self) -> Vec<SyncRequest> {
            self.requests.lock().expect("requests lock").clone()
        }
    }

    impl SyncRunner for RecordingRunner {
        fn run(&self, request: &SyncRequest) -> Result<SyncOutcome, SyncFailure> {
            self.requests.lock().expect("requests lock").push(request.clone());
            if self.panics {
                panic!("runner exploded");
            }
            match self.fail_at {
                Some(stage) => Err(SyncFailure {
                    stage,
                    reached: SyncState::Started,
                    message: "git clone failed".to_string(),
                    command: Some("git clone https://***@github.com/acme/app.git".to_string()),
                    code: Some(128),
                    output: "fatal: repository not found\n".to_string(),
                }),
                None => Ok(SyncOutcome {
                    destination: request.destination().clone(),
                    origin: request.origin().clone(),
                    remote: "otherrepo-1".to_string(),
                    branch: "update-1".to_string(),
                    merge_clean: true,
                }),
            }
        }
    }

    fn app(policy: TokenPolicy, runner: Arc<RecordingRunner>) -> Router {
        router(AppState::new(policy, runner))
    }

    fn secured(runner: Arc<RecordingRunner>) -> Router {
        app(TokenPolicy::Require(SECRET.to_string()), runner)
    }

    fn form(pairs: &[(&str, &str)]) -> String {
        url::form_urlencoded::Serializer::new(String::new()).extend_pairs(pairs).finish()
    }

    fn form_request(uri: &str, pairs: &[(&str, &str)]) -> Request<Body> {
        Request::builder()
            .method(Method::POST)
            .uri(uri)
            .header("content-type", "application/x-www-form-urlencoded")
            .body(Body::from(form(pairs)))
            .expect("update request should build")
    }

    async fn body_text(response: Response) -> String {
        let bytes =
            to_bytes(response.into_body(), usize::MAX).await.expect("body should be readable");
        String::from_utf8(bytes.to_vec()).expect("body should be utf8")
    }

    #[tokio::test]
    async fn landing_page_explains_usage() {
        let response = secured(Arc::default())
            .oneshot(Request::builder().uri("/").body(Body::empty()).expect("request"))
            .await
            .expect("landing request should succeed");

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_text(response).await, LANDING_MESSAGE);
    }

    #[tokio::test]
    async fn master_push_runs_sync_and_reports_success() {
        let runner = Arc::new(RecordingRunner::default());
        let response = secured(Arc::clone(&runner))
            .oneshot(form_request(
                "/update_public",
                &[("token", SECRET), ("payload", MASTER_PAYLOAD), ("dest_repo", "acme/app")],
            ))
            .await
            .expect("update request should succeed");

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_text(response).await, SUCCESS_MESSAGE);

        let requests = runner.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].destination().to_string(), "acme/app");
        assert_eq!(requests[0].origin().to_string(), "acme/lib");
        assert_eq!(requests[0].token(), SECRET);
    }

    #[tokio::test]
    async fn wrong_token_is_rejected_without_running() {
        let runner = Arc::new(RecordingRunner::default());
        let response = secured(Arc::clone(&runner))
            .oneshot(form_request(
                "/update_public",
                &[("token", "guess"), ("payload", MASTER_PAYLOAD), ("dest_repo", "acme/app")],
            ))
            .await
            .expect("update request should return a response");

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body_text(response).await, "Tokens didn't match!");
        assert!(runner.requests().is_empty());
    }

    #[tokio::test]
    async fn missing_destination_is_rejected() {
        let runner = Arc::new(RecordingRunner::default());
        let response = secured(Arc::clone(&runner))
            .oneshot(form_request(
                "/update_public",
                &[("token", SECRET), ("payload", MASTER_PAYLOAD)],
            ))
            .await
            .expect("update request should return a response");

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body_text(response).await, "Missing `dest_repo` argument");
        assert!(runner.requests().is_empty());
    }

    #[tokio::test]
    async fn malformed_payload_is_rejected() {
        let runner = Arc::new(RecordingRunner::default());
        let response = secured(Arc::clone(&runner))
            .oneshot(form_request(
                "/update_public",
                &[("token", SECRET), ("payload", "{not json"), ("dest_repo", "acme/app")],
            ))
            .await
            .expect("update request should return a response");

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body_text(response).await, "Invalid `payload` argument");
        assert!(runner.requests().is_empty());
    }

    #[tokio::test]
    async fn non_master_push_is_not_acceptable() {
        let runner = Arc::new(RecordingRunner::default());
        let response = secured(Arc::clone(&runner))
            .oneshot(form_request(
                "/update_public",
                &[("token", SECRET), ("payload", FEATURE_PAYLOAD), ("dest_repo", "acme/app")],
            ))
            .await
            .expect("update request should return a response");

        assert_eq!(response.status(), StatusCode::NOT_ACCEPTABLE);
        assert_eq!(body_text(response).await, "Payload was not for master, aborting.");
        assert!(runner.requests().is_empty());
    }

    #[tokio::test]
    async fn development_policy_accepts_any_token() {
        let runner = Arc::new(RecordingRunner::default());
        let response = app(TokenPolicy::AllowAll, Arc::clone(&runner))
            .oneshot(form_request(
                "/update_public",
                &[("token", "anything"), ("payload", MASTER_PAYLOAD), ("dest_repo", "acme/app")],
            ))
            .await
            .expect("update request should succeed");

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(runner.requests().len(), 1);
    }

    #[tokio::test]
    async fn query_parameters_are_accepted_and_body_wins() {
        let runner = Arc::new(RecordingRunner::default());
        let uri = format!(
            "/update_public?{}",
            form(&[("token", "stale"), ("dest_repo", "acme/app")])
        );
        let response = secured(Arc::clone(&runner))
            .oneshot(form_request(&uri, &[("token", SECRET), ("payload", MASTER_PAYLOAD)]))
            .await
            .expect("update request should succeed");

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(runner.requests()[0].destination().to_string(), "acme/app");
    }

    #[tokio::test]
    async fn json_body_is_taken_as_the_payload() {
        let runner = Arc::new(RecordingRunner::default());
        let payload =
            r#"{"repository":{"owner":{"login":"acme"},"name":"lib"},"ref":"refs/heads/master"}"#;
        let uri =
            format!("/update_public?{}", form(&[("token", SECRET), ("dest_repo", "acme/app")]));
        let request = Request::builder()
            .method(Method::POST)
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(payload))
            .expect("json request should build");

        let response =
            secured(Arc::clone(&runner)).oneshot(request).await.expect("update should succeed");

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(runner.requests()[0].origin().to_string(), "acme/lib");
    }

    #[tokio::test]
    async fn pipeline_failure_reports_stage() {
        let runner = Arc::new(RecordingRunner::failing_at(SyncStage::Clone));
        let response = secured(Arc::clone(&runner))
            .oneshot(form_request(
                "/update_public",
                &[("token", SECRET), ("payload", MASTER_PAYLOAD), ("dest_repo", "acme/app")],
            ))
            .await
            .expect("update request should return a response");

        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
        assert_eq!(body_text(response).await, "Sync failed during `clone` stage, aborting.");
    }

    #[tokio::test]
    async fn panicking_runner_is_an_internal_error() {
        let runner = Arc::new(RecordingRunner { panics: true, ..RecordingRunner::default() });
        let response = secured(Arc::clone(&runner))
            .oneshot(form_request(
                "/update_public",
                &[("token", SECRET), ("payload", MASTER_PAYLOAD), ("dest_repo", "acme/app")],
            ))
            .await
            .expect("update request should return a response");

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body_text(response).await, "Sync failed unexpectedly.");
    }

    #[tokio::test]
    async fn rejected_request_never_creates_a_workspace() {
        let temp = TempDir::new().expect("tempdir should be created");
        let root = temp.path().join("repos");
        let pipeline = SyncPipeline::new(PipelineSettings {
            workspace_root: root.clone(),
            ..PipelineSettings::default()
        });
        let app =
            router(AppState::new(TokenPolicy::Require(SECRET.to_string()), Arc::new(pipeline)));

        let response = app
            .oneshot(form_request(
                "/update_public",
                &[("token", "guess"), ("payload", MASTER_PAYLOAD), ("dest_repo", "acme/app")],
            ))
            .await
            .expect("update request should return a response");

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(!root.exists());
    }

    #[test]
    fn unknown_content_type_carries_no_parameters() {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, "text/plain".parse().expect("header value"));
        assert_eq!(body_params(&headers, b"token=x"), SyncParams::default());
    }

    #[test]
    fn form_content_type_with_charset_is_parsed() {
        let mut headers = HeaderMap::new();
        headers.insert(
            CONTENT_TYPE,
            "application/x-www-form-urlencoded; charset=UTF-8".parse().expect("header value"),
        );
        let params = body_params(&headers, b"dest_repo=acme%2Fapp&ignored=1");
        assert_eq!(params.dest_repo.as_deref(), Some("acme/app"));
        assert!(params.token.is_none());
    }
}
