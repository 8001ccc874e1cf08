//! HTTP surface of the deploy worker.
//!
//! # Endpoints
//!
//! - `POST /jobs` - Runs one deploy job; 500 asks the sender to redeliver
//! - `GET /health` - Returns 200 if the server is running

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::Router;
use pipeline::{ExecutionIdentity, FunctionName, InvocationContext};

use crate::Deployer;

/// Shared state for the deploy worker's handlers.
#[derive(Clone)]
pub struct DeployerState {
    deployer: Arc<Deployer>,
    function_name: FunctionName,
    identity: ExecutionIdentity,
}

impl DeployerState {
    pub fn new(deployer: Deployer, function_name: FunctionName, identity: ExecutionIdentity) -> Self {
        Self {
            deployer: Arc::new(deployer),
            function_name,
            identity,
        }
    }
}

pub fn build_router(state: DeployerState) -> Router {
    Router::new()
        .route("/jobs", post(job_handler))
        .route("/health", get(health_handler))
        .with_state(state)
}

async fn job_handler(State(state): State<DeployerState>, body: String) -> (StatusCode, String) {
    let ctx = InvocationContext::new(state.function_name.clone(), state.identity.clone());
    match state.deployer.handle_message(&body, &ctx).await {
        Ok(resolution) => (StatusCode::OK, resolution.to_string()),
        Err(failure) => (StatusCode::INTERNAL_SERVER_ERROR, failure.to_string()),
    }
}

async fn health_handler() -> &'static str {
    "OK"
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use pipeline::testing::{InMemoryObjectStore, InMemorySource, RecordingErrorLog};
    use pipeline::{Credentials, ErrorReporter, GitRef, RepositoryName, RepositoryOwner, RepositoryRef};
    use serde_json::json;
    use tower::ServiceExt;

    use super::*;
    use crate::fixtures::{zip_bytes, Entry};

    fn app(source: InMemorySource, store: Arc<InMemoryObjectStore>) -> (Router, tempfile::TempDir) {
        let scratch = tempfile::tempdir().unwrap();
        let function = FunctionName::new("deployer").unwrap();
        let reporter = ErrorReporter::new(Arc::new(RecordingErrorLog::default()), function.clone())
            .with_timeout(Duration::from_secs(1));
        let deployer = Deployer::new(
            Ok(Credentials::new("token", "secret")),
            Arc::new(source),
            store,
            reporter,
        )
        .with_scratch_root(scratch.path());
        let router = build_router(DeployerState::new(
            deployer,
            function,
            ExecutionIdentity::new("eu-west-1", "210987654321"),
        ));
        (router, scratch)
    }

    fn source() -> InMemorySource {
        let repo = RepositoryRef::new(
            RepositoryOwner::new("octo").unwrap(),
            RepositoryName::new("site").unwrap(),
        );
        InMemorySource::default().with_archive(
            &repo,
            &GitRef::new("refs/heads/main").unwrap(),
            zip_bytes(&[Entry::Dir("abc123/"), Entry::File("abc123/index.html", b"hi")]),
        )
    }

    fn job_request() -> Request<Body> {
        let job = json!({
            "repoOwner": "octo",
            "repoName": "site",
            "ref": "refs/heads/main",
            "deploy": { "type": "S3", "target": { "main": "site-main", "dev": "site-dev" } }
        });
        Request::post("/jobs").body(Body::from(job.to_string())).unwrap()
    }

    async fn text_of(response: axum::response::Response) -> String {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let (app, _scratch) = app(InMemorySource::default(), Arc::default());
        let response = app
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_job_is_deployed() {
        let store = Arc::new(InMemoryObjectStore::default().with_bucket("site-main"));
        let (app, _scratch) = app(source(), store.clone());

        let response = app.oneshot(job_request()).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            text_of(response).await,
            "Deployed to site-main: 1 uploaded, 0 deleted, 0 unchanged"
        );
        assert!(store.objects("site-main").contains_key("index.html"));
    }

    #[tokio::test]
    async fn test_retryable_failure_is_server_error() {
        // No bucket: the sync fails and the job should be redelivered.
        let (app, _scratch) = app(source(), Arc::default());

        let response = app.oneshot(job_request()).await.unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(text_of(response).await.starts_with("sync_bucket failed"));
    }

    #[tokio::test]
    async fn test_rejection_is_not_retried() {
        let (app, _scratch) = app(source(), Arc::default());
        let request = Request::post("/jobs").body(Body::from("not a job")).unwrap();

        let response = app.oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert!(text_of(response).await.starts_with("Rejected:"));
    }
}
