//! HTTP surface of the listener.
//!
//! # Endpoints
//!
//! - `POST /webhook` - Accepts GitHub webhook deliveries
//! - `GET /health` - Returns 200 if the server is running

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::routing::{get, post};
use axum::Router;
use pipeline::{ExecutionIdentity, FunctionName, InvocationContext};

use crate::{Listener, ListenerResponse, WebhookRequest};

/// Shared state for the listener's handlers.
#[derive(Clone)]
pub struct ListenerState {
    listener: Arc<Listener>,
    function_name: FunctionName,
    identity: ExecutionIdentity,
}

impl ListenerState {
    pub fn new(listener: Listener, function_name: FunctionName, identity: ExecutionIdentity) -> Self {
        Self {
            listener: Arc::new(listener),
            function_name,
            identity,
        }
    }
}

/// Builds the axum Router with all endpoints.
pub fn build_router(state: ListenerState) -> Router {
    Router::new()
        .route("/webhook", post(webhook_handler))
        .route("/health", get(health_handler))
        .with_state(state)
}

/// Each call is a fresh invocation with its own id.
async fn webhook_handler(
    State(state): State<ListenerState>,
    headers: HeaderMap,
    body: Bytes,
) -> ListenerResponse {
    let ctx = InvocationContext::new(state.function_name.clone(), state.identity.clone());
    state
        .listener
        .handle(&WebhookRequest::new(headers, body), &ctx)
        .await
}

async fn health_handler() -> &'static str {
    "OK"
}
