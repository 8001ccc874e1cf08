//! The validation pipeline run for every webhook call.

use std::sync::Arc;

use axum::body::Bytes;
use axum::http::HeaderMap;
use pipeline::descriptor::DESCRIPTOR_PATH;
use pipeline::signature::{self, SIGNATURE_256_HEADER, SIGNATURE_HEADER};
use pipeline::{
    ConfigError, Credentials, DeployDescriptor, DeployJob, ErrorReporter, InvocationContext,
    JobPublisher, SourceRepository,
};
use secrecy::ExposeSecret;
use tracing::{debug, info, instrument};

use crate::notification::PushNotification;
use crate::policy::ListenerPolicy;
use crate::response::{self, ListenerResponse};
use crate::ListenerError;

/// Header naming the webhook event type.
pub const EVENT_HEADER: &str = "x-github-event";

/// One inbound webhook call: headers plus the raw body the signature covers.
#[derive(Debug, Clone, Default)]
pub struct WebhookRequest {
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl WebhookRequest {
    pub fn new(headers: HeaderMap, body: impl Into<Bytes>) -> Self {
        Self {
            headers,
            body: body.into(),
        }
    }
}

/// Authenticates, filters, and queues push notifications.
pub struct Listener {
    credentials: Result<Credentials, ConfigError>,
    source: Arc<dyn SourceRepository>,
    publisher: Arc<dyn JobPublisher>,
    reporter: ErrorReporter,
    policy: ListenerPolicy,
}

impl Listener {
    /// `credentials` is checked on every call, so a missing secret is
    /// answered per request instead of preventing start-up.
    pub fn new(
        credentials: Result<Credentials, ConfigError>,
        source: Arc<dyn SourceRepository>,
        publisher: Arc<dyn JobPublisher>,
        reporter: ErrorReporter,
    ) -> Self {
        Self {
            credentials,
            source,
            publisher,
            reporter,
            policy: ListenerPolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: ListenerPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn policy(&self) -> &ListenerPolicy {
        &self.policy
    }

    /// Handles one webhook call. Never fails: every outcome is a response.
    #[instrument(skip_all, fields(invocation_id = %ctx.invocation_id))]
    pub async fn handle(&self, request: &WebhookRequest, ctx: &InvocationContext) -> ListenerResponse {
        match self.process(request, ctx).await {
            Ok(response) => response,
            Err(err) => {
                self.reporter.report(err.step(), &err).await;
                err.response()
            }
        }
    }

    async fn process(
        &self,
        request: &WebhookRequest,
        ctx: &InvocationContext,
    ) -> Result<ListenerResponse, ListenerError> {
        let credentials = self.credentials.as_ref().map_err(Clone::clone)?;

        // The SHA-256 header wins when GitHub sends both.
        let signature = get_header(&request.headers, SIGNATURE_256_HEADER)
            .or_else(|_| get_header(&request.headers, SIGNATURE_HEADER))
            .map_err(|_| ListenerError::MissingHeader(SIGNATURE_HEADER))?;
        if !signature::verify(
            credentials.webhook_secret.expose_secret().as_bytes(),
            &request.body,
            signature,
        ) {
            return Err(ListenerError::SignatureMismatch);
        }

        let event = get_header(&request.headers, EVENT_HEADER)?;
        if event == self.policy.ping_event {
            debug!("Answering ping");
            return Ok(ListenerResponse::ok(response::PING));
        }
        if event != self.policy.push_event {
            info!(event, "Ignoring event type");
            return Ok(ListenerResponse::rejected(response::UNWANTED_EVENT));
        }

        let push = PushNotification::from_body(&request.body)?;
        let branch = push.git_ref.branch();
        if !branch.as_ref().is_some_and(|b| self.policy.allows_branch(b)) {
            info!(git_ref = %push.git_ref, repo = %push.repository, "Ignoring push to branch");
            return Ok(ListenerResponse::rejected(response::UNWANTED_BRANCH));
        }

        let document = self
            .source
            .fetch_file(&push.repository, DESCRIPTOR_PATH, &push.git_ref)
            .await?;
        let descriptor = DeployDescriptor::from_document(&document)?;

        let job = DeployJob {
            repo_owner: push.repository.owner.clone(),
            repo_name: push.repository.name.clone(),
            git_ref: push.git_ref.clone(),
            deploy: descriptor,
        };
        let topic = ctx.identity.topic_arn(&self.policy.topic_name);
        let message_id = self.publisher.publish(&topic, &job).await?;

        info!(
            repo = %push.repository,
            git_ref = %push.git_ref,
            pusher = push.pusher.as_deref().unwrap_or("unknown"),
            %message_id,
            "Deploy job queued"
        );
        Ok(ListenerResponse::ok(response::ACCEPTED))
    }
}

impl std::fmt::Debug for Listener {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Listener")
            .field("configured", &self.credentials.is_ok())
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

/// Extracts a required header value. Lookup is case-insensitive.
fn get_header<'a>(headers: &'a HeaderMap, name: &'static str) -> Result<&'a str, ListenerError> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .ok_or(ListenerError::MissingHeader(name))
}
