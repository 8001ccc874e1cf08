use pipeline::RepositoryRef;
use reqwest::Method;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::json;
use tracing::{info, instrument};

use crate::{GitHubClient, GitHubError};

/// A repository webhook to create.
#[derive(Debug, Clone)]
pub struct WebhookRegistration {
    /// Where GitHub delivers the events.
    pub url: String,
    /// Shared secret GitHub signs each delivery with.
    pub secret: SecretString,
    pub events: Vec<String>,
}

impl WebhookRegistration {
    /// A registration for push events only.
    pub fn push(url: impl Into<String>, secret: SecretString) -> Self {
        Self {
            url: url.into(),
            secret,
            events: vec!["push".to_string()],
        }
    }

    fn payload(&self) -> serde_json::Value {
        json!({
            "name": "web",
            "active": true,
            "events": self.events,
            "config": {
                "url": self.url,
                "content_type": "json",
                "secret": self.secret.expose_secret(),
                "insecure_ssl": "0",
            },
        })
    }
}

#[derive(Debug, Deserialize)]
struct CreatedHook {
    id: u64,
}

impl GitHubClient {
    /// Creates a webhook on `repo`, returning the id GitHub assigned to it.
    #[instrument(skip(self, registration), fields(repo = %repo, url = %registration.url))]
    pub async fn create_webhook(
        &self,
        repo: &RepositoryRef,
        registration: &WebhookRegistration,
    ) -> Result<u64, GitHubError> {
        let path = format!("/repos/{}/{}/hooks", repo.owner, repo.name);
        let response = self
            .request(Method::POST, &path)
            .json(&registration.payload())
            .send()
            .await?;
        let hook: CreatedHook = Self::check(response).await?.json().await?;
        info!(hook_id = hook.id, events = ?registration.events, "Webhook created");
        Ok(hook.id)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use axum::http::StatusCode;
    use axum::routing::post;
    use axum::{Json, Router};
    use pipeline::{RepositoryName, RepositoryOwner};

    use super::*;
    use crate::test_server::{client, serve};

    fn repo() -> RepositoryRef {
        RepositoryRef::new(
            RepositoryOwner::new("octo").unwrap(),
            RepositoryName::new("site").unwrap(),
        )
    }

    #[test]
    fn test_payload_shape() {
        let registration =
            WebhookRegistration::push("https://hooks.example.com/webhook", SecretString::from("s3cret".to_string()));
        let payload = registration.payload();
        assert_eq!(payload["name"], "web");
        assert_eq!(payload["events"], json!(["push"]));
        assert_eq!(payload["config"]["content_type"], "json");
        assert_eq!(payload["config"]["secret"], "s3cret");
        assert_eq!(payload["config"]["insecure_ssl"], "0");
    }

    #[test]
    fn test_debug_hides_secret() {
        let registration =
            WebhookRegistration::push("https://hooks.example.com", SecretString::from("s3cret".to_string()));
        assert!(!format!("{registration:?}").contains("s3cret"));
    }

    #[tokio::test]
    async fn test_create_webhook_posts_config() {
        let received = Arc::new(Mutex::new(None));
        let sink = received.clone();
        let router = Router::new().route(
            "/repos/octo/site/hooks",
            post(move |Json(body): Json<serde_json::Value>| {
                let sink = sink.clone();
                async move {
                    *sink.lock().unwrap() = Some(body);
                    (StatusCode::CREATED, Json(json!({ "id": 42 })))
                }
            }),
        );
        let base = serve(router).await;
        let mut registration =
            WebhookRegistration::push("https://hooks.example.com/webhook", SecretString::from("s3cret".to_string()));
        registration.events.push("ping".to_string());

        let id = client(&base).create_webhook(&repo(), &registration).await.unwrap();

        assert_eq!(id, 42);
        let body = received.lock().unwrap().clone().unwrap();
        assert_eq!(body["config"]["url"], "https://hooks.example.com/webhook");
        assert_eq!(body["events"], json!(["push", "ping"]));
    }

    #[tokio::test]
    async fn test_create_webhook_validation_failure() {
        let router = Router::new().route(
            "/repos/octo/site/hooks",
            post(|| async { (StatusCode::UNPROCESSABLE_ENTITY, "Hook already exists") }),
        );
        let base = serve(router).await;
        let registration =
            WebhookRegistration::push("https://hooks.example.com", SecretString::from("s".to_string()));

        let err = client(&base).create_webhook(&repo(), &registration).await.unwrap_err();

        assert!(matches!(err, GitHubError::Status { status: 422, .. }));
        assert!(!err.is_transient());
    }
}
