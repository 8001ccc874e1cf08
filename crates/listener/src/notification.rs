//! The push payload, reduced to what the listener needs.

use pipeline::{GitRef, RepositoryName, RepositoryOwner, RepositoryRef};
use serde::Deserialize;

/// A push notification as delivered by a GitHub `push` webhook.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushNotification {
    pub repository: RepositoryRef,
    pub git_ref: GitRef,
    pub pusher: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawPush {
    #[serde(rename = "ref")]
    git_ref: String,
    repository: RawRepository,
    #[serde(default)]
    pusher: Option<RawPusher>,
}

#[derive(Debug, Deserialize)]
struct RawRepository {
    name: String,
    owner: RawOwner,
}

#[derive(Debug, Deserialize)]
struct RawOwner {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    login: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawPusher {
    #[serde(default)]
    name: Option<String>,
}

/// The payload is well-formed JSON but lacks a field the listener needs.
#[derive(Debug, thiserror::Error)]
pub enum NotificationError {
    #[error("push payload is not valid: {0}")]
    Json(#[from] serde_json::Error),

    #[error("push payload has an empty {0}")]
    Empty(&'static str),
}

impl PushNotification {
    /// Parses the raw webhook body.
    ///
    /// The owner is read from `repository.owner.name`, falling back to
    /// `repository.owner.login`.
    pub fn from_body(body: &[u8]) -> Result<Self, NotificationError> {
        let raw: RawPush = serde_json::from_slice(body)?;

        let owner = raw
            .repository
            .owner
            .name
            .filter(|n| !n.is_empty())
            .or(raw.repository.owner.login)
            .and_then(RepositoryOwner::new)
            .ok_or(NotificationError::Empty("repository owner"))?;
        let name = RepositoryName::new(raw.repository.name)
            .ok_or(NotificationError::Empty("repository name"))?;
        let git_ref = GitRef::new(raw.git_ref).ok_or(NotificationError::Empty("ref"))?;

        Ok(Self {
            repository: RepositoryRef::new(owner, name),
            git_ref,
            pusher: raw.pusher.and_then(|p| p.name),
        })
    }
}
