use pipeline::{ConfigError, DescriptorError, PublishError, SourceError};
use thiserror::Error;

use crate::notification::NotificationError;
use crate::response::{self, ListenerResponse};

/// A failed webhook call. Each one is answered with a rejection and recorded
/// in the error log.
#[derive(Debug, Error)]
pub enum ListenerError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Missing {0} header")]
    MissingHeader(&'static str),

    #[error("Request signature does not match")]
    SignatureMismatch,

    #[error(transparent)]
    Notification(#[from] NotificationError),

    #[error("deploy.json could not be fetched: {0}")]
    DescriptorFetch(#[from] SourceError),

    #[error("deploy.json is not valid: {0}")]
    Descriptor(#[from] DescriptorError),

    #[error(transparent)]
    Publish(#[from] PublishError),
}

impl ListenerError {
    /// Name of the failing step, as written to the error log.
    pub fn step(&self) -> &'static str {
        match self {
            Self::Config(_) => "load_config",
            Self::MissingHeader(_) => "read_headers",
            Self::SignatureMismatch => "verify_signature",
            Self::Notification(_) => "parse_notification",
            Self::DescriptorFetch(_) | Self::Descriptor(_) => "fetch_descriptor",
            Self::Publish(_) => "publish_job",
        }
    }

    /// The response sent to the caller. Signature failures never say which
    /// side was wrong.
    pub fn response(&self) -> ListenerResponse {
        let message = match self {
            Self::Config(e) => return ListenerResponse::rejected(format!("{e}.")),
            Self::MissingHeader(name) if *name == crate::service::EVENT_HEADER => response::MISSING_EVENT,
            Self::MissingHeader(_) => response::MISSING_SIGNATURE,
            Self::SignatureMismatch => response::BAD_SIGNATURE,
            Self::Notification(_) => response::BAD_NOTIFICATION,
            Self::DescriptorFetch(_) | Self::Descriptor(_) => response::BAD_DESCRIPTOR,
            Self::Publish(_) => response::NOT_QUEUED,
        };
        ListenerResponse::rejected(message)
    }
}
