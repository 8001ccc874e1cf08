use async_trait::async_trait;
use aws_sdk_sns::error::DisplayErrorContext;
use aws_sdk_sns::Client;
use pipeline::{DeployJob, JobPublisher, PublishError};
use tracing::{debug, instrument};

use crate::SdkConfig;

/// [`JobPublisher`] that posts each job as the message of an SNS notification.
#[derive(Debug, Clone)]
pub struct SnsJobPublisher {
    client: Client,
}

impl SnsJobPublisher {
    pub fn new(config: &SdkConfig) -> Self {
        Self {
            client: Client::new(config),
        }
    }

    pub fn from_client(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl JobPublisher for SnsJobPublisher {
    #[instrument(skip(self, job), fields(repo = %job.repository(), git_ref = %job.git_ref))]
    async fn publish(&self, topic_arn: &str, job: &DeployJob) -> Result<String, PublishError> {
        let message = serde_json::to_string(job)?;
        let output = self
            .client
            .publish()
            .topic_arn(topic_arn)
            .message(message)
            .send()
            .await
            .map_err(|e| PublishError::Request {
                topic: topic_arn.to_string(),
                message: DisplayErrorContext(&e).to_string(),
            })?;
        let message_id = output.message_id().unwrap_or_default().to_string();
        debug!(%message_id, "Job published");
        Ok(message_id)
    }
}
