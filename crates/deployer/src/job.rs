//! Job messages as they arrive from the queue.
//!
//! A job may be delivered bare, inside an SNS HTTP notification (`Message`),
//! or inside a Lambda-style SNS event (`Records[0].Sns.Message`).

use pipeline::DeployJob;
use serde::Deserialize;
use serde_json::Value;

use crate::DeployError;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct HttpEnvelope {
    #[serde(rename = "Type")]
    kind: String,
    message: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct EventEnvelope {
    records: Vec<EventRecord>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct EventRecord {
    sns: EventMessage,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct EventMessage {
    message: String,
}

/// Extracts the [`DeployJob`] carried by `message`.
pub fn parse_job(message: &str) -> Result<DeployJob, DeployError> {
    let value: Value = serde_json::from_str(message).map_err(DeployError::Job)?;

    if value.get("Type").is_some() {
        let envelope: HttpEnvelope = serde_json::from_value(value).map_err(DeployError::Job)?;
        if envelope.kind != "Notification" {
            return Err(DeployError::NotAJob(envelope.kind));
        }
        return serde_json::from_str(&envelope.message).map_err(DeployError::Job);
    }

    if value.get("Records").is_some() {
        let envelope: EventEnvelope = serde_json::from_value(value).map_err(DeployError::Job)?;
        let record = envelope
            .records
            .into_iter()
            .next()
            .ok_or_else(|| DeployError::NotAJob("empty event".to_string()))?;
        return serde_json::from_str(&record.sns.message).map_err(DeployError::Job);
    }

    serde_json::from_value(value).map_err(DeployError::Job)
}
