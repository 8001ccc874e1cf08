use std::collections::HashMap;

use async_trait::async_trait;
use aws_sdk_dynamodb::error::DisplayErrorContext;
use aws_sdk_dynamodb::types::AttributeValue;
use aws_sdk_dynamodb::Client;
use pipeline::{ErrorLog, ErrorLogError, ErrorRecord};
use uuid::Uuid;

use crate::SdkConfig;

/// Table the error log writes to unless configured otherwise.
pub const DEFAULT_ERROR_TABLE: &str = "errorLogs";

/// [`ErrorLog`] writing one DynamoDB item per record.
///
/// The table is expected to have a string partition key `errorId` and time to
/// live enabled on the `ttl` attribute.
#[derive(Debug, Clone)]
pub struct DynamoErrorLog {
    client: Client,
    table: String,
}

impl DynamoErrorLog {
    pub fn new(config: &SdkConfig, table: impl Into<String>) -> Self {
        Self {
            client: Client::new(config),
            table: table.into(),
        }
    }

    pub fn table(&self) -> &str {
        &self.table
    }
}

fn item(record: &ErrorRecord, error_id: Uuid) -> HashMap<String, AttributeValue> {
    HashMap::from([
        ("errorId".to_string(), AttributeValue::S(error_id.to_string())),
        ("ttl".to_string(), AttributeValue::N(record.ttl.to_string())),
        (
            "lambdaFunctionName".to_string(),
            AttributeValue::S(record.lambda_function_name.clone()),
        ),
        (
            "eventTimeUTC".to_string(),
            AttributeValue::S(record.event_time_utc.clone()),
        ),
        ("methodName".to_string(), AttributeValue::S(record.method_name.clone())),
        ("error".to_string(), AttributeValue::S(record.error.clone())),
    ])
}

#[async_trait]
impl ErrorLog for DynamoErrorLog {
    async fn append(&self, record: &ErrorRecord) -> Result<(), ErrorLogError> {
        self.client
            .put_item()
            .table_name(&self.table)
            .set_item(Some(item(record, Uuid::new_v4())))
            .send()
            .await
            .map_err(|e| ErrorLogError::Write(DisplayErrorContext(&e).to_string()))?;
        Ok(())
    }
}
