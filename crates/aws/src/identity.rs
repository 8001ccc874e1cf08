use aws_sdk_sts::error::DisplayErrorContext;
use pipeline::ExecutionIdentity;
use thiserror::Error;
use tracing::info;

use crate::SdkConfig;

#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("no AWS region configured")]
    NoRegion,

    #[error("caller identity lookup failed: {0}")]
    Lookup(String),
}

/// Determines the region and account this process executes under.
///
/// The region comes from the loaded configuration; the account from an STS
/// `GetCallerIdentity` call, which needs no permissions.
pub async fn resolve_execution_identity(config: &SdkConfig) -> Result<ExecutionIdentity, IdentityError> {
    let region = config.region().ok_or(IdentityError::NoRegion)?.to_string();
    let output = aws_sdk_sts::Client::new(config)
        .get_caller_identity()
        .send()
        .await
        .map_err(|e| IdentityError::Lookup(DisplayErrorContext(&e).to_string()))?;

    let account = output
        .account()
        .ok_or_else(|| IdentityError::Lookup("response carried no account".into()))?;
    let identity = ExecutionIdentity::new(region, account);
    info!(region = %identity.region, account = %identity.account_id, "Resolved execution identity");
    Ok(identity)
}
