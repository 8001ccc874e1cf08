//! AWS infrastructure adapter.
//!
//! | Port | Implementation | Service |
//! |------|----------------|---------|
//! | [`pipeline::ObjectStore`] | [`S3ObjectStore`] | S3 |
//! | [`pipeline::JobPublisher`] | [`SnsJobPublisher`] | SNS |
//! | [`pipeline::ErrorLog`] | [`DynamoErrorLog`] | DynamoDB |
//!
//! [`resolve_execution_identity`] asks STS which account the process runs
//! under, so the listener can address the job topic without configuration.
//!
//! ## Architectural Layer
//!
//! **Infrastructure.** SDK types never cross this crate's public API; every
//! failure is mapped into the matching `pipeline` error.

mod dynamo;
mod identity;
mod s3;
mod sns;

pub use aws_config::SdkConfig;
pub use dynamo::{DynamoErrorLog, DEFAULT_ERROR_TABLE};
pub use identity::{resolve_execution_identity, IdentityError};
pub use s3::{S3ObjectStore, DELETE_BATCH_SIZE};
pub use sns::SnsJobPublisher;

/// Loads the shared SDK configuration from the environment (region,
/// credentials chain, endpoint overrides).
pub async fn load_config() -> SdkConfig {
    aws_config::load_from_env().await
}
