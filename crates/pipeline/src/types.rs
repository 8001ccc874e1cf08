//! Shared value types for the deployment pipeline domain.
//!
//! Unlike the newtype identifiers in [`crate::identifiers`], these types carry
//! structure: the job handed from the listener to the deployer, the error
//! record written on every handled failure, and the execution identity used to
//! address the job queue.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::descriptor::DeployDescriptor;
use crate::{FunctionName, GitRef, InvocationId, RepositoryName, RepositoryOwner};

// ---------------------------------------------------------------------------
// Time
// ---------------------------------------------------------------------------

/// A UTC wall-clock timestamp.
///
/// Wraps [`chrono::DateTime<Utc>`] so callers never depend on `chrono` types
/// directly; the underlying representation can change without affecting the
/// domain API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Timestamp(DateTime<Utc>);

impl Timestamp {
    /// Returns the current UTC time as a [`Timestamp`].
    pub fn now() -> Self {
        Self(Utc::now())
    }

    /// Creates a [`Timestamp`] from a [`DateTime<Utc>`].
    pub fn from_utc(dt: DateTime<Utc>) -> Self {
        Self(dt)
    }

    /// Returns the underlying [`DateTime<Utc>`].
    pub fn as_datetime(self) -> DateTime<Utc> {
        self.0
    }

    /// Seconds since the Unix epoch.
    pub fn epoch_seconds(self) -> i64 {
        self.0.timestamp()
    }

    /// Renders the timestamp in HTTP-date form, e.g. `Mon, 19 Oct 2026 12:00:00 GMT`.
    pub fn to_http_date(self) -> String {
        self.0.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.to_rfc3339())
    }
}

// ---------------------------------------------------------------------------
// Repositories
// ---------------------------------------------------------------------------

/// A source repository, addressed by owner and name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RepositoryRef {
    pub owner: RepositoryOwner,
    pub name: RepositoryName,
}

impl RepositoryRef {
    pub fn new(owner: RepositoryOwner, name: RepositoryName) -> Self {
        Self { owner, name }
    }
}

impl std::fmt::Display for RepositoryRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}

// ---------------------------------------------------------------------------
// Execution identity
// ---------------------------------------------------------------------------

/// The cloud region and account the current process executes under.
///
/// The listener derives the job topic's address from this rather than from
/// configuration, so a deployment in another account or region publishes to
/// its own topic without changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionIdentity {
    pub region: String,
    pub account_id: String,
}

impl ExecutionIdentity {
    pub fn new(region: impl Into<String>, account_id: impl Into<String>) -> Self {
        Self {
            region: region.into(),
            account_id: account_id.into(),
        }
    }

    /// Extracts region and account from a function or role ARN
    /// (`arn:<partition>:<service>:<region>:<account>:<resource>`).
    ///
    /// Returns `None` when either field is missing or empty.
    pub fn from_function_arn(arn: &str) -> Option<Self> {
        let mut fields = arn.split(':');
        if fields.next()? != "arn" {
            return None;
        }
        let region = fields.nth(2)?;
        let account_id = fields.next()?;
        if region.is_empty() || account_id.is_empty() {
            return None;
        }
        Some(Self::new(region, account_id))
    }

    /// The ARN of the named notification topic in this region and account.
    pub fn topic_arn(&self, topic_name: &str) -> String {
        format!(
            "arn:aws:sns:{}:{}:{}",
            self.region, self.account_id, topic_name
        )
    }
}

/// Per-invocation facts supplied by the host.
#[derive(Debug, Clone)]
pub struct InvocationContext {
    pub invocation_id: InvocationId,
    pub function_name: FunctionName,
    pub identity: ExecutionIdentity,
}

impl InvocationContext {
    /// A context for a fresh invocation.
    pub fn new(function_name: FunctionName, identity: ExecutionIdentity) -> Self {
        Self {
            invocation_id: InvocationId::new_random(),
            function_name,
            identity,
        }
    }
}

// ---------------------------------------------------------------------------
// Deploy job
// ---------------------------------------------------------------------------

/// The message handed from the listener to the deployer.
///
/// One job corresponds to one push event. Jobs are not deduplicated: the
/// deployer must tolerate the same job being delivered more than once.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeployJob {
    pub repo_owner: RepositoryOwner,
    pub repo_name: RepositoryName,
    #[serde(rename = "ref")]
    pub git_ref: GitRef,
    pub deploy: DeployDescriptor,
}

impl DeployJob {
    /// The repository this job deploys.
    pub fn repository(&self) -> RepositoryRef {
        RepositoryRef::new(self.repo_owner.clone(), self.repo_name.clone())
    }
}

// ---------------------------------------------------------------------------
// Error records
// ---------------------------------------------------------------------------

/// Default time an error record is kept before the store expires it.
pub const DEFAULT_ERROR_RETENTION: Duration = Duration::from_secs(30 * 24 * 60 * 60);

/// A structured, expiring audit entry for a handled failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorRecord {
    /// Expiry, in seconds since the Unix epoch.
    pub ttl: i64,
    pub lambda_function_name: String,
    #[serde(rename = "eventTimeUTC")]
    pub event_time_utc: String,
    pub method_name: String,
    pub error: String,
}

impl ErrorRecord {
    pub fn new(
        function_name: &FunctionName,
        step: &str,
        message: impl std::fmt::Display,
        now: Timestamp,
        retention: Duration,
    ) -> Self {
        let retention_secs = i64::try_from(retention.as_secs()).unwrap_or(i64::MAX);
        Self {
            ttl: now.epoch_seconds().saturating_add(retention_secs),
            lambda_function_name: function_name.to_string(),
            event_time_utc: now.to_http_date(),
            method_name: step.to_string(),
            error: message.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn fixed_time() -> Timestamp {
        Timestamp::from_utc(Utc.with_ymd_and_hms(2026, 10, 19, 12, 0, 0).unwrap())
    }

    #[test]
    fn test_http_date_format() {
        assert_eq!(fixed_time().to_http_date(), "Mon, 19 Oct 2026 12:00:00 GMT");
    }

    #[test]
    fn test_identity_from_lambda_arn() {
        let arn = "arn:aws:lambda:eu-west-1:123456789012:function:listener";
        let identity = ExecutionIdentity::from_function_arn(arn).unwrap();
        assert_eq!(identity, ExecutionIdentity::new("eu-west-1", "123456789012"));
        assert_eq!(
            identity.topic_arn("github-webhooks"),
            "arn:aws:sns:eu-west-1:123456789012:github-webhooks"
        );
    }

    #[test]
    fn test_identity_from_malformed_arn() {
        assert!(ExecutionIdentity::from_function_arn("").is_none());
        assert!(ExecutionIdentity::from_function_arn("arn:aws:lambda").is_none());
        assert!(ExecutionIdentity::from_function_arn("arn:aws:iam::123456789012:role/x").is_none());
        assert!(ExecutionIdentity::from_function_arn("urn:aws:lambda:r:a:f").is_none());
    }

    #[test]
    fn test_error_record_ttl_and_field_names() {
        let function = FunctionName::new("listener").unwrap();
        let record = ErrorRecord::new(
            &function,
            "verify_signature",
            "signature mismatch",
            fixed_time(),
            DEFAULT_ERROR_RETENTION,
        );
        assert_eq!(record.ttl, fixed_time().epoch_seconds() + 2_592_000);

        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["lambdaFunctionName"], "listener");
        assert_eq!(json["eventTimeUTC"], "Mon, 19 Oct 2026 12:00:00 GMT");
        assert_eq!(json["methodName"], "verify_signature");
        assert_eq!(json["error"], "signature mismatch");
    }
}
