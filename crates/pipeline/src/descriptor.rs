//! The deploy descriptor: the `deploy.json` document committed inside each
//! managed repository.
//!
//! ```json
//! {
//!   "deploy": {
//!     "type": "S3",
//!     "target": { "main": "site-prod", "dev": "site-dev" },
//!     "subdir": "public"
//!   }
//! }
//! ```
//!
//! Validation is deliberately shallow: the document must carry a `deploy`
//! object with a `type`, and a `target` map that names a `dev` bucket and at
//! least one of `master`/`main`. Unknown extra fields are ignored.

use std::collections::BTreeMap;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::{BranchName, BucketName};

/// Path of the descriptor within a repository.
pub const DESCRIPTOR_PATH: &str = "deploy.json";

/// Errors produced while reading or interpreting a descriptor.
#[derive(Debug, Error)]
pub enum DescriptorError {
    /// The document is not JSON.
    #[error("deploy.json is not valid JSON: {0}")]
    Parse(#[from] serde_json::Error),

    /// The document is JSON but lacks a required key.
    #[error("deploy.json must define deploy.type, deploy.target.dev and deploy.target.master or deploy.target.main")]
    Invalid,

    /// A required key is present with a value of the wrong shape.
    #[error("deploy.json is malformed: {0}")]
    Malformed(String),

    /// `deploy.type` names a target kind this system does not know.
    #[error("invalid deploy type '{0}'")]
    UnsupportedType(String),

    /// `deploy.target` has no bucket for the pushed branch.
    #[error("deploy.target has no entry for branch '{branch}'")]
    NoTarget { branch: BranchName },
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

/// Returns `true` if `document` has the minimum shape of a deploy descriptor.
pub fn validate_descriptor(document: &Value) -> bool {
    let Some(deploy) = document.get("deploy") else {
        return false;
    };
    let Some(target) = deploy.get("target") else {
        return false;
    };

    deploy.get("type").is_some()
        && target.get("dev").is_some()
        && (target.get("master").is_some() || target.get("main").is_some())
}

// ---------------------------------------------------------------------------
// Typed descriptor
// ---------------------------------------------------------------------------

/// The contents of the `deploy` object of a validated descriptor.
///
/// Serialised as `{type, target, subdir?}` inside a [`crate::DeployJob`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeployDescriptor {
    /// Raw deploy type. Interpreted by [`DeployDescriptor::deploy_kind`].
    #[serde(rename = "type")]
    pub kind: String,

    /// Branch name to bucket.
    pub target: BTreeMap<String, String>,

    /// Path inside the archive to treat as the deployment root.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subdir: Option<String>,
}

impl DeployDescriptor {
    /// Parses and validates a raw `deploy.json` document.
    pub fn from_document(bytes: &[u8]) -> Result<Self, DescriptorError> {
        let document: Value = serde_json::from_slice(bytes)?;
        if !validate_descriptor(&document) {
            return Err(DescriptorError::Invalid);
        }

        // validate_descriptor guarantees the key exists.
        let deploy = document.get("deploy").cloned().unwrap_or_default();
        serde_json::from_value(deploy).map_err(|e| DescriptorError::Malformed(e.to_string()))
    }

    /// The deploy target kind.
    pub fn deploy_kind(&self) -> Result<DeployKind, DescriptorError> {
        self.kind.parse()
    }

    /// The bucket that receives `branch`.
    pub fn bucket_for(&self, branch: &BranchName) -> Result<BucketName, DescriptorError> {
        self.target
            .get(branch.as_str())
            .and_then(|bucket| BucketName::new(bucket.as_str()))
            .ok_or_else(|| DescriptorError::NoTarget {
                branch: branch.clone(),
            })
    }
}

// ---------------------------------------------------------------------------
// Deploy kinds
// ---------------------------------------------------------------------------

/// The closed set of deploy target kinds.
///
/// Only [`DeployKind::S3`] has behaviour. [`DeployKind::ElasticBeanstalk`] is
/// recognised so that it can be refused explicitly rather than mistaken for a
/// typo.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeployKind {
    /// Mirror the tree into an object-storage bucket.
    S3,
    /// Application platform deploy. Not implemented.
    ElasticBeanstalk,
}

impl FromStr for DeployKind {
    type Err = DescriptorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "S3" => Ok(Self::S3),
            "EB" => Ok(Self::ElasticBeanstalk),
            other => Err(DescriptorError::UnsupportedType(other.to_string())),
        }
    }
}

impl std::fmt::Display for DeployKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::S3 => write!(f, "S3"),
            Self::ElasticBeanstalk => write!(f, "EB"),
        }
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;
    use serde_json::json;

    use super::*;

    #[test]
    fn test_master_and_dev_passes() {
        let doc = json!({"deploy": {"type": "S3", "target": {"master": "a", "dev": "b"}}});
        assert!(validate_descriptor(&doc));
    }

    #[test]
    fn test_main_and_dev_passes_without_master() {
        let doc = json!({"deploy": {"type": "S3", "target": {"main": "a", "dev": "b"}}});
        assert!(validate_descriptor(&doc));
    }

    #[test]
    fn test_missing_dev_is_rejected() {
        let doc = json!({"deploy": {"type": "S3", "target": {"master": "a", "main": "b"}}});
        assert!(!validate_descriptor(&doc));
    }

    #[test]
    fn test_dev_alone_is_rejected() {
        let doc = json!({"deploy": {"type": "S3", "target": {"dev": "b"}}});
        assert!(!validate_descriptor(&doc));
    }

    #[test]
    fn test_missing_type_or_target_is_rejected() {
        assert!(!validate_descriptor(&json!({"deploy": {"target": {"master": "a", "dev": "b"}}})));
        assert!(!validate_descriptor(&json!({"deploy": {"type": "S3"}})));
        assert!(!validate_descriptor(&json!({"type": "S3", "target": {"master": "a", "dev": "b"}})));
        assert!(!validate_descriptor(&json!(null)));
        assert!(!validate_descriptor(&json!("deploy")));
    }

    #[test]
    fn test_extra_fields_are_ignored() {
        let bytes = br#"{"version": 2, "deploy": {"type": "S3", "target": {"main": "a", "dev": "b", "qa": "c"}, "cache": true}}"#;
        let descriptor = DeployDescriptor::from_document(bytes).unwrap();
        assert_eq!(descriptor.target.len(), 3);
        assert_eq!(descriptor.subdir, None);
    }

    #[test]
    fn test_from_document_rejects_bad_json() {
        assert!(matches!(
            DeployDescriptor::from_document(b"{not json"),
            Err(DescriptorError::Parse(_))
        ));
    }

    #[test]
    fn test_from_document_rejects_non_string_bucket() {
        let bytes = br#"{"deploy": {"type": "S3", "target": {"main": 1, "dev": "b"}}}"#;
        assert!(matches!(
            DeployDescriptor::from_document(bytes),
            Err(DescriptorError::Malformed(_))
        ));
    }

    #[test]
    fn test_bucket_resolution_for_dev() {
        let bytes = br#"{"deploy": {"type": "S3", "target": {"dev": "bucket-dev", "main": "bucket-main"}}}"#;
        let descriptor = DeployDescriptor::from_document(bytes).unwrap();
        let branch = BranchName::new("dev").unwrap();
        assert_eq!(descriptor.bucket_for(&branch).unwrap().as_str(), "bucket-dev");
    }

    #[test]
    fn test_bucket_resolution_missing_branch() {
        let bytes = br#"{"deploy": {"type": "S3", "target": {"dev": "bucket-dev", "main": "bucket-main"}}}"#;
        let descriptor = DeployDescriptor::from_document(bytes).unwrap();
        let branch = BranchName::new("master").unwrap();
        assert!(matches!(
            descriptor.bucket_for(&branch),
            Err(DescriptorError::NoTarget { .. })
        ));
    }

    #[test]
    fn test_deploy_kind_parsing() {
        assert_eq!("S3".parse::<DeployKind>().unwrap(), DeployKind::S3);
        assert_eq!("EB".parse::<DeployKind>().unwrap(), DeployKind::ElasticBeanstalk);
        assert!(matches!(
            "s3".parse::<DeployKind>(),
            Err(DescriptorError::UnsupportedType(t)) if t == "s3"
        ));
    }

    #[test]
    fn test_job_wire_shape() {
        let descriptor = DeployDescriptor {
            kind: "S3".to_string(),
            target: BTreeMap::from([("dev".to_string(), "b".to_string())]),
            subdir: None,
        };
        let json = serde_json::to_value(&descriptor).unwrap();
        assert_eq!(json, json!({"type": "S3", "target": {"dev": "b"}}));
    }

    proptest! {
        /// Property: without a dev target, no combination of other targets validates.
        #[test]
        fn prop_missing_dev_never_validates(
            branches in prop::collection::btree_set("[a-z]{1,8}", 0..6)
        ) {
            let target: serde_json::Map<String, Value> = branches
                .into_iter()
                .filter(|b| b != "dev")
                .map(|b| (b, json!("bucket")))
                .collect();
            let doc = json!({"deploy": {"type": "S3", "target": target}});
            prop_assert!(!validate_descriptor(&doc));
        }

        /// Property: dev plus master-or-main always validates, whatever else is present.
        #[test]
        fn prop_dev_and_production_always_validates(
            extra in prop::collection::btree_set("[a-z]{1,8}", 0..6),
            use_main in any::<bool>(),
        ) {
            let mut target: serde_json::Map<String, Value> =
                extra.into_iter().map(|b| (b, json!("bucket"))).collect();
            target.insert("dev".to_string(), json!("bucket-dev"));
            let production = if use_main { "main" } else { "master" };
            target.insert(production.to_string(), json!("bucket-prod"));
            let doc = json!({"deploy": {"type": "S3", "target": target}});
            prop_assert!(validate_descriptor(&doc));
        }
    }
}
