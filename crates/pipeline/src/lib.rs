//! Core domain for the push-to-bucket deployment pipeline.
//!
//! This crate contains every domain concept, newtype identifier, validation
//! rule, and port trait shared by the listener and the deployer.
//! Infrastructure crates implement the traits defined here; they never add
//! domain rules.
//!
//! ## Architectural Layer
//!
//! **Business logic + port definitions.** This crate has no network I/O.
//! It defines *what* is needed; infrastructure crates define *how* to supply it.
//!
//! ## Module Layout
//!
//! | Module | Contents |
//! |--------|----------|
//! | [`identifiers`] | Newtype identifiers (`RepositoryOwner`, `GitRef`, `BucketName`, etc.) |
//! | [`types`] | `DeployJob`, `ErrorRecord`, `ExecutionIdentity`, `Timestamp` |
//! | [`descriptor`] | `deploy.json` validation and the typed `DeployDescriptor` |
//! | [`signature`] | Webhook HMAC signing and constant-time verification |
//! | [`etag`] | Locally computed object-store entity tags |
//! | [`errors`] | Port error types and the retry policy |
//! | [`ports`] | `SourceRepository`, `JobPublisher`, `ObjectStore`, `ErrorLog` |
//! | [`reporting`] | The fire-and-forget `ErrorReporter` |
//! | [`config`] | Process-wide credentials |

pub mod config;
pub mod descriptor;
pub mod errors;
pub mod etag;
pub mod identifiers;
pub mod ports;
pub mod reporting;
pub mod signature;
pub mod types;

#[cfg(any(test, feature = "test-support"))]
pub mod testing;

// Re-export everything at the crate root for ergonomic usage by downstream crates.
pub use config::Credentials;
pub use descriptor::{validate_descriptor, DeployDescriptor, DeployKind, DescriptorError};
pub use errors::{
    ConfigError, ErrorLogError, ObjectStoreError, PublishError, RetryPolicy, SourceError,
};
pub use identifiers::{
    BranchName, BucketName, FunctionName, GitRef, InvocationId, ObjectKey, RepositoryName,
    RepositoryOwner,
};
pub use ports::{CompletedPart, ErrorLog, JobPublisher, ObjectStore, RemoteObject, SourceRepository};
pub use reporting::ErrorReporter;
pub use types::{
    DeployJob, ErrorRecord, ExecutionIdentity, InvocationContext, RepositoryRef, Timestamp,
};
