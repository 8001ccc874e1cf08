//! Deploy worker service.
//!
//! The slow half of the pipeline. Each queued [`pipeline::DeployJob`] is
//! turned into a bucket whose object set mirrors the repository tree at the
//! pushed ref:
//!
//! 1. download the zip snapshot into a scratch directory private to the
//!    invocation,
//! 2. locate the deploy root inside the snapshot's synthetic top-level
//!    directory and extract only that subtree,
//! 3. mirror the extracted tree into the branch's bucket, uploading changed
//!    files and deleting objects with no local counterpart.
//!
//! Re-running a job converges to the same bucket state, so duplicate and
//! reordered deliveries are harmless.
//!
//! ## Outcomes
//!
//! [`Deployer::handle_message`] returns `Ok` for everything the queue must
//! not redeliver (success, and failures that only a repository change can
//! fix) and `Err` for failures worth retrying.
//!
//! ## Module Layout
//!
//! | Module | Contents |
//! |--------|----------|
//! | [`archive`] | Snapshot entry listing, root resolution, subtree extraction |
//! | [`sync`] | Local scan, sync planning, and the mirror upload/delete pass |
//! | [`job`] | Unwrapping job messages from queue envelopes |
//! | [`service`] | [`Deployer`], the per-job sequence and outcome classification |
//! | [`server`] | The axum router exposing it |

pub mod archive;
pub mod error;
pub mod job;
pub mod server;
pub mod service;
pub mod sync;

#[cfg(test)]
pub(crate) mod fixtures;

pub use archive::ArchiveError;
pub use error::{DeployError, DeployFailure};
pub use server::{build_router, DeployerState};
pub use service::{DeployResolution, Deployer};
pub use sync::{SyncError, SyncOptions, SyncProgress, SyncReport};
