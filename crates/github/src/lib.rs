//! GitHub infrastructure adapter.
//!
//! Implements [`pipeline::SourceRepository`] over the GitHub REST API:
//!
//! - `fetch_file` uses the contents endpoint and decodes its base64 payload.
//! - `download_archive` streams the zipball endpoint into a local file.
//!
//! It also exposes [`GitHubClient::create_webhook`], used by operators to
//! point a repository's push events at the listener.
//!
//! ## Architectural Layer
//!
//! **Infrastructure.** This crate must not contain domain rules. All GitHub
//! API details (headers, status mapping, payload encodings) are handled here;
//! the [`pipeline`] crate never sees them.

mod client;
mod error;
mod hooks;

pub use client::{GitHubClient, DEFAULT_API_URL};
pub use error::GitHubError;
pub use hooks::WebhookRegistration;
