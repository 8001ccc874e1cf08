//! Webhook listener service.
//!
//! The fast half of the pipeline. Each inbound webhook call is authenticated,
//! filtered by event type and branch, enriched with the repository's
//! `deploy.json`, and handed to the job queue as a [`pipeline::DeployJob`].
//! The listener keeps no local state between calls.
//!
//! Every call produces exactly one [`ListenerResponse`]. Failures additionally
//! produce exactly one error record; filter rejections do not.
//!
//! ## Architectural Layer
//!
//! **Service.** Sequences calls to the [`pipeline`] ports. It never talks to
//! GitHub or the queue directly; the binary injects the adapters.
//!
//! ## Module Layout
//!
//! | Module | Contents |
//! |--------|----------|
//! | [`notification`] | The subset of the push payload the listener reads |
//! | [`policy`] | Accepted event types, branches, and the job topic |
//! | [`response`] | The JSON response envelope and canned messages |
//! | [`service`] | [`Listener`], the validation pipeline |
//! | [`server`] | The axum router exposing it |

pub mod error;
pub mod notification;
pub mod policy;
pub mod response;
pub mod server;
pub mod service;

pub use error::ListenerError;
pub use notification::PushNotification;
pub use policy::ListenerPolicy;
pub use response::{ListenerResponse, ResponseBody};
pub use server::{build_router, ListenerState};
pub use service::{Listener, WebhookRequest};
