//! Invocation core for the Jira and Xray APIs.
//!
//! Requests are described as [`Command`] values built by the [`factory`]
//! functions and sent by the [`CommandInvoker`], which also handles the Xray
//! session token exchange. [`retry`] and [`batch`] provide the resilience and
//! fan-out helpers the client facades build on.

pub mod auth;
pub mod batch;
pub mod command;
pub mod error;
pub mod factory;
pub mod invoker;
pub mod reply;
pub mod retry;
pub mod session;
pub mod types;

pub use auth::{Auth, AuthContext};
pub use command::{Body, Command, Verb, SESSION_HEADER};
pub use error::{ApiError, Result};
pub use invoker::CommandInvoker;
pub use reply::{Reply, SENTINEL_ID};
pub use retry::{with_retry, RetryPolicy, Retryable};
pub use session::SessionResolver;
