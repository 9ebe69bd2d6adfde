//! Jira and Xray test management over a single command invoker.
//!
//! Requests are built as [`api::Command`] values by the factories in
//! [`api::factory`], sent by [`api::CommandInvoker`] (which adds Basic auth
//! for Jira and the `X-acpt` session token for Xray), and composed into
//! task-level operations by [`client`] and [`orchestration`].

pub mod api;
pub mod cache;
pub mod client;
pub mod config;
pub mod error;
pub mod logging;
pub mod orchestration;
