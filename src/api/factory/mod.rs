//! Command factories.
//!
//! Pure functions that build one [`Command`](super::Command) per supported
//! operation. Nothing here performs I/O.

pub mod jira;
pub mod xray;
