//! Tuning settings shared by every client.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::api::RetryPolicy;

/// Default Xray Cloud address.
pub const DEFAULT_XRAY_BASE_URL: &str = "https://xray.cloud.getxray.app";

/// Application-wide settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Settings {
    /// The name of the default profile to use.
    pub default_profile: Option<String>,
    /// Maximum number of concurrent calls during fan-out.
    pub max_parallel: usize,
    /// Attempts per side-effecting call, including the first.
    pub retry_attempts: u32,
    /// Fixed delay between attempts in milliseconds.
    pub retry_delay_ms: u64,
    /// Per-request timeout in seconds.
    pub request_timeout_secs: u64,
    /// Base address of the Xray API.
    pub xray_base_url: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            default_profile: None,
            max_parallel: 4,
            retry_attempts: 3,
            retry_delay_ms: 1000,
            request_timeout_secs: crate::api::invoker::DEFAULT_TIMEOUT_SECS,
            xray_base_url: DEFAULT_XRAY_BASE_URL.to_string(),
        }
    }
}

impl Settings {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.retry_attempts, Duration::from_millis(self.retry_delay_ms))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }

    /// The fan-out cap, never below one.
    pub fn parallelism(&self) -> usize {
        self.max_parallel.max(1)
    }
}
