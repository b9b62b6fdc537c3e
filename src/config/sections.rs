//! Per-component configuration sections

use crate::workflow::TrackerConfig;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Connection to the content service
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ServiceConfig {
    /// Base URL of the service API
    #[serde(default)]
    pub base_url: String,

    /// Bearer token, if the service requires one
    pub api_key: Option<String>,

    /// Timeout in seconds for each request
    #[serde(default = "default_service_timeout")]
    pub timeout: u64,
}

fn default_service_timeout() -> u64 {
    30
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            api_key: None,
            timeout: default_service_timeout(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct TrackerSettings {
    /// Seconds between poll cycles
    #[serde(default = "default_poll_interval")]
    pub poll_interval: u64,

    /// Consecutive poll failures before an execution is failed locally
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,

    /// Timeout in seconds for each status fetch
    #[serde(default = "default_request_timeout")]
    pub request_timeout: u64,
}

fn default_poll_interval() -> u64 {
    5
}

fn default_failure_threshold() -> u32 {
    5
}

fn default_request_timeout() -> u64 {
    30
}

impl Default for TrackerSettings {
    fn default() -> Self {
        Self {
            poll_interval: default_poll_interval(),
            failure_threshold: default_failure_threshold(),
            request_timeout: default_request_timeout(),
        }
    }
}

impl TrackerSettings {
    pub fn to_tracker_config(&self) -> TrackerConfig {
        TrackerConfig {
            poll_interval: Duration::from_secs(self.poll_interval.max(1)),
            request_timeout: Duration::from_secs(self.request_timeout),
            failure_threshold: self.failure_threshold.max(1),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct PublishSettings {
    /// Minimum seconds between two publishes
    #[serde(default = "default_min_interval")]
    pub min_interval: u64,

    /// Timeout in seconds for the publish call
    #[serde(default = "default_publish_timeout")]
    pub timeout: u64,
}

fn default_min_interval() -> u64 {
    60
}

fn default_publish_timeout() -> u64 {
    60
}

impl Default for PublishSettings {
    fn default() -> Self {
        Self {
            min_interval: default_min_interval(),
            timeout: default_publish_timeout(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct HistorySettings {
    /// SQLite database path; history is kept in memory when unset
    pub path: Option<String>,
}

impl HistorySettings {
    /// Database path with `~` expanded
    pub fn resolved_path(&self) -> Option<PathBuf> {
        self.path
            .as_deref()
            .map(|p| PathBuf::from(shellexpand::tilde(p).into_owned()))
    }
}
