use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use crate::types::RegionMap;

/// Fully resolved suite definition. All paths are absolute.
#[derive(Debug, Clone, PartialEq)]
pub struct SuiteConfig {
    pub name: String,
    pub terraform: TerraformSettings,
    /// Empty means "use the ambient default subscription".
    pub subscription_id: String,
    pub expectations: Expectations,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TerraformSettings {
    /// Canonical definition tree. Never written to; it is copied before use.
    pub source_dir: PathBuf,
    /// `terraform` or `tofu`.
    pub binary: String,
    /// Version-pinning files copied into the working copy (e.g. `.tool-versions`).
    pub pin_files: Vec<PathBuf>,
    pub var_files: Vec<PathBuf>,
    pub retry: RetryPolicy,
}

/// How the provisioning call treats transient failures.
///
/// A failed command whose output contains any key of `retryable_errors` is
/// retried up to `max_retries` times, sleeping `time_between_retries` between
/// attempts. Every attempt is bounded by `command_timeout`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub time_between_retries: Duration,
    pub command_timeout: Duration,
    /// Output substring → human description of the transient condition.
    pub retryable_errors: BTreeMap<String, String>,
}

impl RetryPolicy {
    /// Returns the description of the first retryable pattern found in `log`.
    pub fn retryable_match(&self, log: &str) -> Option<&str> {
        self.retryable_errors
            .iter()
            .find(|(pattern, _)| log.contains(pattern.as_str()))
            .map(|(_, description)| description.as_str())
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            time_between_retries: Duration::from_secs(5),
            command_timeout: Duration::from_secs(1800),
            retryable_errors: default_retryable_errors(),
        }
    }
}

fn default_retryable_errors() -> BTreeMap<String, String> {
    [
        ("read: connection reset by peer", "Transient network error."),
        ("transport is closing", "Provider connection closed unexpectedly."),
        ("unable to verify signature", "Failed to retrieve plugin due to transient network error."),
        ("unable to verify checksum", "Failed to retrieve plugin due to transient network error."),
        ("no provider exists with the given name", "Failed to retrieve plugin due to transient network error."),
        ("registry service is unreachable", "Failed to retrieve plugin due to transient network error."),
        ("Error installing provider", "Failed to install provider due to transient network error."),
        ("Failed to query available provider packages", "Failed to retrieve plugin due to transient network error."),
        ("timeout while waiting for plugin to start", "Failed to start provider plugin."),
        ("timed out waiting for server handshake", "Timed out waiting for provider plugin handshake."),
        ("could not query provider registry for", "Failed to retrieve plugin due to transient network error."),
        ("Client.Timeout exceeded while awaiting headers", "Client timeout awaiting response headers."),
        ("Could not retrieve the list of available versions for provider", "Failed to retrieve plugin due to transient network error."),
        ("TLS handshake timeout", "TLS handshake timed out."),
        ("Provider produced inconsistent result after apply", "Provider eventual consistency error."),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect()
}

/// Literal values the built-in test cases compare the outputs against.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Expectations {
    pub front_door_name: Option<String>,
    /// Resource group holding the front door.
    pub front_door_resource_group: Option<String>,
    /// Region → resource group name.
    pub resource_groups: RegionMap,
    /// Region → web app name.
    pub web_app_names: RegionMap,
}
