use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Raw YAML representation of a suite file (e.g. `suite.yml`).
#[derive(Debug, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RawSuite {
    pub name: Option<String>,
    pub terraform: RawTerraform,
    /// Empty or absent = resolve from `ARM_SUBSCRIPTION_ID` at check time.
    #[serde(default)]
    pub subscription_id: String,
    #[serde(default)]
    pub expectations: RawExpectations,
}

#[derive(Debug, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RawTerraform {
    /// Definition tree, relative to the suite file.
    pub dir: String,
    /// Override the IaC binary. Absent = `terraform`.
    pub tool: Option<String>,
    /// Pinning files relative to `dir`. Absent = `[".tool-versions"]` if it exists.
    pub pin_files: Option<Vec<String>>,
    /// Variable files relative to the suite file.
    #[serde(default)]
    pub var_files: Vec<String>,
    #[serde(default)]
    pub retry: RawRetry,
}

#[derive(Debug, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RawRetry {
    pub max_retries: Option<u32>,
    pub time_between_retries_secs: Option<u64>,
    pub timeout_secs: Option<u64>,
    /// Added on top of the built-in retryable errors.
    #[serde(default)]
    pub extra_errors: BTreeMap<String, String>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RawExpectations {
    pub front_door_name: Option<String>,
    pub front_door_resource_group: Option<String>,
    #[serde(default)]
    pub resource_groups: BTreeMap<String, String>,
    #[serde(default)]
    pub web_app_names: BTreeMap<String, String>,
}
