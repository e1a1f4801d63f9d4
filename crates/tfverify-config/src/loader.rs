use std::path::{Path, PathBuf};
use std::time::Duration;

use tfverify_domain::{Expectations, RetryPolicy, SuiteConfig, TerraformSettings};
use tracing::debug;

use crate::error::ConfigError;
use crate::raw::{RawExpectations, RawRetry, RawSuite};

const DEFAULT_PIN_FILE: &str = ".tool-versions";

/// Load a suite file.
///
/// Relative paths inside the file are resolved against the directory that
/// contains it, so a suite can be invoked from anywhere:
/// ```text
/// infra/
///   .tool-versions
///   main.tf
///   tests/
///     demo.tfvars
///     suite.yml         <- terraform.dir: "..", var_files: ["demo.tfvars"]
/// ```
pub fn load_suite(path: &Path) -> Result<SuiteConfig, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
        path: path.display().to_string(),
        source: e,
    })?;
    let base = path.parent().unwrap_or_else(|| Path::new("."));
    parse_suite(&content, base, path)
}

/// Parse suite YAML, resolving relative paths against `base`.
/// `origin` is only used in error messages.
pub fn parse_suite(content: &str, base: &Path, origin: &Path) -> Result<SuiteConfig, ConfigError> {
    let raw: RawSuite = serde_yaml::from_str(content).map_err(|e| ConfigError::YamlParse {
        path: origin.display().to_string(),
        source: e,
    })?;
    debug!("Loading suite from {}", origin.display());
    convert_suite(raw, base, origin)
}

fn convert_suite(raw: RawSuite, base: &Path, origin: &Path) -> Result<SuiteConfig, ConfigError> {
    let source_dir = canonical(&base.join(&raw.terraform.dir))?;
    if !source_dir.is_dir() {
        return Err(invalid(origin, format!("terraform.dir '{}' is not a directory", source_dir.display())));
    }

    let pin_files = match raw.terraform.pin_files {
        Some(names) => names
            .iter()
            .map(|n| canonical(&source_dir.join(n)))
            .collect::<Result<Vec<_>, _>>()?,
        None => {
            let default = source_dir.join(DEFAULT_PIN_FILE);
            if default.is_file() { vec![default] } else { Vec::new() }
        }
    };

    let var_files = raw
        .terraform
        .var_files
        .iter()
        .map(|f| canonical(&base.join(f)))
        .collect::<Result<Vec<_>, _>>()?;

    let name = raw.name.unwrap_or_else(|| {
        source_dir
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "suite".into())
    });

    Ok(SuiteConfig {
        name,
        terraform: TerraformSettings {
            source_dir,
            binary: raw.terraform.tool.unwrap_or_else(|| "terraform".into()),
            pin_files,
            var_files,
            retry: convert_retry(raw.terraform.retry),
        },
        subscription_id: raw.subscription_id,
        expectations: convert_expectations(raw.expectations, origin)?,
    })
}

fn convert_retry(raw: RawRetry) -> RetryPolicy {
    let mut policy = RetryPolicy::default();
    if let Some(n) = raw.max_retries {
        policy.max_retries = n;
    }
    if let Some(secs) = raw.time_between_retries_secs {
        policy.time_between_retries = Duration::from_secs(secs);
    }
    if let Some(secs) = raw.timeout_secs {
        policy.command_timeout = Duration::from_secs(secs);
    }
    policy.retryable_errors.extend(raw.extra_errors);
    policy
}

fn convert_expectations(raw: RawExpectations, origin: &Path) -> Result<Expectations, ConfigError> {
    if raw.front_door_name.is_some() && raw.front_door_resource_group.is_none() {
        return Err(invalid(
            origin,
            "expectations.front_door_name requires expectations.front_door_resource_group".into(),
        ));
    }
    for (region, _) in raw.web_app_names.iter() {
        if !raw.resource_groups.contains_key(region) {
            return Err(invalid(
                origin,
                format!("web app region '{}' has no entry in expectations.resource_groups", region),
            ));
        }
    }
    Ok(Expectations {
        front_door_name: raw.front_door_name,
        front_door_resource_group: raw.front_door_resource_group,
        resource_groups: raw.resource_groups,
        web_app_names: raw.web_app_names,
    })
}

fn canonical(path: &Path) -> Result<PathBuf, ConfigError> {
    std::fs::canonicalize(path).map_err(|e| ConfigError::Io {
        path: path.display().to_string(),
        source: e,
    })
}

fn invalid(origin: &Path, message: String) -> ConfigError {
    ConfigError::Invalid {
        path: origin.display().to_string(),
        message,
    }
}
