use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use tfverify_driver::{AzureVerifier, AzureVerifierConfig, ProviderVerifier, Provisioner, TerraformBackend};
use tfverify_harness::{builtin_cases, Suite, TestCase, BUILTIN_CASE_NAMES};
use tracing::{info, warn};

use crate::cli::{AzureArgs, ReportFormat};
use crate::output;

// ── Run ───────────────────────────────────────────────────────────────────────

/// Run the suite end to end. Returns the process exit code.
pub async fn run(
    suite_path: PathBuf,
    only: Vec<String>,
    format: ReportFormat,
    azure: AzureArgs,
) -> Result<i32> {
    let config = tfverify_config::load_suite(&suite_path)
        .with_context(|| format!("Failed to load suite {}", suite_path.display()))?;

    let cases = select_cases(builtin_cases(&config.expectations), &only)?;
    info!(suite = %config.name, cases = cases.len(), "suite loaded");

    let provisioner: Arc<dyn Provisioner> =
        Arc::new(TerraformBackend::new(config.terraform.binary.clone()));
    let verifier: Arc<dyn ProviderVerifier> = Arc::new(AzureVerifier::new(AzureVerifierConfig {
        default_subscription: azure.subscription_id,
        tenant_id: azure.tenant_id,
        client_id: azure.client_id,
        client_secret: azure.client_secret,
        ..AzureVerifierConfig::from_env()
    }));

    let report = Suite::new(config, provisioner, verifier)
        .run(cases, interrupt())
        .await;

    let rendered = match format {
        ReportFormat::Text => output::render_text(&report),
        ReportFormat::Json => {
            serde_json::to_string_pretty(&report).context("Failed to serialize report")?
        }
    };
    println!("{}", rendered);

    Ok(report.exit_code())
}

/// Keep the built-in order; `--only` narrows it. Unknown or inapplicable
/// names are an error rather than a silent no-op.
fn select_cases(all: Vec<Arc<dyn TestCase>>, only: &[String]) -> Result<Vec<Arc<dyn TestCase>>> {
    if only.is_empty() {
        return Ok(all);
    }
    for name in only {
        if !all.iter().any(|c| c.name() == name) {
            if BUILTIN_CASE_NAMES.contains(&name.as_str()) {
                anyhow::bail!("test case '{name}' needs expectations the suite file does not set");
            }
            anyhow::bail!(
                "unknown test case '{name}' (available: {})",
                BUILTIN_CASE_NAMES.join(", ")
            );
        }
    }
    Ok(all.into_iter().filter(|c| only.iter().any(|o| o == c.name())).collect())
}

/// Resolves on Ctrl-C. If the handler cannot be installed the run is simply
/// not interruptible.
async fn interrupt() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "could not listen for Ctrl-C");
        std::future::pending::<()>().await;
    }
}

// ── Cases ─────────────────────────────────────────────────────────────────────

pub fn cases() -> Result<()> {
    for name in BUILTIN_CASE_NAMES {
        println!("{}", name);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tfverify_domain::Expectations;

    fn full() -> Vec<Arc<dyn TestCase>> {
        builtin_cases(&Expectations {
            front_door_name: Some("fd".into()),
            front_door_resource_group: Some("rg".into()),
            resource_groups: [("eastus".to_string(), "rg-eus".to_string())].into(),
            web_app_names: [("eastus".to_string(), "app-eus".to_string())].into(),
        })
    }

    fn names(cases: &[Arc<dyn TestCase>]) -> Vec<String> {
        cases.iter().map(|c| c.name().to_string()).collect()
    }

    #[test]
    fn no_filter_keeps_everything() {
        assert_eq!(names(&select_cases(full(), &[]).unwrap()), BUILTIN_CASE_NAMES);
    }

    #[test]
    fn filter_keeps_builtin_order() {
        let only = vec!["web_app".to_string(), "front_door".to_string()];
        assert_eq!(names(&select_cases(full(), &only).unwrap()), ["front_door", "web_app"]);
    }

    #[test]
    fn unknown_case_is_rejected() {
        let err = select_cases(full(), &["nope".to_string()]).err().unwrap();
        assert!(err.to_string().contains("unknown test case 'nope'"));
    }

    #[test]
    fn inapplicable_case_is_rejected() {
        let cases = builtin_cases(&Expectations::default());
        let err = select_cases(cases, &["front_door".to_string()]).err().unwrap();
        assert!(err.to_string().contains("needs expectations"));
    }
}
