use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(
    name = "tfverify",
    about = "Provision a Terraform environment, verify it against Azure, and destroy it",
    version
)]
pub struct Cli {
    /// Emit logs as JSON lines instead of human-readable text.
    #[arg(long, global = true)]
    pub log_json: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run a verification suite: provision, run test cases, destroy.
    Run {
        /// Path to the suite YAML file.
        #[arg(env = "TFVERIFY_SUITE")]
        suite: PathBuf,

        /// Run only the named test case (repeatable).
        #[arg(long = "only", value_name = "CASE")]
        only: Vec<String>,

        /// Report format.
        #[arg(long, default_value = "text")]
        output: ReportFormat,

        #[command(flatten)]
        azure: AzureArgs,
    },

    /// List the built-in test cases.
    Cases,
}

/// Credentials for the read-only ARM checks. Unset values fall back to
/// managed identity, then the Azure CLI login.
#[derive(Debug, clap::Args)]
pub struct AzureArgs {
    /// Subscription used when the suite does not name one.
    #[arg(long, env = "ARM_SUBSCRIPTION_ID")]
    pub subscription_id: Option<String>,

    #[arg(long, env = "ARM_TENANT_ID")]
    pub tenant_id: Option<String>,

    #[arg(long, env = "ARM_CLIENT_ID")]
    pub client_id: Option<String>,

    #[arg(long, env = "ARM_CLIENT_SECRET", hide_env_values = true)]
    pub client_secret: Option<String>,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum ReportFormat {
    Text,
    Json,
}
