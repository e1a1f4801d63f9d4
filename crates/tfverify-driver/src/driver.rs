use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;

use async_trait::async_trait;
use serde_json::Value;
use tfverify_domain::{OutputSet, ResourceIdentity, RetryPolicy};

use crate::error::DriverError;

/// Everything a provisioning call needs to act on one working copy.
#[derive(Debug, Clone)]
pub struct ProvisionOptions {
    /// Isolated copy of the definition tree. Commands run here.
    pub working_dir: PathBuf,
    /// Absolute paths passed as `-var-file=`.
    pub var_files: Vec<PathBuf>,
    pub retry: RetryPolicy,
    /// Extra environment for the subprocess (cloud auth, `TF_LOG`, ...).
    pub env: HashMap<String, String>,
}

/// The provisioning tool, seen as an opaque, CLI-backed collaborator.
#[async_trait]
pub trait Provisioner: Send + Sync + 'static {
    fn name(&self) -> &'static str;

    // ── Mutating ──────────────────────────────────────────────────────────────

    /// `init` followed by `apply`. Transient failures matching the retry
    /// policy are retried inside this call.
    async fn init_and_apply(&self, opts: &ProvisionOptions) -> Result<(), DriverError>;

    /// Remove everything the working copy's state knows about.
    async fn destroy(&self, opts: &ProvisionOptions) -> Result<(), DriverError>;

    // ── Read-only ─────────────────────────────────────────────────────────────

    /// Every declared output in one read.
    async fn outputs(&self, opts: &ProvisionOptions) -> Result<OutputSet, DriverError>;

    /// A single scalar output. Each call re-reads the state; prefer
    /// [`Provisioner::outputs`] when more than one value is needed.
    async fn output(&self, opts: &ProvisionOptions, name: &str) -> Result<String, DriverError> {
        Ok(self.outputs(opts).await?.scalar(name)?.to_string())
    }

    /// A single map output. Same caveat as [`Provisioner::output`].
    async fn output_map(
        &self,
        opts: &ProvisionOptions,
        name: &str,
    ) -> Result<BTreeMap<String, String>, DriverError> {
        Ok(self.outputs(opts).await?.map(name)?.clone())
    }
}

/// Read-only access to the live cloud provider.
///
/// Implementations must not cache lookups: every call is a fresh query, so
/// drift between declared and actual state is always visible.
#[async_trait]
pub trait ProviderVerifier: Send + Sync + 'static {
    fn name(&self) -> &'static str;

    /// Fetch the resource body, or `None` when the provider reports it absent.
    /// An empty subscription in `id` is resolved from the ambient context.
    async fn lookup(&self, id: &ResourceIdentity) -> Result<Option<Value>, DriverError>;

    async fn exists(&self, id: &ResourceIdentity) -> Result<bool, DriverError> {
        Ok(self.lookup(id).await?.is_some())
    }
}
