use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tfverify_domain::{OutputSet, ResourceIdentity, ResourceKind};
use tfverify_driver::ProviderVerifier;

use crate::assertions::AssertionSet;
use crate::error::CaseError;

/// Read-only view of a provisioned environment, built once by setup and
/// shared by every test case.
pub struct SuiteContext {
    outputs: OutputSet,
    subscription: String,
    verifier: Arc<dyn ProviderVerifier>,
}

impl SuiteContext {
    pub fn new(
        outputs: OutputSet,
        subscription: impl Into<String>,
        verifier: Arc<dyn ProviderVerifier>,
    ) -> Self {
        Self {
            outputs,
            subscription: subscription.into(),
            verifier,
        }
    }

    pub fn outputs(&self) -> &OutputSet {
        &self.outputs
    }

    // ── Output accessor ───────────────────────────────────────────────────────

    pub fn scalar(&self, name: &str) -> Result<&str, CaseError> {
        Ok(self.outputs.scalar(name)?)
    }

    pub fn map(&self, name: &str) -> Result<&BTreeMap<String, String>, CaseError> {
        Ok(self.outputs.map(name)?)
    }

    // ── Provider state ────────────────────────────────────────────────────────

    /// Identity within this suite's subscription (possibly empty = ambient).
    pub fn identity(&self, kind: ResourceKind, name: &str, resource_group: &str) -> ResourceIdentity {
        ResourceIdentity::new(kind, name, resource_group, self.subscription.as_str())
    }

    pub fn resource_group(&self, name: &str) -> ResourceIdentity {
        ResourceIdentity::resource_group(name, self.subscription.as_str())
    }

    /// Fetch a resource body. Absent resources are `None`.
    pub async fn lookup(&self, id: &ResourceIdentity) -> Result<Option<Value>, CaseError> {
        Ok(self.verifier.lookup(id).await?)
    }

    /// Query the provider and record whether `id` exists. A failed query is
    /// recorded as a failed assertion rather than aborting the case.
    pub async fn expect_exists(&self, asserts: &mut AssertionSet, id: &ResourceIdentity) -> bool {
        let message = format!("{} should exist", id);
        match self.verifier.exists(id).await {
            Ok(true) => asserts.record(true, "present", "present", message),
            Ok(false) => asserts.record(false, "absent", "present", message),
            Err(e) => asserts.record(false, format!("lookup failed: {}", e), "present", message),
        }
    }
}

/// One independent verification procedure.
///
/// Cases never mutate the environment and must not rely on each other's
/// side effects. Returning an error ends the case as failed; the suite moves
/// on to the next one.
#[async_trait]
pub trait TestCase: Send + Sync + 'static {
    fn name(&self) -> &str;

    async fn run(&self, ctx: &SuiteContext, asserts: &mut AssertionSet) -> Result<(), CaseError>;
}
