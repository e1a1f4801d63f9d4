use std::sync::Arc;

use async_trait::async_trait;
use tfverify_domain::{pair_regions, Expectations, RegionMap, ResourceKind};
use tracing::info;

use crate::assertions::AssertionSet;
use crate::context::{SuiteContext, TestCase};
use crate::error::CaseError;

/// Built-in cases for the configured expectations, in execution order.
///
/// Cases whose expectations are absent are left out; the key vault and
/// resource group cases need no literals and are always present.
pub fn builtin_cases(exp: &Expectations) -> Vec<Arc<dyn TestCase>> {
    let mut cases: Vec<Arc<dyn TestCase>> = Vec::new();
    if let (Some(name), Some(group)) = (&exp.front_door_name, &exp.front_door_resource_group) {
        cases.push(Arc::new(FrontDoorCase {
            expected_name: name.clone(),
            resource_group: group.clone(),
        }));
    }
    if !exp.resource_groups.is_empty() {
        cases.push(Arc::new(StorageAccountCase {
            resource_groups: exp.resource_groups.clone(),
        }));
    }
    cases.push(Arc::new(KeyVaultCase));
    cases.push(Arc::new(ResourceGroupCase {
        expected: exp.resource_groups.clone(),
    }));
    if !exp.web_app_names.is_empty() {
        cases.push(Arc::new(WebAppCase {
            names: exp.web_app_names.clone(),
            resource_groups: exp.resource_groups.clone(),
        }));
    }
    cases
}

/// Names of every built-in case, whether or not it would be scheduled.
pub const BUILTIN_CASE_NAMES: [&str; 5] =
    ["front_door", "storage_account", "key_vault", "resource_group", "web_app"];

// ── Front door ────────────────────────────────────────────────────────────────

pub struct FrontDoorCase {
    pub expected_name: String,
    pub resource_group: String,
}

#[async_trait]
impl TestCase for FrontDoorCase {
    fn name(&self) -> &str {
        "front_door"
    }

    async fn run(&self, ctx: &SuiteContext, asserts: &mut AssertionSet) -> Result<(), CaseError> {
        let actual_name = ctx.scalar("front_door_name")?;
        let actual_id = ctx.scalar("front_door_id")?;

        asserts.equal(actual_name, self.expected_name.as_str(), "The names should match");
        asserts.not_empty(actual_id, "Front Door ID cannot be empty");

        let front_door = ctx.identity(ResourceKind::FrontDoor, &self.expected_name, &self.resource_group);
        ctx.expect_exists(asserts, &front_door).await;

        for (endpoint, id) in ctx.map("frontend_endpoints")? {
            info!(endpoint = %endpoint, id = %id, "checking frontend endpoint");
            let kind = ResourceKind::FrontDoorFrontendEndpoint {
                front_door: self.expected_name.clone(),
            };
            ctx.expect_exists(asserts, &ctx.identity(kind, endpoint, &self.resource_group))
                .await;
        }

        if let Some(body) = ctx.lookup(&front_door).await? {
            let frontdoor_id = body["properties"]["frontdoorId"].as_str().unwrap_or_default();
            info!(front_door = %self.expected_name, frontdoor_id, "front door found");
        }
        Ok(())
    }
}

// ── Storage accounts ──────────────────────────────────────────────────────────

pub struct StorageAccountCase {
    /// Region → resource group holding that region's account.
    pub resource_groups: RegionMap,
}

#[async_trait]
impl TestCase for StorageAccountCase {
    fn name(&self) -> &str {
        "storage_account"
    }

    async fn run(&self, ctx: &SuiteContext, asserts: &mut AssertionSet) -> Result<(), CaseError> {
        let names = ctx.map("storage_account_names")?;
        for pair in pair_regions("storage_account_names", &self.resource_groups, names)? {
            let id = ctx.identity(ResourceKind::StorageAccount, pair.actual, pair.expected);
            ctx.expect_exists(asserts, &id).await;
        }
        Ok(())
    }
}

// ── Key vaults ────────────────────────────────────────────────────────────────

pub struct KeyVaultCase;

#[async_trait]
impl TestCase for KeyVaultCase {
    fn name(&self) -> &str {
        "key_vault"
    }

    async fn run(&self, ctx: &SuiteContext, asserts: &mut AssertionSet) -> Result<(), CaseError> {
        for id in ctx.map("key_vault_ids")?.values() {
            asserts.not_empty(id.as_str(), "Key Vault ID should not be empty");
        }
        Ok(())
    }
}

// ── Resource groups ───────────────────────────────────────────────────────────

pub struct ResourceGroupCase {
    /// When non-empty, the output must carry exactly these regions and names.
    pub expected: RegionMap,
}

#[async_trait]
impl TestCase for ResourceGroupCase {
    fn name(&self) -> &str {
        "resource_group"
    }

    async fn run(&self, ctx: &SuiteContext, asserts: &mut AssertionSet) -> Result<(), CaseError> {
        let groups = ctx.map("resource_group_names")?;
        if !self.expected.is_empty() {
            for pair in pair_regions("resource_group_names", &self.expected, groups)? {
                asserts.equal(
                    pair.actual,
                    pair.expected,
                    format!("Resource group for {} should match", pair.region),
                );
            }
        }
        for name in groups.values() {
            ctx.expect_exists(asserts, &ctx.resource_group(name)).await;
        }
        Ok(())
    }
}

// ── Web apps ──────────────────────────────────────────────────────────────────

pub struct WebAppCase {
    /// Region → expected web app name.
    pub names: RegionMap,
    /// Region → resource group of that region's app.
    pub resource_groups: RegionMap,
}

#[async_trait]
impl TestCase for WebAppCase {
    fn name(&self) -> &str {
        "web_app"
    }

    async fn run(&self, ctx: &SuiteContext, asserts: &mut AssertionSet) -> Result<(), CaseError> {
        let actual_names = ctx.map("web_app_names")?;
        let actual_ids = ctx.map("web_app_ids")?;

        for pair in pair_regions("web_app_names", &self.names, actual_names)? {
            asserts.equal(pair.actual, pair.expected, "The names should match");
        }

        for id in actual_ids.values() {
            asserts.not_empty(id.as_str(), "Web App ID cannot be empty");
        }

        for (region, name) in &self.names {
            let group = self.resource_groups.get(region).ok_or_else(|| {
                CaseError::Expectation(format!("no resource group expected for region '{}'", region))
            })?;
            ctx.expect_exists(asserts, &ctx.identity(ResourceKind::WebApp, name, group))
                .await;
        }
        Ok(())
    }
}
