use async_trait::async_trait;
use serde_json::Value;
use tfverify_domain::{ResourceIdentity, ResourceKind};
use tracing::{debug, info};

use crate::driver::ProviderVerifier;
use crate::error::DriverError;
use crate::token::{TokenCache, TokenSource};

// ── Configuration ─────────────────────────────────────────────────────────────

/// Operator-level settings for talking to Azure Resource Manager.
#[derive(Clone, Default)]
pub struct AzureVerifierConfig {
    /// Used when a resource identity carries an empty subscription.
    pub default_subscription: Option<String>,
    /// Azure tenant ID (GUID). Required for service principal auth.
    pub tenant_id: Option<String>,
    /// Service principal client ID, or the user-assigned identity to use
    /// with managed identity.
    pub client_id: Option<String>,
    /// Service principal client secret. Without it, managed identity or the
    /// Azure CLI login is used.
    pub client_secret: Option<String>,
    /// `IDENTITY_ENDPOINT` injected by App Service and Container Apps.
    pub identity_endpoint: Option<String>,
    /// `IDENTITY_HEADER`, sent back to the identity endpoint.
    pub identity_header: Option<String>,
    /// `ARM_USE_MSI`: use the VM instance metadata service.
    pub use_msi: bool,
}

impl AzureVerifierConfig {
    /// Read the `ARM_*` variables the azurerm provider itself uses.
    pub fn from_env() -> Self {
        let var = |k: &str| std::env::var(k).ok().filter(|v| !v.is_empty());
        Self {
            default_subscription: var("ARM_SUBSCRIPTION_ID"),
            tenant_id: var("ARM_TENANT_ID"),
            client_id: var("ARM_CLIENT_ID"),
            client_secret: var("ARM_CLIENT_SECRET"),
            identity_endpoint: var("IDENTITY_ENDPOINT"),
            identity_header: var("IDENTITY_HEADER"),
            use_msi: var("ARM_USE_MSI").is_some_and(|v| v.eq_ignore_ascii_case("true") || v == "1"),
        }
    }
}

const MANAGEMENT_BASE: &str = "https://management.azure.com";

// ── AzureVerifier ─────────────────────────────────────────────────────────────

/// Resource existence checks against Azure Resource Manager.
///
/// Every [`ProviderVerifier::lookup`] issues a fresh `GET`; nothing but the
/// bearer token is cached.
pub struct AzureVerifier {
    default_subscription: Option<String>,
    client:     reqwest::Client,
    token:      TokenCache,
    management: String,
}

impl AzureVerifier {
    /// Token source, in order: service principal secret, hosted managed
    /// identity (`IDENTITY_ENDPOINT`), VM metadata service (`ARM_USE_MSI`),
    /// Azure CLI login.
    pub fn new(config: AzureVerifierConfig) -> Self {
        let source = TokenSource::select(&config);
        info!(auth = source.kind(), "ARM token source selected");
        Self::build(config.default_subscription, source, MANAGEMENT_BASE)
    }

    fn build(default_subscription: Option<String>, source: TokenSource, management: &str) -> Self {
        let client = reqwest::Client::new();
        Self {
            default_subscription,
            token: TokenCache::new(source, client.clone()),
            client,
            management: management.to_string(),
        }
    }

    #[cfg(test)]
    fn with_static_token(default_subscription: Option<&str>, token: &str, management: &str) -> Self {
        Self::build(
            default_subscription.map(String::from),
            TokenSource::Fixed(token.to_string()),
            management,
        )
    }

    /// An empty subscription defers to the configured default.
    fn resolve_subscription<'a>(&'a self, id: &'a ResourceIdentity) -> Result<&'a str, DriverError> {
        if !id.subscription.is_empty() {
            return Ok(&id.subscription);
        }
        self.default_subscription
            .as_deref()
            .ok_or(DriverError::SubscriptionUnresolved)
    }

    /// ARM URL for the identity, including `api-version`.
    fn resource_url(&self, id: &ResourceIdentity) -> Result<String, DriverError> {
        let sub = self.resolve_subscription(id)?;
        if id.name.is_empty() {
            return Err(DriverError::Provider(format!("{}: empty resource name", id.kind)));
        }
        if id.kind != ResourceKind::ResourceGroup && id.resource_group.is_empty() {
            return Err(DriverError::Provider(format!("{}: empty resource group", id)));
        }
        let group = format!("{}/subscriptions/{}/resourceGroups/{}", self.management, sub, id.resource_group);
        let url = match &id.kind {
            ResourceKind::ResourceGroup => format!(
                "{}/subscriptions/{}/resourcegroups/{}?api-version=2021-04-01",
                self.management, sub, id.name,
            ),
            ResourceKind::FrontDoor => format!(
                "{}/providers/Microsoft.Network/frontDoors/{}?api-version=2020-05-01",
                group, id.name,
            ),
            ResourceKind::FrontDoorFrontendEndpoint { front_door } => format!(
                "{}/providers/Microsoft.Network/frontDoors/{}/frontendEndpoints/{}?api-version=2020-05-01",
                group, front_door, id.name,
            ),
            ResourceKind::StorageAccount => format!(
                "{}/providers/Microsoft.Storage/storageAccounts/{}?api-version=2023-01-01",
                group, id.name,
            ),
            ResourceKind::KeyVault => format!(
                "{}/providers/Microsoft.KeyVault/vaults/{}?api-version=2023-07-01",
                group, id.name,
            ),
            ResourceKind::WebApp => format!(
                "{}/providers/Microsoft.Web/sites/{}?api-version=2022-09-01",
                group, id.name,
            ),
        };
        Ok(url)
    }

    // ── ARM error parsing ─────────────────────────────────────────────────────

    fn parse_arm_error(body: &Value) -> String {
        let err = body
            .get("error")
            .or_else(|| body.get("Error"))
            .unwrap_or(body);
        let code    = err["code"].as_str().unwrap_or("Unknown");
        let message = err["message"].as_str().unwrap_or("unknown error");
        format!("{}: {}", code, message)
    }

    async fn arm_get(&self, url: &str) -> Result<(u16, Value), DriverError> {
        let token = self.token.bearer().await?;
        debug!(url, auth = self.token.source().kind(), "Azure ARM GET");
        let resp = self
            .client
            .get(url)
            .bearer_auth(&token)
            .send()
            .await
            .map_err(|e| DriverError::Provider(format!("GET {}: {}", url, e)))?;

        let status = resp.status().as_u16();
        let body: Value = resp.json().await.unwrap_or(Value::Null);
        Ok((status, body))
    }
}

#[async_trait]
impl ProviderVerifier for AzureVerifier {
    fn name(&self) -> &'static str {
        "azure"
    }

    async fn lookup(&self, id: &ResourceIdentity) -> Result<Option<Value>, DriverError> {
        let url = self.resource_url(id)?;
        let (status, body) = self.arm_get(&url).await?;
        match status {
            200 => Ok(Some(body)),
            404 => {
                debug!(resource = %id, "resource not found");
                Ok(None)
            }
            _ => Err(DriverError::Provider(format!(
                "GET {}: status {}: {}",
                id,
                status,
                Self::parse_arm_error(&body)
            ))),
        }
    }
}
