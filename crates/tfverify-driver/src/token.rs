//! Bearer tokens for the read-only ARM checks.

use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use serde_json::Value;
use tokio::process::Command;
use tokio::sync::Mutex;
use tracing::debug;

use crate::azure::AzureVerifierConfig;
use crate::error::DriverError;

const ARM_RESOURCE: &str = "https://management.azure.com/";
const ARM_SCOPE: &str = "https://management.azure.com/.default";
const LOGIN_BASE: &str = "https://login.microsoftonline.com";
const IMDS_ENDPOINT: &str = "http://169.254.169.254/metadata/identity/oauth2/token";

/// Refresh this long before the issuer's expiry.
const EXPIRY_SKEW: Duration = Duration::from_secs(60);
/// Used when the issuer does not say how long a token lives.
const DEFAULT_LIFETIME: Duration = Duration::from_secs(300);

/// Where ARM tokens come from, picked once per verifier.
pub(crate) enum TokenSource {
    ServicePrincipal {
        login_base: String,
        tenant_id: String,
        client_id: String,
        client_secret: String,
    },
    /// Identity endpoint injected by App Service, Functions and Container Apps
    /// (`IDENTITY_ENDPOINT` + `IDENTITY_HEADER`).
    HostedIdentity {
        endpoint: String,
        secret: String,
        client_id: Option<String>,
    },
    /// VM instance metadata service, opted into with `ARM_USE_MSI`.
    InstanceMetadata {
        endpoint: String,
        client_id: Option<String>,
    },
    AzureCli {
        tenant_id: Option<String>,
    },
    #[cfg(test)]
    Fixed(String),
}

struct IssuedToken {
    value: String,
    lifetime: Duration,
}

impl TokenSource {
    /// Same precedence as the azurerm provider: client secret, then managed
    /// identity, then the logged-in Azure CLI.
    pub(crate) fn select(config: &AzureVerifierConfig) -> Self {
        if let (Some(tenant_id), Some(client_id), Some(client_secret)) =
            (&config.tenant_id, &config.client_id, &config.client_secret)
        {
            return TokenSource::ServicePrincipal {
                login_base: LOGIN_BASE.into(),
                tenant_id: tenant_id.clone(),
                client_id: client_id.clone(),
                client_secret: client_secret.clone(),
            };
        }
        if let (Some(endpoint), Some(secret)) = (&config.identity_endpoint, &config.identity_header) {
            return TokenSource::HostedIdentity {
                endpoint: endpoint.clone(),
                secret: secret.clone(),
                client_id: config.client_id.clone(),
            };
        }
        if config.use_msi {
            return TokenSource::InstanceMetadata {
                endpoint: IMDS_ENDPOINT.into(),
                client_id: config.client_id.clone(),
            };
        }
        TokenSource::AzureCli { tenant_id: config.tenant_id.clone() }
    }

    pub(crate) fn kind(&self) -> &'static str {
        match self {
            TokenSource::ServicePrincipal { .. } => "service_principal",
            TokenSource::HostedIdentity { .. } => "managed_identity",
            TokenSource::InstanceMetadata { .. } => "instance_metadata",
            TokenSource::AzureCli { .. } => "azure_cli",
            #[cfg(test)]
            TokenSource::Fixed(_) => "fixed",
        }
    }

    async fn fetch(&self, client: &reqwest::Client) -> Result<IssuedToken, DriverError> {
        match self {
            TokenSource::ServicePrincipal { login_base, tenant_id, client_id, client_secret } => {
                let url = format!("{}/{}/oauth2/v2.0/token", login_base, tenant_id);
                let form = [
                    ("grant_type", "client_credentials"),
                    ("client_id", client_id.as_str()),
                    ("client_secret", client_secret.as_str()),
                    ("scope", ARM_SCOPE),
                ];
                let resp = send_json(client.post(&url).form(&form), self.kind()).await?;
                issued(&resp, "access_token", self.kind())
            }
            TokenSource::HostedIdentity { endpoint, secret, client_id } => {
                let mut req = client
                    .get(endpoint)
                    .header("X-IDENTITY-HEADER", secret)
                    .query(&[("api-version", "2019-08-01"), ("resource", ARM_RESOURCE)]);
                if let Some(id) = client_id {
                    req = req.query(&[("client_id", id.as_str())]);
                }
                let resp = send_json(req, self.kind()).await?;
                issued(&resp, "access_token", self.kind())
            }
            TokenSource::InstanceMetadata { endpoint, client_id } => {
                let mut req = client
                    .get(endpoint)
                    .header("Metadata", "true")
                    .query(&[("api-version", "2018-02-01"), ("resource", ARM_RESOURCE)]);
                if let Some(id) = client_id {
                    req = req.query(&[("client_id", id.as_str())]);
                }
                let resp = send_json(req, self.kind()).await?;
                issued(&resp, "access_token", self.kind())
            }
            TokenSource::AzureCli { tenant_id } => {
                let mut cmd = Command::new("az");
                cmd.args(["account", "get-access-token", "--resource", ARM_RESOURCE, "--output", "json"]);
                if let Some(tenant) = tenant_id {
                    cmd.args(["--tenant", tenant.as_str()]);
                }
                let output = cmd.output().await.map_err(|e| {
                    DriverError::Provider(format!(
                        "az CLI not found: {}. Install it or set ARM_CLIENT_ID/ARM_CLIENT_SECRET",
                        e
                    ))
                })?;
                if !output.status.success() {
                    return Err(DriverError::Provider(format!(
                        "az account get-access-token failed: {}. Run 'az login' first",
                        String::from_utf8_lossy(&output.stderr).trim()
                    )));
                }
                let resp: Value = serde_json::from_slice(&output.stdout)
                    .map_err(|e| DriverError::Provider(format!("az CLI output: {}", e)))?;
                issued(&resp, "accessToken", self.kind())
            }
            #[cfg(test)]
            TokenSource::Fixed(token) => Ok(IssuedToken {
                value: token.clone(),
                lifetime: Duration::from_secs(3600),
            }),
        }
    }
}

async fn send_json(req: reqwest::RequestBuilder, source: &str) -> Result<Value, DriverError> {
    let resp = req
        .send()
        .await
        .map_err(|e| DriverError::Provider(format!("{} token request: {}", source, e)))?;
    let status = resp.status();
    let body: Value = resp.json().await.unwrap_or(Value::Null);
    if !status.is_success() {
        return Err(DriverError::Provider(format!(
            "{} token request: status {}: {}",
            source, status.as_u16(), body
        )));
    }
    Ok(body)
}

fn issued(resp: &Value, field: &str, source: &str) -> Result<IssuedToken, DriverError> {
    let value = resp[field]
        .as_str()
        .ok_or_else(|| DriverError::Provider(format!("{} token: no {} in response", source, field)))?
        .to_string();
    Ok(IssuedToken { value, lifetime: lifetime(resp) })
}

/// `expires_in` (seconds), else `expires_on` (unix time). Issuers send
/// either as a number or as a numeric string.
fn lifetime(resp: &Value) -> Duration {
    let number = |v: &Value| v.as_u64().or_else(|| v.as_str()?.parse().ok());
    if let Some(secs) = number(&resp["expires_in"]) {
        return Duration::from_secs(secs);
    }
    if let Some(at) = number(&resp["expires_on"]) {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        return Duration::from_secs(at.saturating_sub(now));
    }
    DEFAULT_LIFETIME
}

// ── Cache ─────────────────────────────────────────────────────────────────────

/// Hands out a token from `source`, reusing it until shortly before expiry.
/// Only the token is cached, never a lookup result.
pub(crate) struct TokenCache {
    source: TokenSource,
    client: reqwest::Client,
    cached: Mutex<Option<(String, Instant)>>,
}

impl TokenCache {
    pub(crate) fn new(source: TokenSource, client: reqwest::Client) -> Self {
        Self { source, client, cached: Mutex::new(None) }
    }

    pub(crate) fn source(&self) -> &TokenSource {
        &self.source
    }

    pub(crate) async fn bearer(&self) -> Result<String, DriverError> {
        // Held across the fetch so concurrent callers share one request.
        let mut cached = self.cached.lock().await;
        if let Some((token, until)) = cached.as_ref() {
            if Instant::now() < *until {
                return Ok(token.clone());
            }
        }
        debug!(source = self.source.kind(), "requesting ARM token");
        let issued = self.source.fetch(&self.client).await?;
        let until = Instant::now() + issued.lifetime.saturating_sub(EXPIRY_SKEW);
        *cached = Some((issued.value.clone(), until));
        Ok(issued.value)
    }
}
