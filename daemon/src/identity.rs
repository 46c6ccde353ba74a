use std::time::Duration;

use anyhow::Result;
use serde::Deserialize;
use tracing::{debug, warn};

use shared::Intent;

/// Resolved profile for a `<name>.eth` handle.
#[derive(Debug, Clone, PartialEq)]
pub struct IdentityProfile {
    pub name: String,
    pub address: String,
    pub avatar: Option<String>,
}

/// Find the first `<name>.eth`-shaped token in a command text.
pub fn find_eth_handle(text: &str) -> Option<String> {
    let re = regex::Regex::new(r"\b[a-z0-9][a-z0-9-]*\.eth\b").unwrap();
    re.find(&text.to_lowercase()).map(|m| m.as_str().to_string())
}

/// HTTP client for an ENS-style resolver. Resolution failures of any kind
/// produce `None`; enrichment is strictly best-effort.
pub struct IdentityResolver {
    client: reqwest::Client,
    resolver_url: String,
    enabled: bool,
}

#[derive(Deserialize)]
struct ProfileWire {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    address: Option<String>,
    #[serde(default)]
    avatar: Option<String>,
}

impl IdentityResolver {
    pub fn new(resolver_url: String, timeout: Duration, enabled: bool) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| anyhow::anyhow!("Failed to create HTTP client: {}", e))?;
        Ok(Self {
            client,
            resolver_url,
            enabled,
        })
    }

    pub async fn resolve(&self, handle: &str) -> Option<IdentityProfile> {
        if !handle.to_lowercase().ends_with(".eth") {
            return None;
        }
        match self.try_resolve(handle).await {
            Ok(profile) => profile,
            Err(e) => {
                warn!("Identity resolution failed for '{}': {}", handle, e);
                None
            }
        }
    }

    async fn try_resolve(&self, handle: &str) -> Result<Option<IdentityProfile>> {
        let url = format!("{}/{}", self.resolver_url.trim_end_matches('/'), handle);
        let response = self.client.get(&url).send().await?;
        if !response.status().is_success() {
            anyhow::bail!("resolver returned {}", response.status());
        }
        let wire: ProfileWire = response.json().await?;
        match wire.address.filter(|a| !a.trim().is_empty()) {
            Some(address) => Ok(Some(IdentityProfile {
                name: wire.name.unwrap_or_else(|| handle.to_string()),
                address,
                avatar: wire.avatar,
            })),
            None => Ok(None),
        }
    }

    /// Fill the intent's recipient fields from a handle mentioned either by
    /// the service or inside the raw command text. Leaves the intent
    /// untouched when nothing resolves.
    pub async fn enrich(&self, intent: &mut Intent) {
        if !self.enabled {
            return;
        }
        let handle = intent
            .recipient
            .clone()
            .filter(|r| r.to_lowercase().ends_with(".eth"))
            .or_else(|| find_eth_handle(&intent.original_text));
        let Some(handle) = handle else {
            return;
        };
        if let Some(profile) = self.resolve(&handle).await {
            debug!("Resolved '{}' to {}", profile.name, profile.address);
            intent.recipient = Some(profile.name);
            intent.recipient_address = Some(profile.address);
        }
    }
}
