use std::time::Duration;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use shared::Intent;

/// Demo-grade defaults applied when the service omits a field and used
/// wholesale for fallback intents.
pub const DEFAULT_ACTION: &str = "BRIDGE ASSETS";
pub const DEFAULT_SOURCE_CHAIN: &str = "SEPOLIA";
pub const DEFAULT_TARGET_CHAIN: &str = "SUI NET";
pub const DEFAULT_TOKEN: &str = "USDC";
pub const DEFAULT_AMOUNT: f64 = 100.0;

/// Account context forwarded with the command text.
#[derive(Debug, Clone, Default)]
pub struct UserContext {
    pub address: Option<String>,
}

#[derive(Serialize)]
struct DispatchRequest<'a> {
    message: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    address: Option<&'a str>,
}

/// Untrusted wire shape. Parsed and defaulted exactly once, here at the
/// boundary; nothing downstream ever sees an unvalidated blob. The service
/// has shipped both flat payloads and payloads wrapped under `intent`/`data`.
#[derive(Debug, Default, Deserialize)]
struct IntentWire {
    #[serde(default)]
    action: Option<String>,
    #[serde(default)]
    source_chain: Option<String>,
    #[serde(default)]
    target_chain: Option<String>,
    #[serde(default)]
    amount: Option<serde_json::Value>,
    #[serde(default)]
    token_in: Option<String>,
    #[serde(default)]
    token_out: Option<String>,
    #[serde(default)]
    recipient: Option<String>,
    #[serde(default)]
    original_text: Option<String>,
    #[serde(default)]
    intent: Option<Box<IntentWire>>,
    #[serde(default)]
    data: Option<Box<IntentWire>>,
}

impl IntentWire {
    fn unwrap_envelope(self) -> IntentWire {
        if let Some(inner) = self.intent {
            *inner
        } else if let Some(inner) = self.data {
            *inner
        } else {
            self
        }
    }
}

/// Submits a finalized command to the remote intent service. Never errors
/// past its boundary: every failure resolves into a fallback intent.
pub struct IntentDispatcher {
    client: reqwest::Client,
    endpoint: String,
}

impl IntentDispatcher {
    pub fn new(endpoint: String, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| anyhow::anyhow!("Failed to create HTTP client: {}", e))?;
        Ok(Self { client, endpoint })
    }

    pub async fn dispatch(&self, command_text: &str, ctx: &UserContext) -> Intent {
        match self.try_dispatch(command_text, ctx).await {
            Ok(intent) => {
                debug!("Intent service answered for '{}'", command_text);
                intent
            }
            Err(e) => {
                warn!("Intent service unreachable, using fallback: {}", e);
                fallback_intent(command_text)
            }
        }
    }

    async fn try_dispatch(&self, command_text: &str, ctx: &UserContext) -> Result<Intent> {
        let request = DispatchRequest {
            message: command_text,
            address: ctx.address.as_deref(),
        };
        let response = self
            .client
            .post(&self.endpoint)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            anyhow::bail!("intent service returned {}", status);
        }

        let wire: IntentWire = response.json().await?;
        Ok(intent_from_wire(wire, command_text))
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

fn coerce_amount(value: serde_json::Value) -> Option<f64> {
    match value {
        serde_json::Value::Number(n) => n.as_f64(),
        serde_json::Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn intent_from_wire(wire: IntentWire, original: &str) -> Intent {
    let wire = wire.unwrap_envelope();
    Intent {
        action: non_empty(wire.action).unwrap_or_else(|| DEFAULT_ACTION.to_string()),
        source_chain: non_empty(wire.source_chain)
            .unwrap_or_else(|| DEFAULT_SOURCE_CHAIN.to_string()),
        target_chain: non_empty(wire.target_chain)
            .unwrap_or_else(|| DEFAULT_TARGET_CHAIN.to_string()),
        amount: wire
            .amount
            .and_then(coerce_amount)
            .unwrap_or(DEFAULT_AMOUNT),
        token_in: non_empty(wire.token_in).unwrap_or_else(|| DEFAULT_TOKEN.to_string()),
        token_out: non_empty(wire.token_out),
        recipient: non_empty(wire.recipient),
        recipient_address: None,
        original_text: non_empty(wire.original_text).unwrap_or_else(|| original.to_string()),
        fallback: false,
    }
}

/// Locally fabricated intent for the degraded path: first numeric token as
/// the amount, demo defaults for everything else, visibly flagged.
pub fn fallback_intent(command_text: &str) -> Intent {
    Intent {
        action: DEFAULT_ACTION.to_string(),
        source_chain: DEFAULT_SOURCE_CHAIN.to_string(),
        target_chain: DEFAULT_TARGET_CHAIN.to_string(),
        amount: first_number(command_text).unwrap_or(DEFAULT_AMOUNT),
        token_in: DEFAULT_TOKEN.to_string(),
        token_out: None,
        recipient: None,
        recipient_address: None,
        original_text: command_text.to_string(),
        fallback: true,
    }
}

fn first_number(text: &str) -> Option<f64> {
    let re = regex::Regex::new(r"\d+(?:\.\d+)?").unwrap();
    re.find(text).and_then(|m| m.as_str().parse().ok())
}
