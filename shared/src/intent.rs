use serde::{Deserialize, Serialize};

/// A structured command interpretation, produced either by the remote intent
/// service or synthesized locally when the service is unreachable.
/// Immutable once constructed; at most one is emitted per spoken command.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Intent {
    pub action: String,
    pub source_chain: String,
    pub target_chain: String,
    pub amount: f64,
    pub token_in: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_out: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recipient: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recipient_address: Option<String>,
    pub original_text: String,
    /// True when the intent was fabricated locally because the intent
    /// service could not be reached. Downstream consumers must be able to
    /// tell a degraded-mode intent from a service-confirmed one.
    #[serde(default)]
    pub fallback: bool,
}

impl Intent {
    /// Short spoken-friendly description, e.g. for audio acknowledgements.
    pub fn summary(&self) -> String {
        let mut s = format!(
            "{} {} {} from {} to {}",
            self.action.to_lowercase(),
            self.amount,
            self.token_in,
            self.source_chain,
            self.target_chain
        );
        if let Some(ref recipient) = self.recipient {
            s.push_str(&format!(" for {}", recipient));
        }
        s
    }
}

impl std::fmt::Display for Intent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.summary())?;
        if self.fallback {
            write!(f, " (fallback)")?;
        }
        Ok(())
    }
}
