//! Contract ABI lookups against the Etherscan v2 API.
//!
//! Etherscan answers `status = "1"` with the JSON-encoded ABI as a string in
//! `result`. Any other status carries a human-readable reason in `result`
//! ("Contract source code not verified", "Max rate limit reached", ...).

use alloy::primitives::Address;
use eyre::{Context, Result};
use serde::Deserialize;
use std::time::Duration;

const ETHERSCAN_API_URL: &str = "https://api.etherscan.io/v2/api";

/// Outcome of a single registry lookup.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AbiLookup {
    /// Raw JSON ABI text.
    Found(String),
    /// The registry refused the call because of its own rate limit.
    Throttled,
    /// The registry has no ABI for the address.
    Unavailable(String),
}

/// Address-keyed source of raw contract ABIs.
#[allow(async_fn_in_trait)]
pub trait AbiSource {
    /// Fetch the raw ABI for `address`.
    ///
    /// # Errors
    /// Returns error on transport failures; registry-level refusals are
    /// reported through [`AbiLookup`].
    async fn fetch_abi(&self, address: Address) -> Result<AbiLookup>;
}

/// Etherscan API response envelope.
#[derive(Debug, Deserialize)]
struct EtherscanResponse {
    status: Option<String>,
    #[allow(dead_code)]
    message: Option<String>,
    result: Option<serde_json::Value>,
}

/// HTTP client for `module=contract&action=getabi`.
pub struct EtherscanClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    chain_id: u64,
}

impl EtherscanClient {
    /// Creates a client with a per-request timeout.
    ///
    /// # Errors
    /// Returns error if the HTTP client cannot be built.
    pub fn new(api_key: impl Into<String>, chain_id: u64, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .wrap_err("failed to build etherscan HTTP client")?;

        Ok(Self {
            client,
            base_url: ETHERSCAN_API_URL.to_string(),
            api_key: api_key.into(),
            chain_id,
        })
    }

    /// Overrides the API endpoint (self-hosted explorers, test servers).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

impl AbiSource for EtherscanClient {
    #[tracing::instrument(skip(self), fields(address = %address))]
    async fn fetch_abi(&self, address: Address) -> Result<AbiLookup> {
        let address_param = format!("{address:#x}");
        let chain_id = self.chain_id.to_string();

        let response: EtherscanResponse = self
            .client
            .get(&self.base_url)
            .query(&[
                ("chainid", chain_id.as_str()),
                ("module", "contract"),
                ("action", "getabi"),
                ("address", address_param.as_str()),
                ("apikey", self.api_key.as_str()),
            ])
            .send()
            .await
            .wrap_err_with(|| format!("failed to request ABI for {}", address_param))?
            .error_for_status()
            .wrap_err("etherscan returned an HTTP error status")?
            .json()
            .await
            .wrap_err("failed to decode etherscan response")?;

        Ok(interpret_response(response))
    }
}

fn interpret_response(response: EtherscanResponse) -> AbiLookup {
    let result = match response.result {
        Some(serde_json::Value::String(text)) => text,
        Some(other) => other.to_string(),
        None => String::new(),
    };

    if response.status.as_deref() == Some("1") && !result.is_empty() {
        return AbiLookup::Found(result);
    }

    if result.to_ascii_lowercase().contains("rate limit") {
        AbiLookup::Throttled
    } else {
        AbiLookup::Unavailable(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response(json: &str) -> EtherscanResponse {
        serde_json::from_str(json).expect("fixture should deserialize")
    }

    #[test]
    fn ok_status_yields_abi_text() {
        let lookup = interpret_response(response(
            r#"{"status":"1","message":"OK","result":"[{\"type\":\"function\"}]"}"#,
        ));
        assert_eq!(lookup, AbiLookup::Found(r#"[{"type":"function"}]"#.to_string()));
    }

    #[test]
    fn unverified_contract_is_unavailable() {
        let lookup = interpret_response(response(
            r#"{"status":"0","message":"NOTOK","result":"Contract source code not verified"}"#,
        ));
        assert_eq!(
            lookup,
            AbiLookup::Unavailable("Contract source code not verified".to_string())
        );
    }

    #[test]
    fn rate_limit_message_is_throttled() {
        let lookup = interpret_response(response(
            r#"{"status":"0","message":"NOTOK","result":"Max rate limit reached"}"#,
        ));
        assert_eq!(lookup, AbiLookup::Throttled);
    }

    #[test]
    fn missing_result_is_unavailable() {
        let lookup = interpret_response(response(r#"{"status":"1"}"#));
        assert_eq!(lookup, AbiLookup::Unavailable(String::new()));
    }
}
