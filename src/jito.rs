//! Bundle relay client (Jito-style JSON-RPC `sendBundle`)
//!
//! Signed transactions are serialized to wire format, base58-encoded and
//! submitted as one atomic bundle. HTTP 429 is surfaced as
//! [`SwapError::RateLimited`] so the engine can degrade to the
//! single-transaction path; any other non-success response is terminal.

use std::time::Duration;

use solana_sdk::transaction::VersionedTransaction;
use tracing::{info, warn};

use crate::config::JitoConfig;
use crate::error::{truncate_detail, SwapError};

pub struct BundleRelayClient {
    client: reqwest::Client,
    config: JitoConfig,
}

impl BundleRelayClient {
    pub fn new(config: JitoConfig) -> Self {
        let client = reqwest::Client::builder()
            .user_agent(concat!("tradesvc/", env!("CARGO_PKG_VERSION")))
            .build()
            .unwrap_or_default();
        Self { client, config }
    }

    /// How many transactions one bundle carries
    pub fn bundle_size(&self) -> usize {
        self.config.bundle_size.max(1)
    }

    /// Submit signed transactions as one atomic bundle. Returns on relay
    /// acknowledgment; bundle confirmation is asynchronous and not awaited.
    pub async fn send_bundle(
        &self,
        transactions: &[VersionedTransaction],
    ) -> Result<(), SwapError> {
        if transactions.is_empty() {
            return Err(SwapError::Unknown("empty bundle".into()));
        }

        let mut encoded = Vec::with_capacity(transactions.len());
        for tx in transactions {
            let wire = bincode::serialize(tx)
                .map_err(|e| SwapError::Unknown(format!("bundle serialization: {e}")))?;
            encoded.push(bs58::encode(wire).into_string());
        }

        let body = serde_json::json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": "sendBundle",
            "params": [encoded],
        });

        let resp = self
            .client
            .post(&self.config.relay_url)
            .json(&body)
            .timeout(Duration::from_secs(self.config.timeout_secs))
            .send()
            .await
            .map_err(|e| SwapError::Transport(truncate_detail(&e.to_string())))?;

        let status = resp.status();
        if status.as_u16() == 429 {
            let text = resp.text().await.unwrap_or_default();
            warn!("bundle relay rate-limited");
            return Err(SwapError::RateLimited(truncate_detail(&text)));
        }
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(SwapError::SubmitFailed {
                detail: format!("relay {} {}", status.as_u16(), truncate_detail(&text)),
                transient: false,
            });
        }

        info!(transactions = transactions.len(), "bundle accepted by relay");
        Ok(())
    }
}
