//! Blockchain RPC access behind a trait seam
//!
//! The engine and preflight validator talk to [`ChainClient`] so tests can
//! substitute a mock chain. [`RpcChainClient`] is the production
//! implementation over the nonblocking Solana RPC client.

use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use solana_account_decoder::UiAccountData;
use solana_client::nonblocking::rpc_client::RpcClient;
use solana_client::rpc_config::RpcSendTransactionConfig;
use solana_client::rpc_request::TokenAccountsFilter;
use solana_sdk::{
    commitment_config::CommitmentConfig, pubkey::Pubkey, signature::Signature,
    transaction::VersionedTransaction,
};
use tracing::warn;

use crate::config::RpcConfig;
use crate::error::{truncate_detail, SwapError};

/// Result of a best-effort simulation
#[derive(Debug, Clone, Default)]
pub struct SimulationOutcome {
    /// On-chain error reported by the simulator, if any
    pub err: Option<String>,
    /// Program log tail
    pub logs: Vec<String>,
}

impl SimulationOutcome {
    pub fn failed(&self) -> bool {
        self.err.is_some()
    }
}

/// Read and write operations the pipeline needs from the chain
#[async_trait]
pub trait ChainClient: Send + Sync {
    /// Native balance of `owner` in lamports
    async fn balance_lamports(&self, owner: &Pubkey) -> Result<u64, SwapError>;

    /// Sum of raw token units across all of `owner`'s accounts for `mint`
    async fn token_balance_raw(&self, owner: &Pubkey, mint: &Pubkey) -> Result<u64, SwapError>;

    /// Rent-exempt minimum for an account of `data_len` bytes
    async fn rent_exempt_minimum(&self, data_len: usize) -> Result<u64, SwapError>;

    /// Whether an account exists at `address`
    async fn account_exists(&self, address: &Pubkey) -> Result<bool, SwapError>;

    /// Simulate a signed transaction without submitting it
    async fn simulate_transaction(
        &self,
        tx: &VersionedTransaction,
    ) -> Result<SimulationOutcome, SwapError>;

    /// Submit a signed transaction and return its signature on acknowledgment
    async fn send_transaction(&self, tx: &VersionedTransaction) -> Result<Signature, SwapError>;

    /// Wait until the network reports the signature at the configured
    /// commitment, or the transaction errored on chain
    async fn confirm_transaction(&self, signature: &Signature) -> Result<(), SwapError>;
}

/// Production chain client over a single RPC endpoint
pub struct RpcChainClient {
    rpc: RpcClient,
    commitment: CommitmentConfig,
}

impl RpcChainClient {
    pub fn new(config: &RpcConfig) -> Self {
        let commitment = CommitmentConfig::from_str(&config.commitment).unwrap_or_else(|_| {
            warn!(
                commitment = %config.commitment,
                "unknown commitment level, falling back to confirmed"
            );
            CommitmentConfig::confirmed()
        });
        let rpc = RpcClient::new_with_timeout_and_commitment(
            config.url.clone(),
            Duration::from_secs(config.timeout_secs),
            commitment,
        );
        Self { rpc, commitment }
    }

    fn map_err(err: solana_client::client_error::ClientError) -> SwapError {
        let text = err.to_string();
        let lowered = text.to_lowercase();
        if lowered.contains("connection")
            || lowered.contains("timeout")
            || lowered.contains("timed out")
            || lowered.contains("network")
        {
            SwapError::Transport(truncate_detail(&text))
        } else {
            SwapError::Unknown(truncate_detail(&text))
        }
    }
}

#[async_trait]
impl ChainClient for RpcChainClient {
    async fn balance_lamports(&self, owner: &Pubkey) -> Result<u64, SwapError> {
        self.rpc.get_balance(owner).await.map_err(Self::map_err)
    }

    async fn token_balance_raw(&self, owner: &Pubkey, mint: &Pubkey) -> Result<u64, SwapError> {
        let accounts = self
            .rpc
            .get_token_accounts_by_owner(owner, TokenAccountsFilter::Mint(*mint))
            .await
            .map_err(Self::map_err)?;

        let mut total: u64 = 0;
        for keyed in accounts {
            if let UiAccountData::Json(parsed) = keyed.account.data {
                let amount = parsed
                    .parsed
                    .get("info")
                    .and_then(|i| i.get("tokenAmount"))
                    .and_then(|t| t.get("amount"))
                    .and_then(|a| a.as_str())
                    .and_then(|a| a.parse::<u64>().ok())
                    .unwrap_or(0);
                total = total.saturating_add(amount);
            }
        }
        Ok(total)
    }

    async fn rent_exempt_minimum(&self, data_len: usize) -> Result<u64, SwapError> {
        self.rpc
            .get_minimum_balance_for_rent_exemption(data_len)
            .await
            .map_err(Self::map_err)
    }

    async fn account_exists(&self, address: &Pubkey) -> Result<bool, SwapError> {
        let response = self
            .rpc
            .get_account_with_commitment(address, self.commitment)
            .await
            .map_err(Self::map_err)?;
        Ok(response.value.is_some())
    }

    async fn simulate_transaction(
        &self,
        tx: &VersionedTransaction,
    ) -> Result<SimulationOutcome, SwapError> {
        let result = self
            .rpc
            .simulate_transaction(tx)
            .await
            .map_err(Self::map_err)?;
        Ok(SimulationOutcome {
            err: result.value.err.map(|e| e.to_string()),
            logs: result.value.logs.unwrap_or_default(),
        })
    }

    async fn send_transaction(&self, tx: &VersionedTransaction) -> Result<Signature, SwapError> {
        // Preflight already happened locally; skip the RPC-side preflight so
        // submission is not double-simulated
        let config = RpcSendTransactionConfig {
            skip_preflight: true,
            preflight_commitment: Some(self.commitment.commitment),
            ..RpcSendTransactionConfig::default()
        };
        self.rpc
            .send_transaction_with_config(tx, config)
            .await
            .map_err(|e| {
                let mapped = Self::map_err(e);
                match mapped {
                    SwapError::Transport(detail) => SwapError::SubmitFailed {
                        detail,
                        transient: true,
                    },
                    SwapError::Unknown(detail) => SwapError::SubmitFailed {
                        detail,
                        transient: false,
                    },
                    other => other,
                }
            })
    }

    async fn confirm_transaction(&self, signature: &Signature) -> Result<(), SwapError> {
        // Poll signature status until it reaches the configured commitment.
        // 60 * 500ms keeps us under the blockhash expiry window.
        for _ in 0..60 {
            let statuses = self
                .rpc
                .get_signature_statuses(&[*signature])
                .await
                .map_err(Self::map_err)?;
            if let Some(Some(status)) = statuses.value.first() {
                if let Some(err) = &status.err {
                    return Err(SwapError::SubmitFailed {
                        detail: truncate_detail(&format!("transaction failed on chain: {err}")),
                        transient: false,
                    });
                }
                if status.satisfies_commitment(self.commitment) {
                    return Ok(());
                }
            }
            tokio::time::sleep(Duration::from_millis(500)).await;
        }
        Err(SwapError::SubmitFailed {
            detail: format!("confirmation timed out for {signature}"),
            transient: false,
        })
    }
}
