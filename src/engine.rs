//! Swap engine: orchestration of the full submission pipeline
//!
//! Single path: preflight → fee translation → retry{ quote → build → sign →
//! simulate → submit } → confirm, with the trade record created at entry and
//! driven to a terminal status on every return path.
//!
//! Bundle path: N builds for the same intent (fee only on the first), signed
//! sequentially and handed to the relay as one atomic bundle; a rate-limited
//! relay degrades transparently to the single path.

use std::sync::Arc;
use std::time::Duration;

use base64::Engine as _;
use solana_sdk::{
    signature::{Keypair, Signature, Signer},
    transaction::VersionedTransaction,
};
use tracing::{info, warn};

use crate::chain::{ChainClient, RpcChainClient, SimulationOutcome};
use crate::config::{Config, PipelineConfig, RecordBackend, RetryConfig};
use crate::error::{truncate_detail, SwapError};
use crate::fee::{FeeConfig, FeeTranslator};
use crate::jito::BundleRelayClient;
use crate::preflight;
use crate::providers::{BuildParams, ProviderClient, QuoteParams};
use crate::records::{
    MemoryRecordStore, NewTradeRecord, SledRecordStore, TradeRecordStore, TradeStatus,
};
use crate::types::{SwapOutcome, SwapRequest};
use crate::wallet;

/// Exponential backoff for transient failures: doubles from the base delay,
/// clamped to the ceiling
#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    base_delay_ms: u64,
    max_delay_ms: u64,
}

impl ExponentialBackoff {
    pub fn new(base_delay_ms: u64, max_delay_ms: u64) -> Self {
        Self {
            base_delay_ms,
            max_delay_ms,
        }
    }

    pub fn delay(&self, attempt: u32) -> Duration {
        let exp = self
            .base_delay_ms
            .saturating_mul(2u64.saturating_pow(attempt));
        Duration::from_millis(exp.min(self.max_delay_ms))
    }
}

impl From<&RetryConfig> for ExponentialBackoff {
    fn from(config: &RetryConfig) -> Self {
        Self::new(config.base_delay_ms, config.max_delay_ms)
    }
}

/// Orchestrates quote, build, sign, simulate, submit and confirm for one
/// swap request at a time; safe to share across concurrent requests.
pub struct SwapEngine {
    providers: ProviderClient,
    chain: Arc<dyn ChainClient>,
    records: Arc<dyn TradeRecordStore>,
    relay: BundleRelayClient,
    fees: FeeTranslator,
    pipeline: PipelineConfig,
    retry: RetryConfig,
}

impl SwapEngine {
    pub fn new(
        providers: ProviderClient,
        chain: Arc<dyn ChainClient>,
        records: Arc<dyn TradeRecordStore>,
        relay: BundleRelayClient,
        fees: FeeTranslator,
        pipeline: PipelineConfig,
        retry: RetryConfig,
    ) -> Self {
        Self {
            providers,
            chain,
            records,
            relay,
            fees,
            pipeline,
            retry,
        }
    }

    /// Wire up production collaborators from configuration
    pub fn from_config(config: &Config) -> Result<Self, SwapError> {
        let records: Arc<dyn TradeRecordStore> = match config.records.backend {
            RecordBackend::Memory => Arc::new(MemoryRecordStore::new()),
            RecordBackend::Sled => Arc::new(SledRecordStore::open(&config.records.sled_path)?),
        };
        Ok(Self::new(
            ProviderClient::new(config.providers.clone()),
            Arc::new(RpcChainClient::new(&config.rpc)),
            records,
            BundleRelayClient::new(config.jito.clone()),
            FeeTranslator::new(config.fees.clone()),
            config.pipeline.clone(),
            config.retry.clone(),
        ))
    }

    /// Install a new fee tier/scale snapshot
    pub fn reconfigure_fees(&self, config: FeeConfig) {
        self.fees.reconfigure(config);
    }

    pub fn record_store(&self) -> Arc<dyn TradeRecordStore> {
        Arc::clone(&self.records)
    }

    /// Execute one swap end to end on the single-transaction path
    pub async fn execute_swap(&self, request: SwapRequest) -> Result<SwapOutcome, SwapError> {
        request.validate()?;
        let keypair = wallet::keypair_from_str(&request.private_key)?;
        let record = self.open_record(&keypair, &request).await?;

        if let Err(e) = self.run_preflight(&keypair, &request).await {
            self.fail_record(&record.id, &e).await;
            return Err(e);
        }

        self.run_single_path(&request, &keypair, &record.id, false)
            .await
    }

    /// Execute one swap as an atomic bundle, degrading to the single path
    /// when the relay is rate-limited
    pub async fn execute_bundle_swap(
        &self,
        request: SwapRequest,
    ) -> Result<SwapOutcome, SwapError> {
        request.validate()?;
        let keypair = wallet::keypair_from_str(&request.private_key)?;
        let record = self.open_record(&keypair, &request).await?;

        if let Err(e) = self.run_preflight(&keypair, &request).await {
            self.fail_record(&record.id, &e).await;
            return Err(e);
        }

        let cu_price = match self.fees.compute_unit_price(&request.priority_fee) {
            Ok(price) => price,
            Err(e) => {
                self.fail_record(&record.id, &e).await;
                return Err(e);
            }
        };

        match self.build_and_send_bundle(&request, &keypair, cu_price).await {
            Ok(()) => {
                // Bundle confirmation is asynchronous; the record keeps its
                // submitted status with a placeholder signature marker
                self.update_record(
                    &record.id,
                    TradeStatus::Submitted,
                    Some("bundle".to_string()),
                    None,
                )
                .await;
                Ok(SwapOutcome {
                    record_id: record.id,
                    status: TradeStatus::Submitted,
                    signature: Some("bundle".to_string()),
                    fallback: false,
                })
            }
            Err(SwapError::RateLimited(detail)) => {
                info!(detail = %detail, "relay rate-limited, falling back to single path");
                let mut outcome = self
                    .run_single_path(&request, &keypair, &record.id, true)
                    .await?;
                outcome.fallback = true;
                Ok(outcome)
            }
            Err(e) => {
                self.fail_record(&record.id, &e).await;
                Err(e)
            }
        }
    }

    async fn open_record(
        &self,
        keypair: &Keypair,
        request: &SwapRequest,
    ) -> Result<crate::records::TradeRecord, SwapError> {
        self.records
            .create(NewTradeRecord {
                wallet: keypair.pubkey().to_string(),
                input_mint: request.input_mint.clone(),
                output_mint: request.output_mint.clone(),
                amount: request.amount,
            })
            .await
    }

    async fn run_preflight(
        &self,
        keypair: &Keypair,
        request: &SwapRequest,
    ) -> Result<(), SwapError> {
        preflight::validate_balances(
            self.chain.as_ref(),
            &self.pipeline,
            &keypair.pubkey(),
            request,
        )
        .await
    }

    /// Fee translation, the retried quote+build+submit cycle, then
    /// confirmation. Drives the record to a terminal status on every path.
    async fn run_single_path(
        &self,
        request: &SwapRequest,
        keypair: &Keypair,
        record_id: &str,
        is_fallback: bool,
    ) -> Result<SwapOutcome, SwapError> {
        let cu_price = match self.fees.compute_unit_price(&request.priority_fee) {
            Ok(price) => price,
            Err(e) => {
                self.fail_record(record_id, &e).await;
                return Err(e);
            }
        };

        let backoff = ExponentialBackoff::from(&self.retry);
        let mut attempt: u32 = 0;
        let signature = loop {
            match self
                .attempt_submit(request, keypair, cu_price, request.amount)
                .await
            {
                Ok(signature) => break signature,
                Err(e) if e.is_transient() && attempt + 1 < self.retry.max_attempts => {
                    let delay = backoff.delay(attempt);
                    warn!(
                        attempt = attempt + 1,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "transient failure, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => {
                    self.fail_record(record_id, &e).await;
                    return Err(e);
                }
            }
        };

        // Submission acknowledged: no more retries from here, so only this
        // attempt's signature can ever reach the record
        if let Err(e) = self.chain.confirm_transaction(&signature).await {
            self.fail_record(record_id, &e).await;
            return Err(e);
        }

        self.update_record(
            record_id,
            TradeStatus::Confirmed,
            Some(signature.to_string()),
            None,
        )
        .await;
        info!(%signature, record_id, "swap confirmed");

        Ok(SwapOutcome {
            record_id: record_id.to_string(),
            status: TradeStatus::Confirmed,
            signature: Some(signature.to_string()),
            fallback: is_fallback,
        })
    }

    /// One quote → build → sign → simulate → submit attempt
    async fn attempt_submit(
        &self,
        request: &SwapRequest,
        keypair: &Keypair,
        cu_price: Option<u64>,
        amount: u64,
    ) -> Result<Signature, SwapError> {
        let signed = self
            .build_signed_transaction(request, keypair, cu_price, amount)
            .await?;

        if self.pipeline.simulate {
            self.simulate(&signed).await?;
        }

        self.chain.send_transaction(&signed).await
    }

    async fn build_signed_transaction(
        &self,
        request: &SwapRequest,
        keypair: &Keypair,
        cu_price: Option<u64>,
        amount: u64,
    ) -> Result<VersionedTransaction, SwapError> {
        let quote = self
            .providers
            .get_quote(&QuoteParams {
                input_mint: request.input_mint.clone(),
                output_mint: request.output_mint.clone(),
                amount,
                slippage_bps: request.slippage_bps,
                swap_mode: request.swap_mode,
                only_direct_routes: request.only_direct_routes,
            })
            .await?;

        let tx_b64 = self
            .providers
            .build_swap_transaction(
                &quote,
                &BuildParams {
                    user_public_key: keypair.pubkey().to_string(),
                    compute_unit_price_micro_lamports: cu_price,
                    as_legacy_transaction: request.as_legacy_transaction,
                    destination_token_account: request.destination_token_account.clone(),
                },
            )
            .await?;

        let raw = base64::engine::general_purpose::STANDARD
            .decode(tx_b64.trim())
            .map_err(|e| SwapError::BuildFailed {
                detail: format!("transaction payload not base64: {e}"),
                transient: false,
            })?;
        let unsigned: VersionedTransaction =
            bincode::deserialize(&raw).map_err(|e| SwapError::BuildFailed {
                detail: format!("transaction payload undecodable: {e}"),
                transient: false,
            })?;

        VersionedTransaction::try_new(unsigned.message, &[keypair]).map_err(|e| {
            SwapError::BuildFailed {
                detail: format!("signing failed: {e}"),
                transient: false,
            }
        })
    }

    /// Best-effort simulation. Transport errors never halt the pipeline; a
    /// simulation-reported on-chain failure halts it only under the
    /// hard-fail policy.
    async fn simulate(&self, signed: &VersionedTransaction) -> Result<(), SwapError> {
        match self.chain.simulate_transaction(signed).await {
            Ok(outcome) if outcome.failed() => {
                let detail = simulation_detail(&outcome);
                if self.pipeline.hard_fail_on_simulation {
                    Err(SwapError::SimulationFailed(detail))
                } else {
                    warn!(detail = %detail, "simulation reported failure, continuing by policy");
                    Ok(())
                }
            }
            Ok(_) => Ok(()),
            Err(e) => {
                warn!(error = %e, "simulation unavailable, continuing");
                Ok(())
            }
        }
    }

    /// Build, sign and relay N transactions for the same intent. The fee
    /// preference is applied only to the first transaction so a bundle does
    /// not pay the tip N times over.
    async fn build_and_send_bundle(
        &self,
        request: &SwapRequest,
        keypair: &Keypair,
        cu_price: Option<u64>,
    ) -> Result<(), SwapError> {
        let parts = split_amount(request.amount, self.relay.bundle_size());
        let mut signed = Vec::with_capacity(parts.len());
        for (i, part) in parts.iter().enumerate() {
            let part_price = if i == 0 { cu_price } else { None };
            let tx = self
                .build_signed_transaction(request, keypair, part_price, *part)
                .await?;
            signed.push(tx);
        }
        self.relay.send_bundle(&signed).await
    }

    async fn update_record(
        &self,
        record_id: &str,
        status: TradeStatus,
        signature: Option<String>,
        error: Option<String>,
    ) {
        if let Err(e) = self
            .records
            .update_status(record_id, status, signature, error)
            .await
        {
            warn!(record_id, error = %e, "trade record update failed");
        }
    }

    async fn fail_record(&self, record_id: &str, err: &SwapError) {
        let detail = truncate_detail(&format!("{}: {}", err.kind(), err));
        self.update_record(record_id, TradeStatus::Failed, None, Some(detail))
            .await;
    }
}

/// Split a raw amount into up to `n` near-equal parts; the first part
/// absorbs the remainder so the parts always sum to the whole, and parts
/// that would round to zero are dropped
fn split_amount(amount: u64, n: usize) -> Vec<u64> {
    let n = n.max(1) as u64;
    let per = amount / n;
    let remainder = amount % n;
    (0..n)
        .map(|i| if i == 0 { per + remainder } else { per })
        .filter(|part| *part > 0)
        .collect()
}

/// Failure detail with a bounded program-log tail
fn simulation_detail(outcome: &SimulationOutcome) -> String {
    let err = outcome.err.as_deref().unwrap_or("unknown");
    if outcome.logs.is_empty() {
        return truncate_detail(err);
    }
    let tail_start = outcome.logs.len().saturating_sub(5);
    let tail = outcome.logs[tail_start..].join("; ");
    truncate_detail(&format!("{err} | logs: {tail}"))
}
