//! End-to-end engine tests against mocked providers, relay and chain
//!
//! Exercises the pipeline's externally observable contract: preflight
//! ordering, retry bounds, record terminality, the bundle 429 fallback and
//! the simulation policy flag.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use base64::Engine as _;
use mockito::Matcher;
use serde_json::json;
use solana_sdk::{
    message::Message,
    pubkey::Pubkey,
    signature::{Keypair, Signature, Signer},
    system_instruction,
    transaction::{Transaction, VersionedTransaction},
};

use tradesvc::chain::{ChainClient, SimulationOutcome};
use tradesvc::config::{JitoConfig, PipelineConfig, ProvidersConfig, RetryConfig};
use tradesvc::engine::SwapEngine;
use tradesvc::error::SwapError;
use tradesvc::fee::{FeeTranslator, PriorityFee};
use tradesvc::jito::BundleRelayClient;
use tradesvc::providers::ProviderClient;
use tradesvc::records::{MemoryRecordStore, TradeRecordStore, TradeStatus};
use tradesvc::types::{SwapMode, SwapRequest, SOL_MINT};

const USDC: &str = "EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v";
const RENT: u64 = 2_039_280;

/// Mock chain with configurable balances, simulation verdicts and a
/// scriptable number of transient submit failures
struct MockChain {
    balance: u64,
    simulation: SimulationOutcome,
    transient_submit_failures: AtomicU32,
    submits: AtomicU32,
}

impl MockChain {
    fn rich() -> Self {
        Self {
            balance: 10_000_000_000,
            simulation: SimulationOutcome::default(),
            transient_submit_failures: AtomicU32::new(0),
            submits: AtomicU32::new(0),
        }
    }

    fn broke() -> Self {
        Self {
            balance: 0,
            ..Self::rich()
        }
    }
}

#[async_trait]
impl ChainClient for MockChain {
    async fn balance_lamports(&self, _owner: &Pubkey) -> Result<u64, SwapError> {
        Ok(self.balance)
    }
    async fn token_balance_raw(&self, _owner: &Pubkey, _mint: &Pubkey) -> Result<u64, SwapError> {
        Ok(u64::MAX)
    }
    async fn rent_exempt_minimum(&self, _data_len: usize) -> Result<u64, SwapError> {
        Ok(RENT)
    }
    async fn account_exists(&self, _address: &Pubkey) -> Result<bool, SwapError> {
        Ok(true)
    }
    async fn simulate_transaction(
        &self,
        _tx: &VersionedTransaction,
    ) -> Result<SimulationOutcome, SwapError> {
        Ok(self.simulation.clone())
    }
    async fn send_transaction(&self, tx: &VersionedTransaction) -> Result<Signature, SwapError> {
        self.submits.fetch_add(1, Ordering::SeqCst);
        if self.transient_submit_failures.load(Ordering::SeqCst) > 0 {
            self.transient_submit_failures.fetch_sub(1, Ordering::SeqCst);
            return Err(SwapError::SubmitFailed {
                detail: "connection reset by peer".into(),
                transient: true,
            });
        }
        Ok(tx.signatures[0])
    }
    async fn confirm_transaction(&self, _signature: &Signature) -> Result<(), SwapError> {
        Ok(())
    }
}

/// An unsigned transfer transaction with `payer` as the only required
/// signer, base64-encoded the way providers return it
fn unsigned_tx_b64(payer: &Pubkey) -> String {
    let ix = system_instruction::transfer(payer, &Pubkey::new_unique(), 1);
    let message = Message::new(&[ix], Some(payer));
    let tx: VersionedTransaction = Transaction::new_unsigned(message).into();
    base64::engine::general_purpose::STANDARD.encode(bincode::serialize(&tx).unwrap())
}

fn quote_body() -> String {
    json!({
        "routePlan": [{"swapInfo": {"ammKey": "pool"}}],
        "inAmount": "1000000",
        "outAmount": "987650"
    })
    .to_string()
}

fn request(private_key: String) -> SwapRequest {
    SwapRequest {
        private_key,
        input_mint: SOL_MINT.into(),
        output_mint: USDC.into(),
        amount: 1_000_000,
        swap_mode: SwapMode::ExactIn,
        slippage_bps: 50,
        priority_fee: PriorityFee::MicroLamports(500),
        only_direct_routes: false,
        as_legacy_transaction: false,
        destination_token_account: None,
    }
}

struct Harness {
    engine: SwapEngine,
    records: Arc<MemoryRecordStore>,
    keypair_b58: String,
}

fn harness(
    provider_base: String,
    relay_url: String,
    chain: MockChain,
    pipeline: PipelineConfig,
) -> Harness {
    harness_with_bundle(provider_base, relay_url, chain, pipeline, 2)
}

fn harness_with_bundle(
    provider_base: String,
    relay_url: String,
    chain: MockChain,
    pipeline: PipelineConfig,
    bundle_size: usize,
) -> Harness {
    let keypair = Keypair::new();
    let keypair_b58 = bs58::encode(keypair.to_bytes()).into_string();
    let records = Arc::new(MemoryRecordStore::new());
    let engine = SwapEngine::new(
        ProviderClient::new(ProvidersConfig {
            bases: vec![provider_base],
            ..ProvidersConfig::default()
        }),
        Arc::new(chain),
        records.clone(),
        BundleRelayClient::new(JitoConfig {
            relay_url,
            bundle_size,
            timeout_secs: 5,
        }),
        FeeTranslator::default(),
        pipeline,
        RetryConfig {
            max_attempts: 3,
            base_delay_ms: 1,
            max_delay_ms: 4,
        },
    );
    Harness {
        engine,
        records,
        keypair_b58,
    }
}

fn pubkey_of(b58_secret: &str) -> Pubkey {
    tradesvc::wallet::pubkey_from_str(b58_secret).unwrap()
}

#[tokio::test]
async fn single_path_confirms_and_records_signature() {
    let mut server = mockito::Server::new_async().await;
    let h = harness(
        server.url(),
        format!("{}/bundles", server.url()),
        MockChain::rich(),
        PipelineConfig::default(),
    );
    let payer = pubkey_of(&h.keypair_b58);

    server
        .mock("GET", "/quote")
        .match_query(Matcher::Any)
        .with_status(200)
        .with_body(quote_body())
        .create_async()
        .await;
    server
        .mock("POST", "/swap")
        .with_status(200)
        .with_body(json!({"swapTransaction": unsigned_tx_b64(&payer)}).to_string())
        .create_async()
        .await;

    let outcome = h.engine.execute_swap(request(h.keypair_b58.clone())).await.unwrap();
    assert_eq!(outcome.status, TradeStatus::Confirmed);
    assert!(!outcome.fallback);
    let signature = outcome.signature.expect("confirmed swap carries a signature");

    let record = h.records.get(&outcome.record_id).await.unwrap().unwrap();
    assert_eq!(record.status, TradeStatus::Confirmed);
    assert_eq!(record.signature.as_deref(), Some(signature.as_str()));
    assert_eq!(record.wallet, payer.to_string());
}

#[tokio::test]
async fn balance_low_fails_before_any_upstream_call() {
    let mut server = mockito::Server::new_async().await;
    let quote = server
        .mock("GET", "/quote")
        .match_query(Matcher::Any)
        .with_status(200)
        .with_body(quote_body())
        .expect(0)
        .create_async()
        .await;
    let swap = server
        .mock("POST", "/swap")
        .with_status(200)
        .expect(0)
        .create_async()
        .await;

    let h = harness(
        server.url(),
        format!("{}/bundles", server.url()),
        MockChain::broke(),
        PipelineConfig::default(),
    );

    let err = h
        .engine
        .execute_swap(request(h.keypair_b58.clone()))
        .await
        .unwrap_err();
    assert!(matches!(err, SwapError::BalanceLow { .. }));

    // Preflight must run before any provider traffic
    quote.assert_async().await;
    swap.assert_async().await;

    // And the record still reaches a terminal state
    let record = h.records.all();
    assert_eq!(record.len(), 1);
    assert_eq!(record[0].status, TradeStatus::Failed);
    assert!(record[0].error.as_deref().unwrap().contains("balance_low"));
}

#[tokio::test]
async fn unreachable_providers_retry_then_fail_record() {
    let mut server = mockito::Server::new_async().await;
    // Always 503: transient, so the controller retries up to the bound
    let quote = server
        .mock("GET", "/quote")
        .match_query(Matcher::Any)
        .with_status(503)
        .with_body("down")
        .expect(3)
        .create_async()
        .await;

    let h = harness(
        server.url(),
        format!("{}/bundles", server.url()),
        MockChain::rich(),
        PipelineConfig::default(),
    );

    let err = h
        .engine
        .execute_swap(request(h.keypair_b58.clone()))
        .await
        .unwrap_err();
    assert!(matches!(err, SwapError::QuoteFailed { .. }));
    quote.assert_async().await;

    let records = h.records.all();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].status, TradeStatus::Failed);
    assert!(records[0].error.as_deref().unwrap().contains("quote_failed"));
}

#[tokio::test]
async fn transient_submit_failure_is_retried_once_then_confirms() {
    let mut server = mockito::Server::new_async().await;
    let chain = MockChain::rich();
    chain.transient_submit_failures.store(1, Ordering::SeqCst);

    let h = harness(
        server.url(),
        format!("{}/bundles", server.url()),
        chain,
        PipelineConfig::default(),
    );
    let payer = pubkey_of(&h.keypair_b58);

    // Two full quote+build cycles: the failed attempt and the retry
    let quote = server
        .mock("GET", "/quote")
        .match_query(Matcher::Any)
        .with_status(200)
        .with_body(quote_body())
        .expect(2)
        .create_async()
        .await;
    server
        .mock("POST", "/swap")
        .with_status(200)
        .with_body(json!({"swapTransaction": unsigned_tx_b64(&payer)}).to_string())
        .expect(2)
        .create_async()
        .await;

    let outcome = h
        .engine
        .execute_swap(request(h.keypair_b58.clone()))
        .await
        .unwrap();
    assert_eq!(outcome.status, TradeStatus::Confirmed);
    quote.assert_async().await;

    // Only the last attempt's signature is recorded
    let record = h.records.get(&outcome.record_id).await.unwrap().unwrap();
    assert_eq!(record.signature, outcome.signature);
}

#[tokio::test]
async fn bundle_success_leaves_record_submitted_with_marker() {
    let mut server = mockito::Server::new_async().await;
    let h = harness(
        server.url(),
        format!("{}/bundles", server.url()),
        MockChain::rich(),
        PipelineConfig::default(),
    );
    let payer = pubkey_of(&h.keypair_b58);

    server
        .mock("GET", "/quote")
        .match_query(Matcher::Any)
        .with_status(200)
        .with_body(quote_body())
        .create_async()
        .await;
    server
        .mock("POST", "/swap")
        .with_status(200)
        .with_body(json!({"swapTransaction": unsigned_tx_b64(&payer)}).to_string())
        .create_async()
        .await;
    let relay = server
        .mock("POST", "/bundles")
        .match_body(Matcher::PartialJson(json!({"method": "sendBundle"})))
        .with_status(200)
        .with_body(json!({"jsonrpc": "2.0", "result": "bundle-id", "id": 1}).to_string())
        .expect(1)
        .create_async()
        .await;

    let outcome = h
        .engine
        .execute_bundle_swap(request(h.keypair_b58.clone()))
        .await
        .unwrap();
    assert_eq!(outcome.status, TradeStatus::Submitted);
    assert_eq!(outcome.signature.as_deref(), Some("bundle"));
    assert!(!outcome.fallback);
    relay.assert_async().await;

    let record = h.records.get(&outcome.record_id).await.unwrap().unwrap();
    assert_eq!(record.status, TradeStatus::Submitted);
    assert_eq!(record.signature.as_deref(), Some("bundle"));
}

#[tokio::test]
async fn bundle_applies_fee_preference_only_to_first_build() {
    let mut server = mockito::Server::new_async().await;
    let h = harness_with_bundle(
        server.url(),
        format!("{}/bundles", server.url()),
        MockChain::rich(),
        PipelineConfig::default(),
        3,
    );
    let payer = pubkey_of(&h.keypair_b58);

    server
        .mock("GET", "/quote")
        .match_query(Matcher::Any)
        .with_status(200)
        .with_body(quote_body())
        .create_async()
        .await;
    // Fee-matching mock first; mockito hands a request to the earliest
    // registered mock that matches and still has unmet expectations, so the
    // specific mock must precede the generic one to catch the one build
    // that carries the compute-unit price
    let with_fee = server
        .mock("POST", "/swap")
        .match_body(Matcher::PartialJson(
            json!({"computeUnitPriceMicroLamports": 777}),
        ))
        .with_status(200)
        .with_body(json!({"swapTransaction": unsigned_tx_b64(&payer)}).to_string())
        .expect(1)
        .create_async()
        .await;
    let without_fee = server
        .mock("POST", "/swap")
        .with_status(200)
        .with_body(json!({"swapTransaction": unsigned_tx_b64(&payer)}).to_string())
        .expect(2)
        .create_async()
        .await;
    server
        .mock("POST", "/bundles")
        .with_status(200)
        .with_body(json!({"jsonrpc": "2.0", "result": "bundle-id", "id": 1}).to_string())
        .create_async()
        .await;

    let mut req = request(h.keypair_b58.clone());
    req.priority_fee = PriorityFee::MicroLamports(777);
    let outcome = h.engine.execute_bundle_swap(req).await.unwrap();
    assert_eq!(outcome.status, TradeStatus::Submitted);

    // The tip is paid once per bundle, never once per transaction
    with_fee.assert_async().await;
    without_fee.assert_async().await;
}

#[tokio::test]
async fn bundle_rate_limit_falls_back_to_single_path() {
    let mut server = mockito::Server::new_async().await;
    let h = harness(
        server.url(),
        format!("{}/bundles", server.url()),
        MockChain::rich(),
        PipelineConfig::default(),
    );
    let payer = pubkey_of(&h.keypair_b58);

    server
        .mock("GET", "/quote")
        .match_query(Matcher::Any)
        .with_status(200)
        .with_body(quote_body())
        .create_async()
        .await;
    server
        .mock("POST", "/swap")
        .with_status(200)
        .with_body(json!({"swapTransaction": unsigned_tx_b64(&payer)}).to_string())
        .create_async()
        .await;
    let relay = server
        .mock("POST", "/bundles")
        .with_status(429)
        .with_body("rate limited")
        .expect(1)
        .create_async()
        .await;

    let outcome = h
        .engine
        .execute_bundle_swap(request(h.keypair_b58.clone()))
        .await
        .unwrap();
    assert!(outcome.fallback, "429 must surface as a fallback outcome");
    assert_eq!(outcome.status, TradeStatus::Confirmed);
    assert!(outcome.signature.is_some());
    relay.assert_async().await;

    let record = h.records.get(&outcome.record_id).await.unwrap().unwrap();
    assert_eq!(record.status, TradeStatus::Confirmed);
}

#[tokio::test]
async fn relay_hard_error_is_terminal_and_fails_record() {
    let mut server = mockito::Server::new_async().await;
    let h = harness(
        server.url(),
        format!("{}/bundles", server.url()),
        MockChain::rich(),
        PipelineConfig::default(),
    );
    let payer = pubkey_of(&h.keypair_b58);

    server
        .mock("GET", "/quote")
        .match_query(Matcher::Any)
        .with_status(200)
        .with_body(quote_body())
        .create_async()
        .await;
    server
        .mock("POST", "/swap")
        .with_status(200)
        .with_body(json!({"swapTransaction": unsigned_tx_b64(&payer)}).to_string())
        .create_async()
        .await;
    server
        .mock("POST", "/bundles")
        .with_status(400)
        .with_body("malformed bundle")
        .create_async()
        .await;

    let err = h
        .engine
        .execute_bundle_swap(request(h.keypair_b58.clone()))
        .await
        .unwrap_err();
    match err {
        SwapError::SubmitFailed { detail, transient } => {
            assert!(!transient);
            assert!(detail.contains("400"));
        }
        other => panic!("expected SubmitFailed, got {other:?}"),
    }

    let records = h.records.all();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].status, TradeStatus::Failed);
}

#[tokio::test]
async fn simulation_failure_is_terminal_only_under_hard_fail_policy() {
    // Soft policy (default): failure is logged and the pipeline continues
    let mut server = mockito::Server::new_async().await;
    let chain = MockChain {
        simulation: SimulationOutcome {
            err: Some("InstructionError(3, Custom(6001))".into()),
            logs: vec!["Program log: slippage exceeded".into()],
        },
        ..MockChain::rich()
    };
    let h = harness(
        server.url(),
        format!("{}/bundles", server.url()),
        chain,
        PipelineConfig::default(),
    );
    let payer = pubkey_of(&h.keypair_b58);

    server
        .mock("GET", "/quote")
        .match_query(Matcher::Any)
        .with_status(200)
        .with_body(quote_body())
        .create_async()
        .await;
    server
        .mock("POST", "/swap")
        .with_status(200)
        .with_body(json!({"swapTransaction": unsigned_tx_b64(&payer)}).to_string())
        .create_async()
        .await;

    let outcome = h
        .engine
        .execute_swap(request(h.keypair_b58.clone()))
        .await
        .unwrap();
    assert_eq!(outcome.status, TradeStatus::Confirmed);

    // Hard-fail policy: the same verdict halts the pipeline
    let mut server = mockito::Server::new_async().await;
    let chain = MockChain {
        simulation: SimulationOutcome {
            err: Some("InstructionError(3, Custom(6001))".into()),
            logs: vec!["Program log: slippage exceeded".into()],
        },
        ..MockChain::rich()
    };
    let h = harness(
        server.url(),
        format!("{}/bundles", server.url()),
        chain,
        PipelineConfig {
            hard_fail_on_simulation: true,
            ..PipelineConfig::default()
        },
    );
    let payer = pubkey_of(&h.keypair_b58);

    server
        .mock("GET", "/quote")
        .match_query(Matcher::Any)
        .with_status(200)
        .with_body(quote_body())
        .create_async()
        .await;
    server
        .mock("POST", "/swap")
        .with_status(200)
        .with_body(json!({"swapTransaction": unsigned_tx_b64(&payer)}).to_string())
        .create_async()
        .await;

    let err = h
        .engine
        .execute_swap(request(h.keypair_b58.clone()))
        .await
        .unwrap_err();
    match err {
        SwapError::SimulationFailed(detail) => {
            assert!(detail.contains("Custom(6001)"));
            assert!(detail.contains("slippage exceeded"));
        }
        other => panic!("expected SimulationFailed, got {other:?}"),
    }

    let records = h.records.all();
    assert_eq!(records[0].status, TradeStatus::Failed);
    assert!(records[0]
        .error
        .as_deref()
        .unwrap()
        .contains("simulation_failed"));
}

#[tokio::test]
async fn invalid_key_rejected_before_record_creation() {
    let server = mockito::Server::new_async().await;
    let h = harness(
        server.url(),
        format!("{}/bundles", server.url()),
        MockChain::rich(),
        PipelineConfig::default(),
    );

    let err = h
        .engine
        .execute_swap(request("definitely-not-a-key".into()))
        .await
        .unwrap_err();
    assert!(matches!(err, SwapError::InvalidKeyFormat(_)));
    assert!(h.records.all().is_empty());
}

#[tokio::test]
async fn signed_transaction_round_trips_byte_identical() {
    let keypair = Keypair::new();
    let ix = system_instruction::transfer(&keypair.pubkey(), &Pubkey::new_unique(), 1);
    let message = Message::new(&[ix], Some(&keypair.pubkey()));
    let unsigned: VersionedTransaction = Transaction::new_unsigned(message).into();
    let signed = VersionedTransaction::try_new(unsigned.message, &[&keypair]).unwrap();

    let wire = bincode::serialize(&signed).unwrap();
    let decoded: VersionedTransaction = bincode::deserialize(&wire).unwrap();
    assert_eq!(bincode::serialize(&decoded).unwrap(), wire);
    assert_eq!(decoded.signatures, signed.signatures);
}
