//! Configuration for the swap submission service
//!
//! Loaded from a TOML file with per-field defaults, optionally overlaid
//! with environment variables from a `.env` file.

use serde::{Deserialize, Serialize};

use crate::fee::FeeConfig;

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Ordered quote/build provider chain
    #[serde(default)]
    pub providers: ProvidersConfig,

    /// Blockchain RPC access
    #[serde(default)]
    pub rpc: RpcConfig,

    /// Fee tier constants and SOL conversion scale
    #[serde(default)]
    pub fees: FeeConfig,

    /// Pipeline policy knobs
    #[serde(default)]
    pub pipeline: PipelineConfig,

    /// Retry/backoff bounds for transient failures
    #[serde(default)]
    pub retry: RetryConfig,

    /// Bundle relay settings
    #[serde(default)]
    pub jito: JitoConfig,

    /// Trade record store selection
    #[serde(default)]
    pub records: RecordsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProvidersConfig {
    /// Ordered list of provider base URLs, tried first to last
    #[serde(default = "default_provider_bases")]
    pub bases: Vec<String>,

    /// API key attached only to bases matching `api_key_domain`
    #[serde(default)]
    pub api_key: Option<String>,

    /// Domain the API key was issued for
    #[serde(default = "default_api_key_domain")]
    pub api_key_domain: String,

    /// Per-call timeout for /quote
    #[serde(default = "default_quote_timeout")]
    pub quote_timeout_secs: u64,

    /// Per-call timeout for /swap
    #[serde(default = "default_swap_timeout")]
    pub swap_timeout_secs: u64,

    /// Ask providers to avoid exotic intermediate hops
    #[serde(default = "default_true")]
    pub restrict_intermediate_tokens: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcConfig {
    /// RPC endpoint URL
    #[serde(default = "default_rpc_url")]
    pub url: String,

    /// Commitment level for reads, submission and confirmation
    #[serde(default = "default_commitment")]
    pub commitment: String,

    /// Per-call timeout for RPC requests
    #[serde(default = "default_rpc_timeout")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Run a best-effort simulation between signing and submission
    #[serde(default = "default_true")]
    pub simulate: bool,

    /// Treat a simulation-reported failure as terminal instead of a warning
    #[serde(default)]
    pub hard_fail_on_simulation: bool,

    /// Lamports reserved for the base transaction fee during preflight
    #[serde(default = "default_fee_margin")]
    pub fee_margin_lamports: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Total attempts for the quote+build+submit cycle
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// First backoff delay; doubles each attempt
    #[serde(default = "default_base_delay")]
    pub base_delay_ms: u64,

    /// Ceiling on any single backoff delay
    #[serde(default = "default_max_delay")]
    pub max_delay_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JitoConfig {
    /// Bundle relay endpoint (JSON-RPC `sendBundle`)
    #[serde(default = "default_relay_url")]
    pub relay_url: String,

    /// Number of transactions per bundle
    #[serde(default = "default_bundle_size")]
    pub bundle_size: usize,

    /// Per-call timeout for relay submission
    #[serde(default = "default_swap_timeout")]
    pub timeout_secs: u64,
}

/// Which trade record store to run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RecordBackend {
    #[default]
    Memory,
    Sled,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordsConfig {
    #[serde(default)]
    pub backend: RecordBackend,

    /// Path for the sled database when `backend = "sled"`
    #[serde(default = "default_sled_path")]
    pub sled_path: String,
}

// Default value functions
fn default_provider_bases() -> Vec<String> {
    vec![
        "https://api.jup.ag/swap/v1".to_string(),
        "https://lite-api.jup.ag/swap/v1".to_string(),
        "https://www.jupiterapi.com".to_string(),
    ]
}
fn default_api_key_domain() -> String {
    "api.jup.ag".to_string()
}
fn default_quote_timeout() -> u64 {
    12
}
fn default_swap_timeout() -> u64 {
    15
}
fn default_rpc_url() -> String {
    "https://api.mainnet-beta.solana.com".to_string()
}
fn default_commitment() -> String {
    "confirmed".to_string()
}
fn default_rpc_timeout() -> u64 {
    15
}
fn default_fee_margin() -> u64 {
    2_000_000
}
fn default_max_attempts() -> u32 {
    3
}
fn default_base_delay() -> u64 {
    250
}
fn default_max_delay() -> u64 {
    4_000
}
fn default_relay_url() -> String {
    "https://mainnet.block-engine.jito.wtf/api/v1/bundles".to_string()
}
fn default_bundle_size() -> usize {
    3
}
fn default_sled_path() -> String {
    "trade_records.sled".to_string()
}
fn default_true() -> bool {
    true
}

impl Default for ProvidersConfig {
    fn default() -> Self {
        Self {
            bases: default_provider_bases(),
            api_key: None,
            api_key_domain: default_api_key_domain(),
            quote_timeout_secs: default_quote_timeout(),
            swap_timeout_secs: default_swap_timeout(),
            restrict_intermediate_tokens: true,
        }
    }
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            url: default_rpc_url(),
            commitment: default_commitment(),
            timeout_secs: default_rpc_timeout(),
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            simulate: true,
            hard_fail_on_simulation: false,
            fee_margin_lamports: default_fee_margin(),
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay(),
            max_delay_ms: default_max_delay(),
        }
    }
}

impl Default for JitoConfig {
    fn default() -> Self {
        Self {
            relay_url: default_relay_url(),
            bundle_size: default_bundle_size(),
            timeout_secs: default_swap_timeout(),
        }
    }
}

impl Default for RecordsConfig {
    fn default() -> Self {
        Self {
            backend: RecordBackend::Memory,
            sled_path: default_sled_path(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            providers: ProvidersConfig::default(),
            rpc: RpcConfig::default(),
            fees: FeeConfig::default(),
            pipeline: PipelineConfig::default(),
            retry: RetryConfig::default(),
            jito: JitoConfig::default(),
            records: RecordsConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// Load configuration with `.env` overlays applied first
    pub fn from_file_with_env(path: &str) -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_file(path)
    }
}
