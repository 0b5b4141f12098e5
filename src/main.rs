//! tradesvc - Solana swap submission service
//!
//! CLI entry point: loads configuration, wires up the engine and executes
//! one swap (directly or as a bundle), printing the outcome as JSON. The
//! request-routing layer in front of this pipeline lives elsewhere; this
//! binary is the operational harness.

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tradesvc::config::Config;
use tradesvc::engine::SwapEngine;
use tradesvc::fee::{PriorityFee, PriorityTier};
use tradesvc::types::{SwapMode, SwapRequest};

/// Command line arguments
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.toml")]
    config: String,

    /// Private key (JSON array, hex or base58); prefer the env var over the
    /// flag so the key stays out of shell history
    #[arg(long, env = "TRADESVC_PRIVATE_KEY", hide_env_values = true)]
    private_key: String,

    /// Input mint address
    #[arg(long)]
    input_mint: String,

    /// Output mint address
    #[arg(long)]
    output_mint: String,

    /// Amount in raw base units
    #[arg(long)]
    amount: u64,

    /// Slippage tolerance in basis points
    #[arg(long, default_value = "50")]
    slippage_bps: u16,

    /// Swap ExactOut instead of ExactIn
    #[arg(long)]
    exact_out: bool,

    /// Priority fee: integer micro-lamports, decimal SOL amount, or a tier
    /// name (fast/turbo/ultra)
    #[arg(long)]
    priority_fee: Option<String>,

    /// Restrict routing to direct routes
    #[arg(long)]
    only_direct_routes: bool,

    /// Submit as an atomic bundle via the relay
    #[arg(long)]
    bundle: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    init_logging(args.verbose)?;

    info!("starting tradesvc v{}", env!("CARGO_PKG_VERSION"));

    let config = load_config(&args.config)?;
    let engine = SwapEngine::from_config(&config).context("failed to initialize swap engine")?;

    let request = SwapRequest {
        private_key: args.private_key.clone(),
        input_mint: args.input_mint.clone(),
        output_mint: args.output_mint.clone(),
        amount: args.amount,
        swap_mode: if args.exact_out {
            SwapMode::ExactOut
        } else {
            SwapMode::ExactIn
        },
        slippage_bps: args.slippage_bps,
        priority_fee: parse_priority_fee(args.priority_fee.as_deref())?,
        only_direct_routes: args.only_direct_routes,
        as_legacy_transaction: false,
        destination_token_account: None,
    };

    let outcome = if args.bundle {
        engine.execute_bundle_swap(request).await
    } else {
        engine.execute_swap(request).await
    };

    match outcome {
        Ok(outcome) => {
            println!("{}", serde_json::to_string_pretty(&outcome)?);
            Ok(())
        }
        Err(e) => {
            eprintln!(
                "{}",
                serde_json::json!({ "error": e.kind(), "detail": e.to_string() })
            );
            Err(e.into())
        }
    }
}

/// Map the CLI fee flag onto the wire representation: integer → explicit
/// compute-unit price, decimal → SOL amount, word → tier
fn parse_priority_fee(raw: Option<&str>) -> Result<PriorityFee> {
    let Some(raw) = raw else {
        return Ok(PriorityFee::Unset);
    };
    let trimmed = raw.trim();
    if let Ok(micro) = trimmed.parse::<u64>() {
        return Ok(PriorityFee::MicroLamports(micro));
    }
    if let Ok(sol) = trimmed.parse::<f64>() {
        return Ok(PriorityFee::Sol(sol));
    }
    match trimmed.to_lowercase().as_str() {
        "fast" => Ok(PriorityFee::Tier(PriorityTier::Fast)),
        "turbo" => Ok(PriorityFee::Tier(PriorityTier::Turbo)),
        "ultra" => Ok(PriorityFee::Tier(PriorityTier::Ultra)),
        other => anyhow::bail!("unrecognized priority fee '{other}'"),
    }
}

/// Initialize logging subsystem
fn init_logging(verbose: bool) -> Result<()> {
    let env_filter = if verbose {
        "tradesvc=debug,info"
    } else {
        "tradesvc=info,warn,error"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| env_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .init();

    Ok(())
}

/// Load configuration from file with fallback to defaults
fn load_config(path: &str) -> Result<Config> {
    if std::path::Path::new(path).exists() {
        Config::from_file_with_env(path)
            .with_context(|| format!("Failed to load config from {}", path))
    } else {
        warn!("Config file '{}' not found, using defaults", path);
        Ok(Config::default())
    }
}
