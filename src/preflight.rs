//! Balance preflight: reject swaps that would fail on chain for
//! insufficient funds before any network fee is spent
//!
//! The required-lamports arithmetic mirrors what a swap actually costs: a
//! base-fee margin, the spend amount plus wrap-account rent when the input
//! is native SOL, and rent for the destination token account when it does
//! not exist yet. Token-balance lookups that error out are skipped rather
//! than failed: simulation is the ultimate authority, and a transient RPC
//! hiccup should not block an otherwise valid swap.

use std::str::FromStr;

use solana_sdk::pubkey::Pubkey;
use spl_associated_token_account::get_associated_token_address;
use spl_token::solana_program::program_pack::Pack;
use tracing::{debug, warn};

use crate::chain::ChainClient;
use crate::config::PipelineConfig;
use crate::error::SwapError;
use crate::types::{SwapMode, SwapRequest};

/// Size of a standard SPL token account, for rent lookups
const TOKEN_ACCOUNT_LEN: usize = spl_token::state::Account::LEN;

/// Validate that `signer` can afford `request`. Runs before any provider
/// call; failures here cost nothing.
pub async fn validate_balances(
    chain: &dyn ChainClient,
    config: &PipelineConfig,
    signer: &Pubkey,
    request: &SwapRequest,
) -> Result<(), SwapError> {
    let rent = chain.rent_exempt_minimum(TOKEN_ACCOUNT_LEN).await?;

    let mut required = config.fee_margin_lamports;

    // ExactOut spends an amount unknown until quoted; only the fee margin
    // and rent components apply
    let spend_known = request.swap_mode == SwapMode::ExactIn;

    if request.input_is_sol() && spend_known {
        required = required
            .saturating_add(request.amount)
            .saturating_add(rent);
    }

    if request.output_is_token() {
        let destination = match &request.destination_token_account {
            Some(addr) => Pubkey::from_str(addr)
                .map_err(|_| SwapError::MissingFields("destinationTokenAccount".into()))?,
            None => {
                let mint = Pubkey::from_str(&request.output_mint)
                    .map_err(|_| SwapError::MissingFields("outputMint".into()))?;
                get_associated_token_address(signer, &mint)
            }
        };
        match chain.account_exists(&destination).await {
            Ok(false) => required = required.saturating_add(rent),
            Ok(true) => {}
            Err(e) => {
                warn!(error = %e, "destination account lookup failed, assuming it exists");
            }
        }
    }

    let available = chain.balance_lamports(signer).await?;
    debug!(required, available, "native balance preflight");
    if available < required {
        return Err(SwapError::BalanceLow {
            required,
            available,
        });
    }

    if !request.input_is_sol() && spend_known {
        let mint = Pubkey::from_str(&request.input_mint)
            .map_err(|_| SwapError::MissingFields("inputMint".into()))?;
        match chain.token_balance_raw(signer, &mint).await {
            Ok(total) if total < request.amount => {
                return Err(SwapError::TokenBalanceLow {
                    required: request.amount,
                    available: total,
                });
            }
            Ok(_) => {}
            Err(e) => {
                // Deliberate trade-off: skip the check and let simulation
                // catch a real shortfall
                warn!(error = %e, "token balance lookup failed, skipping check");
            }
        }
    }

    Ok(())
}
