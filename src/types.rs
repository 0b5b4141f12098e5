//! Shared request/response types for the swap pipeline

use serde::{Deserialize, Serialize};

use crate::error::SwapError;
use crate::fee::PriorityFee;
use crate::records::TradeStatus;

/// Mint address of native SOL (wrapped SOL)
pub const SOL_MINT: &str = "So11111111111111111111111111111111111111112";

/// Swap direction understood by the quoting services
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum SwapMode {
    #[default]
    ExactIn,
    ExactOut,
}

impl SwapMode {
    /// Wire value for the `swapMode` query parameter
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ExactIn => "ExactIn",
            Self::ExactOut => "ExactOut",
        }
    }
}

/// One inbound swap request. Immutable once accepted by the engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SwapRequest {
    /// Signer secret material. Only the wallet module ever reads this.
    pub private_key: String,
    pub input_mint: String,
    pub output_mint: String,
    /// Amount in raw base units (lamports when the input is SOL)
    pub amount: u64,
    #[serde(default)]
    pub swap_mode: SwapMode,
    #[serde(default = "default_slippage_bps")]
    pub slippage_bps: u16,
    #[serde(default)]
    pub priority_fee: PriorityFee,
    #[serde(default)]
    pub only_direct_routes: bool,
    #[serde(default)]
    pub as_legacy_transaction: bool,
    #[serde(default)]
    pub destination_token_account: Option<String>,
}

fn default_slippage_bps() -> u16 {
    50
}

impl SwapRequest {
    /// Reject structurally invalid requests before any upstream work
    pub fn validate(&self) -> Result<(), SwapError> {
        if self.input_mint.trim().is_empty() {
            return Err(SwapError::MissingFields("inputMint".into()));
        }
        if self.output_mint.trim().is_empty() {
            return Err(SwapError::MissingFields("outputMint".into()));
        }
        if self.input_mint == self.output_mint {
            return Err(SwapError::MissingFields(
                "inputMint and outputMint must differ".into(),
            ));
        }
        if self.amount == 0 {
            return Err(SwapError::MissingFields("amount must be > 0".into()));
        }
        self.priority_fee.validate()?;
        Ok(())
    }

    /// True when the spend side of this swap is native SOL
    pub fn input_is_sol(&self) -> bool {
        self.input_mint == SOL_MINT
    }

    /// True when the receive side of this swap is an SPL token
    pub fn output_is_token(&self) -> bool {
        self.output_mint != SOL_MINT
    }
}

/// Upstream quote object, passed through to the build step unmodified.
///
/// Only the route-evidence fields are lifted out; everything else rides in
/// `extra` so the object re-serializes byte-for-byte into the `/swap` body.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuoteResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub route_plan: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub out_amount: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub other_amount_threshold: Option<serde_json::Value>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl QuoteResponse {
    /// A response counts as a real route only if it carries a route plan,
    /// an output amount, or a minimum-output threshold
    pub fn has_route(&self) -> bool {
        let plan_present = match &self.route_plan {
            Some(serde_json::Value::Array(a)) => !a.is_empty(),
            Some(serde_json::Value::Null) | None => false,
            Some(_) => true,
        };
        plan_present
            || self.out_amount.as_ref().is_some_and(|v| !v.is_null())
            || self
                .other_amount_threshold
                .as_ref()
                .is_some_and(|v| !v.is_null())
    }
}

/// Final result handed back to the caller for one swap request
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SwapOutcome {
    pub record_id: String,
    pub status: TradeStatus,
    pub signature: Option<String>,
    /// Set when the bundle path degraded to the single-transaction path
    #[serde(default)]
    pub fallback: bool,
}
