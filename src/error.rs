//! Error taxonomy for the swap submission pipeline
//!
//! Every failure the pipeline can surface maps to exactly one variant here.
//! Validation and balance errors are terminal and raised before any fee is
//! spent; transport-class failures are retried by the engine's backoff
//! controller and only surfaced after exhaustion.

use thiserror::Error;

/// Maximum length of upstream error bodies and simulation log tails kept in
/// returned errors. Anything longer is truncated.
pub const MAX_DETAIL_LEN: usize = 300;

/// All terminal outcomes of a swap request
#[derive(Error, Debug)]
pub enum SwapError {
    /// Private key did not decode to exactly 64 bytes in any accepted
    /// encoding (JSON array, hex, base58)
    #[error("invalid private key format: {0}")]
    InvalidKeyFormat(String),

    /// Request validation failure (missing mints, zero amount, bad fee value)
    #[error("missing or invalid request fields: {0}")]
    MissingFields(String),

    /// Signer does not hold enough native SOL to cover the spend plus fees
    #[error("insufficient SOL balance: need {required} lamports, have {available}")]
    BalanceLow { required: u64, available: u64 },

    /// Signer's token accounts do not cover the requested raw amount
    #[error("insufficient token balance: need {required} raw units, have {available}")]
    TokenBalanceLow { required: u64, available: u64 },

    /// Every provider in the fallback chain failed to produce a usable quote
    #[error("quote failed: {detail}")]
    QuoteFailed { detail: String, transient: bool },

    /// Every provider in the fallback chain failed to build the transaction
    #[error("swap build failed: {detail}")]
    BuildFailed { detail: String, transient: bool },

    /// Simulation reported an on-chain failure; terminal only when the
    /// pipeline is configured to hard-fail on simulation
    #[error("simulation failed: {0}")]
    SimulationFailed(String),

    /// Bundle relay returned 429; the engine degrades to the single path
    #[error("bundle relay rate-limited: {0}")]
    RateLimited(String),

    /// Network-level transport failure (connect error, timeout)
    #[error("transport error: {0}")]
    Transport(String),

    /// The network rejected or dropped the signed transaction
    #[error("submit failed: {detail}")]
    SubmitFailed { detail: String, transient: bool },

    /// Anything that escaped the classes above
    #[error("unexpected error: {0}")]
    Unknown(String),
}

impl SwapError {
    /// Short machine-readable kind, stored on failed trade records
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidKeyFormat(_) => "invalid_key_format",
            Self::MissingFields(_) => "missing_fields",
            Self::BalanceLow { .. } => "balance_low",
            Self::TokenBalanceLow { .. } => "token_balance_low",
            Self::QuoteFailed { .. } => "quote_failed",
            Self::BuildFailed { .. } => "build_failed",
            Self::SimulationFailed(_) => "simulation_failed",
            Self::RateLimited(_) => "rate_limited",
            Self::Transport(_) => "transient_transport",
            Self::SubmitFailed { .. } => "submit_failed",
            Self::Unknown(_) => "unknown",
        }
    }

    /// Whether the backoff controller may retry this failure.
    ///
    /// Only transport-class failures qualify: raw connect/timeout errors,
    /// and quote/build/submit exhaustion where the *last* provider error was
    /// itself transport-level, 5xx or 429. Balance and validation errors are
    /// always terminal. `RateLimited` is deliberately not retryable: it is
    /// the bundle-relay signal that triggers the single-path fallback.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport(_) => true,
            Self::QuoteFailed { transient, .. }
            | Self::BuildFailed { transient, .. }
            | Self::SubmitFailed { transient, .. } => *transient,
            _ => false,
        }
    }
}

impl From<reqwest::Error> for SwapError {
    fn from(err: reqwest::Error) -> Self {
        Self::Transport(truncate_detail(&err.to_string()))
    }
}

/// Truncate an upstream error body to [`MAX_DETAIL_LEN`], keeping the cut
/// on a char boundary
pub fn truncate_detail(detail: &str) -> String {
    if detail.len() <= MAX_DETAIL_LEN {
        return detail.to_string();
    }
    let mut end = MAX_DETAIL_LEN;
    while !detail.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}…", &detail[..end])
}

/// Whether an HTTP status code counts as a transient transport failure
pub fn transient_status(status: u16) -> bool {
    status == 429 || (500..600).contains(&status)
}
