//! Fee translation: caller fee preference → compute-unit price
//!
//! Callers express priority fees three ways: an explicit micro-lamport
//! compute-unit price, a SOL amount, or a named tier. All collapse to a
//! single `Option<u64>` compute-unit price, `None` meaning "let the provider
//! pick". Tier constants live in an immutable snapshot behind an `ArcSwap`;
//! reconfiguration installs a whole new snapshot instead of mutating shared
//! state.

use std::sync::Arc;

use arc_swap::ArcSwap;
use serde::{Deserialize, Serialize};

use crate::error::SwapError;

/// Named priority tiers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PriorityTier {
    Fast,
    Turbo,
    Ultra,
}

/// Caller-supplied fee preference.
///
/// Untagged: on the wire an integer is an explicit compute-unit price, a
/// float is a SOL amount, a string is a tier name, null/absent is unset.
/// Variant order encodes the precedence (explicit value wins over a SOL
/// amount, which wins over a tier).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
#[serde(untagged)]
pub enum PriorityFee {
    #[default]
    Unset,
    MicroLamports(u64),
    Sol(f64),
    Tier(PriorityTier),
}

impl PriorityFee {
    /// Reject negative or non-finite SOL amounts up front
    pub fn validate(&self) -> Result<(), SwapError> {
        if let Self::Sol(v) = self {
            if !v.is_finite() || *v < 0.0 {
                return Err(SwapError::MissingFields(format!(
                    "priorityFee must be a finite non-negative SOL amount, got {v}"
                )));
            }
        }
        Ok(())
    }
}

/// Fee tier constants and the SOL → compute-unit-price scale factor.
///
/// `sol_scale` is micro-lamports per compute unit per SOL; the default
/// assumes a 200k compute-unit budget (1 SOL = 1e9 lamports = 1e15
/// micro-lamports, over 200k CU).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeeConfig {
    #[serde(default = "default_sol_scale")]
    pub sol_scale: u64,
    #[serde(default = "default_tier_fast")]
    pub tier_fast: u64,
    #[serde(default = "default_tier_turbo")]
    pub tier_turbo: u64,
    #[serde(default = "default_tier_ultra")]
    pub tier_ultra: u64,
    /// Applied when the caller leaves the preference unset; 0 means "no
    /// explicit price, use provider default"
    #[serde(default)]
    pub tier_default: u64,
}

fn default_sol_scale() -> u64 {
    5_000_000_000
}
fn default_tier_fast() -> u64 {
    500
}
fn default_tier_turbo() -> u64 {
    2_000
}
fn default_tier_ultra() -> u64 {
    10_000
}

impl Default for FeeConfig {
    fn default() -> Self {
        Self {
            sol_scale: default_sol_scale(),
            tier_fast: default_tier_fast(),
            tier_turbo: default_tier_turbo(),
            tier_ultra: default_tier_ultra(),
            tier_default: 0,
        }
    }
}

impl FeeConfig {
    fn tier_price(&self, tier: PriorityTier) -> u64 {
        match tier {
            PriorityTier::Fast => self.tier_fast,
            PriorityTier::Turbo => self.tier_turbo,
            PriorityTier::Ultra => self.tier_ultra,
        }
    }
}

/// Translates fee preferences against the current config snapshot
pub struct FeeTranslator {
    config: ArcSwap<FeeConfig>,
}

impl FeeTranslator {
    pub fn new(config: FeeConfig) -> Self {
        Self {
            config: ArcSwap::from_pointee(config),
        }
    }

    /// Install a new tier/scale snapshot. In-flight translations keep the
    /// snapshot they already loaded.
    pub fn reconfigure(&self, config: FeeConfig) {
        self.config.store(Arc::new(config));
    }

    pub fn snapshot(&self) -> Arc<FeeConfig> {
        self.config.load_full()
    }

    /// Resolve a preference to a compute-unit price in micro-lamports.
    ///
    /// Zero results collapse to `None` so the build request omits the field
    /// entirely and the provider applies its own default.
    pub fn compute_unit_price(&self, fee: &PriorityFee) -> Result<Option<u64>, SwapError> {
        fee.validate()?;
        let cfg = self.config.load();
        let price = match fee {
            PriorityFee::MicroLamports(v) => *v,
            PriorityFee::Sol(sol) => {
                if *sol == 0.0 {
                    0
                } else {
                    // Floor, but never below 1 for a positive SOL amount
                    ((sol * cfg.sol_scale as f64).floor() as u64).max(1)
                }
            }
            PriorityFee::Tier(t) => cfg.tier_price(*t),
            PriorityFee::Unset => cfg.tier_default,
        };
        Ok((price > 0).then_some(price))
    }
}

impl Default for FeeTranslator {
    fn default() -> Self {
        Self::new(FeeConfig::default())
    }
}
