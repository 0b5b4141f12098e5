//! tradesvc - Solana swap submission service
//!
//! Takes a swap request (signer key + trade parameters), obtains a quote and
//! an unsigned transaction from an ordered chain of interchangeable upstream
//! providers, validates balances, signs, optionally simulates, submits
//! (directly or as an atomic bundle via a relay) and confirms, retrying only
//! transient failures.

pub mod chain;
pub mod config;
pub mod engine;
pub mod error;
pub mod fee;
pub mod jito;
pub mod preflight;
pub mod providers;
pub mod records;
pub mod types;
pub mod wallet;

pub use config::Config;
pub use engine::SwapEngine;
pub use error::SwapError;
pub use types::{SwapOutcome, SwapRequest};

// Re-export commonly used types
pub use solana_sdk::{pubkey::Pubkey, signature::Signature};
