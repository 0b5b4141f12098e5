//! Signer handling: private-key decoding and keypair utilities
//!
//! Accepted encodings for a 64-byte secret key: a JSON array of integers,
//! a hex string (optional `0x` prefix), or a base58 string. Anything that
//! does not decode to exactly 64 bytes is rejected with `InvalidKeyFormat`.

use solana_sdk::{
    pubkey::Pubkey,
    signature::{Keypair, Signer},
};
use zeroize::Zeroize;

use crate::error::SwapError;

/// Expected decoded key length: 32-byte secret + 32-byte public key
const KEYPAIR_LEN: usize = 64;

/// Decode a private key in any accepted encoding into a [`Keypair`]
pub fn keypair_from_str(input: &str) -> Result<Keypair, SwapError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(SwapError::InvalidKeyFormat("empty key".into()));
    }

    let mut bytes = decode_key_bytes(trimmed)?;
    if bytes.len() != KEYPAIR_LEN {
        let got = bytes.len();
        bytes.zeroize();
        return Err(SwapError::InvalidKeyFormat(format!(
            "expected {KEYPAIR_LEN} bytes, got {got}"
        )));
    }
    if bytes.iter().all(|&b| b == 0) {
        bytes.zeroize();
        return Err(SwapError::InvalidKeyFormat("all-zero key rejected".into()));
    }

    let keypair = Keypair::try_from(bytes.as_slice())
        .map_err(|e| SwapError::InvalidKeyFormat(e.to_string()));
    bytes.zeroize();
    keypair
}

fn decode_key_bytes(trimmed: &str) -> Result<Vec<u8>, SwapError> {
    // JSON array format, as exported by solana-keygen
    if trimmed.starts_with('[') {
        let parsed: Vec<u8> = serde_json::from_str(trimmed)
            .map_err(|e| SwapError::InvalidKeyFormat(format!("bad JSON key array: {e}")))?;
        return Ok(parsed);
    }

    // Hex, with or without 0x prefix
    let hex_body = trimmed.strip_prefix("0x").unwrap_or(trimmed);
    if hex_body.len() == KEYPAIR_LEN * 2 && hex_body.chars().all(|c| c.is_ascii_hexdigit()) {
        return hex::decode(hex_body)
            .map_err(|e| SwapError::InvalidKeyFormat(format!("bad hex key: {e}")));
    }

    // Base58 fallback
    bs58::decode(trimmed)
        .into_vec()
        .map_err(|e| SwapError::InvalidKeyFormat(format!("bad base58 key: {e}")))
}

/// Derive the public key for a private key in any accepted encoding
pub fn pubkey_from_str(input: &str) -> Result<Pubkey, SwapError> {
    Ok(keypair_from_str(input)?.pubkey())
}

/// Normalize a private key in any accepted encoding to base58
pub fn normalize_to_base58(input: &str) -> Result<String, SwapError> {
    let keypair = keypair_from_str(input)?;
    let mut bytes = keypair.to_bytes();
    let encoded = bs58::encode(&bytes).into_string();
    bytes.zeroize();
    Ok(encoded)
}

/// Generate a fresh keypair, returned as (base58 secret, pubkey string)
pub fn generate() -> (String, String) {
    let keypair = Keypair::new();
    let mut bytes = keypair.to_bytes();
    let secret = bs58::encode(&bytes).into_string();
    bytes.zeroize();
    (secret, keypair.pubkey().to_string())
}
