//! Provider fallback client for quote and swap-build calls
//!
//! An ordered list of interchangeable upstream bases is tried first to last
//! for both `/quote` and `/swap`. A quote is accepted only when the response
//! is HTTP 200 and carries route evidence; a build is accepted only when it
//! carries a `swapTransaction` payload. Everything else advances to the next
//! base while retaining the last error text (truncated).
//!
//! Two upstream quirks are handled here and must not be "simplified" away:
//! - A 400/422 on `/swap` gets one retry against the *same* base with
//!   `asLegacyTransaction` forced on; some providers require legacy format
//!   without advertising it.
//! - The API key header is attached only to bases on the domain the key was
//!   issued for. A mismatched key causes silent authorization failures.

use std::time::Duration;

use reqwest::StatusCode;
use tracing::{debug, warn};

use crate::config::ProvidersConfig;
use crate::error::{transient_status, truncate_detail, SwapError};
use crate::types::{QuoteResponse, SwapMode};

/// Parameters for a `/quote` call
#[derive(Debug, Clone)]
pub struct QuoteParams {
    pub input_mint: String,
    pub output_mint: String,
    pub amount: u64,
    pub slippage_bps: u16,
    pub swap_mode: SwapMode,
    pub only_direct_routes: bool,
}

/// Parameters for a `/swap` call
#[derive(Debug, Clone)]
pub struct BuildParams {
    pub user_public_key: String,
    pub compute_unit_price_micro_lamports: Option<u64>,
    pub as_legacy_transaction: bool,
    pub destination_token_account: Option<String>,
}

/// HTTP client over the ordered provider chain.
///
/// One pooled reqwest client per instance; connections are reused across
/// requests for the process lifetime.
pub struct ProviderClient {
    client: reqwest::Client,
    config: ProvidersConfig,
}

impl ProviderClient {
    pub fn new(config: ProvidersConfig) -> Self {
        let client = reqwest::Client::builder()
            .user_agent(concat!("tradesvc/", env!("CARGO_PKG_VERSION")))
            .build()
            .unwrap_or_default();
        Self { client, config }
    }

    fn wants_api_key(&self, base: &str) -> bool {
        self.config.api_key.is_some() && base.contains(&self.config.api_key_domain)
    }

    fn url(base: &str, path: &str) -> String {
        format!("{}{}", base.trim_end_matches('/'), path)
    }

    /// Fetch a quote, iterating the provider chain until one returns a
    /// response with route evidence. Exhaustion yields `QuoteFailed` carrying
    /// the last provider error.
    pub async fn get_quote(&self, params: &QuoteParams) -> Result<QuoteResponse, SwapError> {
        let amount = params.amount.to_string();
        let slippage = params.slippage_bps.to_string();
        let query: Vec<(&str, &str)> = vec![
            ("inputMint", params.input_mint.as_str()),
            ("outputMint", params.output_mint.as_str()),
            ("amount", amount.as_str()),
            ("slippageBps", slippage.as_str()),
            ("swapMode", params.swap_mode.as_str()),
            (
                "onlyDirectRoutes",
                if params.only_direct_routes { "true" } else { "false" },
            ),
            (
                "restrictIntermediateTokens",
                if self.config.restrict_intermediate_tokens {
                    "true"
                } else {
                    "false"
                },
            ),
        ];

        let mut last_err = String::from("no providers configured");
        let mut last_transient = false;

        for base in &self.config.bases {
            let mut req = self
                .client
                .get(Self::url(base, "/quote"))
                .query(&query)
                .timeout(Duration::from_secs(self.config.quote_timeout_secs));
            if self.wants_api_key(base) {
                if let Some(key) = &self.config.api_key {
                    req = req.header("X-API-KEY", key);
                }
            }

            match req.send().await {
                Ok(resp) => {
                    let status = resp.status();
                    let body = resp.text().await.unwrap_or_default();
                    if status == StatusCode::OK {
                        if let Ok(quote) = serde_json::from_str::<QuoteResponse>(&body) {
                            if quote.has_route() {
                                debug!(%base, "quote accepted");
                                return Ok(quote);
                            }
                        }
                    }
                    last_err = format!("{} /quote {} {}", base, status.as_u16(), truncate_detail(&body));
                    last_transient = transient_status(status.as_u16());
                    warn!(%base, status = status.as_u16(), "quote rejected, trying next provider");
                }
                Err(e) => {
                    last_err = format!("{} /quote {}", base, truncate_detail(&e.to_string()));
                    last_transient = true;
                    warn!(%base, error = %e, "quote transport failure, trying next provider");
                }
            }
        }

        Err(SwapError::QuoteFailed {
            detail: last_err,
            transient: last_transient,
        })
    }

    /// Build an unsigned swap transaction from a quote, iterating the
    /// provider chain. Returns the base64-encoded transaction payload.
    pub async fn build_swap_transaction(
        &self,
        quote: &QuoteResponse,
        params: &BuildParams,
    ) -> Result<String, SwapError> {
        let mut body = serde_json::json!({
            "quoteResponse": quote,
            "userPublicKey": params.user_public_key,
            "wrapAndUnwrapSol": true,
            "dynamicComputeUnitLimit": true,
        });
        if let Some(price) = params.compute_unit_price_micro_lamports {
            body["computeUnitPriceMicroLamports"] = price.into();
        }
        if params.as_legacy_transaction {
            body["asLegacyTransaction"] = true.into();
        }
        if let Some(dest) = &params.destination_token_account {
            body["destinationTokenAccount"] = dest.as_str().into();
        }

        let mut last_err = String::from("no providers configured");
        let mut last_transient = false;

        for base in &self.config.bases {
            match self.post_swap(base, &body).await {
                Ok(SwapAttempt::Built(tx)) => {
                    debug!(%base, "swap transaction built");
                    return Ok(tx);
                }
                Ok(SwapAttempt::Rejected { status, body: text }) => {
                    // Some providers reject versioned transactions with
                    // 400/422; retry once on the same base in legacy format.
                    // When that retry also fails, its error is the one worth
                    // keeping, not the original rejection.
                    if (status == 400 || status == 422) && !params.as_legacy_transaction {
                        let mut legacy_body = body.clone();
                        legacy_body["asLegacyTransaction"] = true.into();
                        match self.post_swap(base, &legacy_body).await {
                            Ok(SwapAttempt::Built(tx)) => {
                                debug!(%base, "swap transaction built on legacy retry");
                                return Ok(tx);
                            }
                            Ok(SwapAttempt::Rejected {
                                status: legacy_status,
                                body: legacy_text,
                            }) => {
                                last_err = format!(
                                    "{} /swap legacy {} {}",
                                    base,
                                    legacy_status,
                                    truncate_detail(&legacy_text)
                                );
                                last_transient = transient_status(legacy_status);
                                warn!(%base, status = legacy_status, "legacy retry rejected, trying next provider");
                            }
                            Err(e) => {
                                last_err =
                                    format!("{} /swap legacy {}", base, truncate_detail(&e.to_string()));
                                last_transient = true;
                                warn!(%base, error = %e, "legacy retry transport failure, trying next provider");
                            }
                        }
                        continue;
                    }
                    last_err = format!("{} /swap {} {}", base, status, truncate_detail(&text));
                    last_transient = transient_status(status);
                    warn!(%base, status, "swap build rejected, trying next provider");
                }
                Err(e) => {
                    last_err = format!("{} /swap {}", base, truncate_detail(&e.to_string()));
                    last_transient = true;
                    warn!(%base, error = %e, "swap build transport failure, trying next provider");
                }
            }
        }

        Err(SwapError::BuildFailed {
            detail: last_err,
            transient: last_transient,
        })
    }

    async fn post_swap(
        &self,
        base: &str,
        body: &serde_json::Value,
    ) -> Result<SwapAttempt, reqwest::Error> {
        let mut req = self
            .client
            .post(Self::url(base, "/swap"))
            .json(body)
            .timeout(Duration::from_secs(self.config.swap_timeout_secs));
        if self.wants_api_key(base) {
            if let Some(key) = &self.config.api_key {
                req = req.header("X-API-KEY", key);
            }
        }

        let resp = req.send().await?;
        let status = resp.status().as_u16();
        let text = resp.text().await.unwrap_or_default();

        if status == 200 {
            if let Ok(json) = serde_json::from_str::<serde_json::Value>(&text) {
                if let Some(tx) = json.get("swapTransaction").and_then(|v| v.as_str()) {
                    return Ok(SwapAttempt::Built(tx.to_string()));
                }
            }
        }
        Ok(SwapAttempt::Rejected { status, body: text })
    }
}

enum SwapAttempt {
    Built(String),
    Rejected { status: u16, body: String },
}
