//! Exchange rate payloads and the upstream quote abstraction

use crate::core::deadline::Deadline;
use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Body returned by the upstream provider. Only the USD-BRL pair is read.
#[derive(Debug, Clone, Deserialize)]
pub struct RateQuote {
    #[serde(rename = "USDBRL")]
    pub usd_brl: PairQuote,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PairQuote {
    pub bid: String,
}

/// Reduced payload served on `/cotacao`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateResponse {
    pub bid: String,
}

impl From<&RateQuote> for RateResponse {
    fn from(quote: &RateQuote) -> Self {
        RateResponse {
            bid: quote.usd_brl.bid.clone(),
        }
    }
}

#[async_trait]
pub trait QuoteSource: Send + Sync {
    async fn fetch_quote(&self, deadline: &Deadline) -> Result<RateQuote>;
}
