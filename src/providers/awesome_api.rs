use anyhow::{Result, anyhow};
use async_trait::async_trait;
use tracing::{debug, instrument};

use crate::core::config::USER_AGENT;
use crate::core::{Deadline, QuoteSource, RateQuote};

const USD_BRL_ENDPOINT: &str = "/json/last/USD-BRL";

// AwesomeApiProvider implementation for QuoteSource
pub struct AwesomeApiProvider {
    base_url: String,
    client: reqwest::Client,
}

impl AwesomeApiProvider {
    pub fn new(base_url: &str) -> Result<Self> {
        let client = reqwest::Client::builder().user_agent(USER_AGENT).build()?;
        Ok(Self::with_client(base_url, client))
    }

    pub fn with_client(base_url: &str, client: reqwest::Client) -> Self {
        AwesomeApiProvider {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        }
    }

    pub fn url(&self) -> String {
        format!("{}{}", self.base_url, USD_BRL_ENDPOINT)
    }
}

#[async_trait]
impl QuoteSource for AwesomeApiProvider {
    #[instrument(name = "UpstreamQuoteFetch", skip(self, deadline), fields(budget = ?deadline.budget()))]
    async fn fetch_quote(&self, deadline: &Deadline) -> Result<RateQuote> {
        let url = self.url();
        debug!("Requesting USD-BRL quote from {}", url);

        deadline
            .run("upstream fetch", async {
                let response = self
                    .client
                    .get(&url)
                    .timeout(deadline.remaining())
                    .send()
                    .await
                    .map_err(|e| anyhow!("Request error: {} URL: {}", e, url))?;

                debug!(response = ?response, "Received upstream response");

                if !response.status().is_success() {
                    return Err(anyhow!("HTTP error: {} URL: {}", response.status(), url));
                }

                let text = response.text().await?;
                let quote: RateQuote = serde_json::from_str(&text)
                    .map_err(|e| anyhow!("Failed to parse JSON response for USD-BRL: {}", e))?;

                debug!(bid = %quote.usd_brl.bid, "Decoded upstream quote");
                Ok::<_, anyhow::Error>(quote)
            })
            .await
    }
}
