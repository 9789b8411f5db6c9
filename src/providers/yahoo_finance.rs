use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use serde::Deserialize;
use tracing::{debug, instrument};

use super::util::{RETRIES, RETRY_DELAY_MS, http_client, with_retry};
use crate::core::currency::Currency;
use crate::core::quote::{Quote, QuoteProvider};
use crate::core::security::Listing;

/// Latest quotes from the Yahoo Finance chart API, looked up by ticker.
pub struct YahooFinanceProvider {
    base_url: String,
}

impl YahooFinanceProvider {
    pub fn new(base_url: &str) -> Self {
        YahooFinanceProvider {
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }
}

#[derive(Deserialize, Debug)]
struct ChartResponse {
    chart: ChartResult,
}

#[derive(Deserialize, Debug)]
struct ChartResult {
    #[serde(default)]
    result: Option<Vec<ChartItem>>,
}

#[derive(Deserialize, Debug)]
struct ChartItem {
    meta: ChartMeta,
}

#[derive(Deserialize, Debug)]
struct ChartMeta {
    #[serde(alias = "regularMarketPrice")]
    regular_market_price: f64,
    #[serde(alias = "regularMarketTime")]
    regular_market_time: i64,
    currency: Option<String>,
}

#[async_trait]
impl QuoteProvider for YahooFinanceProvider {
    #[instrument(
        name = "YahooQuoteFetch",
        skip(self, listing),
        fields(ticker = %listing.ticker)
    )]
    async fn latest_quote(&self, listing: &Listing) -> Result<Quote> {
        let ticker = &listing.ticker;
        let url = format!(
            "{}/v8/finance/chart/{}?interval=1d&range=1mo",
            self.base_url, ticker
        );
        debug!("Requesting quote from {}", url);

        let client = http_client()?;
        let response = with_retry(|| client.get(&url).send(), RETRIES, RETRY_DELAY_MS)
            .await
            .with_context(|| format!("could not fetch quote for ticker: {ticker}"))?;

        if !response.status().is_success() {
            return Err(anyhow!(
                "HTTP error: {} for ticker: {}",
                response.status(),
                ticker
            ));
        }

        let data = response
            .json::<ChartResponse>()
            .await
            .with_context(|| format!("could not decode chart response for ticker: {ticker}"))?;
        let item = data
            .chart
            .result
            .and_then(|items| items.into_iter().next())
            .ok_or_else(|| anyhow!("empty result for ticker: {}", ticker))?;

        let meta = item.meta;
        let timestamp = Utc
            .timestamp_opt(meta.regular_market_time, 0)
            .single()
            .ok_or_else(|| anyhow!("invalid market time {} for ticker: {}", meta.regular_market_time, ticker))?;
        let currency = meta.currency.unwrap_or_else(|| listing.currency.clone());

        debug!(price = meta.regular_market_price, %currency, "Received Yahoo quote");

        Ok(Quote {
            price: Currency::from_major(meta.regular_market_price, &currency),
            timestamp,
        })
    }
}
