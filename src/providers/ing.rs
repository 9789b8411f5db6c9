use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::{debug, instrument};

use super::util::{RETRIES, RETRY_DELAY_MS, http_client, with_retry};
use crate::core::currency::Currency;
use crate::core::quote::{Quote, QuoteProvider};
use crate::core::security::Listing;

/// Latest quotes from the ING instrument header API, looked up by ISIN.
pub struct IngProvider {
    base_url: String,
}

impl IngProvider {
    pub fn new(base_url: &str) -> Self {
        IngProvider {
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct InstrumentHeader {
    #[serde(default)]
    has_bid_ask: bool,
    bid: Option<f64>,
    bid_date: Option<DateTime<Utc>>,
    price: Option<f64>,
    price_change_date: Option<DateTime<Utc>>,
    currency: Option<String>,
}

impl InstrumentHeader {
    /// Bid while the instrument is traded with bid/ask, the last price otherwise.
    fn quote(&self) -> Option<(f64, DateTime<Utc>)> {
        if self.has_bid_ask {
            Some((self.bid?, self.bid_date?))
        } else {
            Some((self.price?, self.price_change_date?))
        }
    }
}

#[async_trait]
impl QuoteProvider for IngProvider {
    #[instrument(
        name = "IngQuoteFetch",
        skip(self, listing),
        fields(security = %listing.security_id)
    )]
    async fn latest_quote(&self, listing: &Listing) -> Result<Quote> {
        let security_id = &listing.security_id;
        let url = format!(
            "{}/api/v1/components/instrumentheader/{}",
            self.base_url, security_id
        );
        debug!("Requesting instrument header from {}", url);

        let client = http_client()?;
        let response = with_retry(|| client.get(&url).send(), RETRIES, RETRY_DELAY_MS)
            .await
            .with_context(|| format!("could not fetch quote for security: {security_id}"))?;

        if !response.status().is_success() {
            return Err(anyhow!(
                "HTTP error: {} for security: {}",
                response.status(),
                security_id
            ));
        }

        let header = response.json::<InstrumentHeader>().await.with_context(|| {
            format!("could not decode instrument header for security: {security_id}")
        })?;
        let (price, timestamp) = header
            .quote()
            .ok_or_else(|| anyhow!("no price available for security: {}", security_id))?;
        let currency = header
            .currency
            .clone()
            .unwrap_or_else(|| listing.currency.clone());

        debug!(price, %currency, bid_ask = header.has_bid_ask, "Received ING quote");

        Ok(Quote {
            price: Currency::from_major(price, &currency),
            timestamp,
        })
    }
}
