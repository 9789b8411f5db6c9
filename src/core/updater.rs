//! Concurrent refresh of listing quotes.
//!
//! [`QuoteUpdater::update_quotes`] spawns one task per listing and returns as
//! soon as all tasks are running. The returned [`QuoteRefresh`] can be awaited
//! to collect the outcome of every listing, or dropped to let the tasks finish
//! in the background. A shared semaphore caps the number of in-flight
//! provider calls.

use super::config::QuotesConfig;
use super::quote::{QuoteProvider, QuoteProviderRegistry};
use super::security::Listing;
use super::store::SecurityProvider;
use anyhow::{Context, Result, anyhow};
use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::{debug, error, instrument, warn};

/// Outcome of refreshing a single listing.
#[derive(Debug)]
pub struct ListingRefresh {
    pub security_id: String,
    pub ticker: String,
    /// The stored listing with its new quote, or why the refresh failed.
    pub result: Result<Listing>,
}

/// Handle to the refresh tasks launched by one [`QuoteUpdater::update_quotes`] call.
#[derive(Default)]
pub struct QuoteRefresh {
    tasks: Vec<(Listing, JoinHandle<Result<Listing>>)>,
}

impl QuoteRefresh {
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Listings being refreshed, as they were before the refresh.
    pub fn listings(&self) -> impl Iterator<Item = &Listing> {
        self.tasks.iter().map(|(listing, _)| listing)
    }

    pub async fn wait(self) -> Vec<ListingRefresh> {
        self.wait_with(&|| {}).await
    }

    /// Waits for all tasks, calling `update_callback` whenever one finishes.
    pub async fn wait_with(self, update_callback: &(dyn Fn() + Sync)) -> Vec<ListingRefresh> {
        let futures = self.tasks.into_iter().map(|(listing, handle)| async move {
            let result = match handle.await {
                Ok(result) => result,
                Err(e) => Err(anyhow!("quote update task failed: {e}")),
            };
            update_callback();
            ListingRefresh {
                security_id: listing.security_id,
                ticker: listing.ticker,
                result,
            }
        });

        join_all(futures).await
    }
}

pub struct QuoteUpdater {
    store: Arc<dyn SecurityProvider>,
    registry: Arc<QuoteProviderRegistry>,
    permits: Arc<Semaphore>,
    timeout: Duration,
}

impl QuoteUpdater {
    pub fn new(
        store: Arc<dyn SecurityProvider>,
        registry: Arc<QuoteProviderRegistry>,
        config: &QuotesConfig,
    ) -> Self {
        Self::with_limits(
            store,
            registry,
            config.max_concurrency,
            Duration::from_secs(config.timeout_secs),
        )
    }

    pub fn with_limits(
        store: Arc<dyn SecurityProvider>,
        registry: Arc<QuoteProviderRegistry>,
        max_concurrency: usize,
        timeout: Duration,
    ) -> Self {
        Self {
            store,
            registry,
            permits: Arc::new(Semaphore::new(max_concurrency.max(1))),
            timeout,
        }
    }

    /// Starts a quote refresh for every listing of `security_ids`, or of all
    /// known securities if `security_ids` is empty.
    ///
    /// Securities without a usable quote provider are skipped. Only failing
    /// to list securities or listings is reported as an error; failures of
    /// individual refreshes end up in the [`QuoteRefresh`] outcomes.
    #[instrument(skip(self))]
    pub async fn update_quotes(&self, security_ids: &[String]) -> Result<QuoteRefresh> {
        let securities = if security_ids.is_empty() {
            self.store.list_securities().await
        } else {
            self.store.list_securities_by_ids(security_ids).await
        }
        .context("internal error while listing securities")?;

        let mut refresh = QuoteRefresh::default();

        for security in securities {
            let Some(provider_name) = security.quote_provider.as_deref() else {
                warn!(security = %security.id, "No quote provider configured for security");
                continue;
            };

            let Some(provider) = self.registry.get(provider_name) else {
                warn!(
                    security = %security.id,
                    provider = provider_name,
                    "Quote provider not found"
                );
                continue;
            };

            let listings = self
                .store
                .list_listings_by_security_id(&security.id)
                .await
                .with_context(|| {
                    format!("internal error while listing listings of security {}", security.id)
                })?;

            for listing in listings {
                debug!(
                    security = %listing.security_id,
                    ticker = %listing.ticker,
                    provider = provider_name,
                    "Triggering quote update"
                );

                let handle = tokio::spawn(update_quote(
                    Arc::clone(&self.store),
                    Arc::clone(&provider),
                    Arc::clone(&self.permits),
                    self.timeout,
                    listing.clone(),
                ));
                refresh.tasks.push((listing, handle));
            }
        }

        Ok(refresh)
    }
}

async fn update_quote(
    store: Arc<dyn SecurityProvider>,
    provider: Arc<dyn QuoteProvider>,
    permits: Arc<Semaphore>,
    timeout: Duration,
    mut listing: Listing,
) -> Result<Listing> {
    let _permit = permits
        .acquire_owned()
        .await
        .context("quote update pool is closed")?;

    let ticker = listing.ticker.clone();
    let security_id = listing.security_id.clone();

    let result = tokio::time::timeout(timeout, async move {
        let quote = provider.latest_quote(&listing).await?;

        listing.latest_quote = Some(quote.price);
        listing.latest_quote_timestamp = Some(quote.timestamp);
        store
            .upsert_listing(&listing)
            .await
            .context("Failed to store quote")?;

        Ok::<_, anyhow::Error>(listing)
    })
    .await
    .unwrap_or_else(|_| Err(anyhow!("quote update timed out after {timeout:?}")));

    match &result {
        Ok(listing) => debug!(
            security = %security_id,
            ticker = %ticker,
            quote = ?listing.latest_quote,
            "Quote updated"
        ),
        Err(e) => error!(
            security = %security_id,
            ticker = %ticker,
            error = %e,
            "An error occurred during quote update"
        ),
    }

    result
}
