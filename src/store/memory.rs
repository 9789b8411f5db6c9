use crate::core::config::AppConfig;
use crate::core::event::PortfolioEvent;
use crate::core::security::{Listing, Security};
use crate::core::store::{EventProvider, SecurityProvider};
use anyhow::Result;
use async_trait::async_trait;
use std::collections::BTreeMap;
use tokio::sync::RwLock;
use tracing::debug;

#[derive(Default)]
struct Inner {
    events: Vec<PortfolioEvent>,
    securities: BTreeMap<String, Security>,
    // Keyed by (security id, ticker).
    listings: BTreeMap<(String, String), Listing>,
}

/// In-memory event and security store.
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store holding the configured securities, listings and events.
    pub async fn from_config(config: &AppConfig) -> Self {
        let store = Self::new();
        for security in config.securities() {
            store.add_security(security).await;
        }
        {
            let mut inner = store.inner.write().await;
            for listing in config.listings() {
                inner.listings.insert(
                    (listing.security_id.clone(), listing.ticker.clone()),
                    listing,
                );
            }
        }
        for portfolio in &config.portfolios {
            for event in config.events(portfolio) {
                store.add_event(event).await;
            }
        }
        store
    }

    pub async fn add_event(&self, event: PortfolioEvent) {
        debug!(event = %event.id, portfolio = %event.portfolio_id, "Adding event");
        self.inner.write().await.events.push(event);
    }

    /// Inserts or replaces a security by id.
    pub async fn add_security(&self, security: Security) {
        self.inner
            .write()
            .await
            .securities
            .insert(security.id.clone(), security);
    }
}

#[async_trait]
impl EventProvider for MemoryStore {
    async fn list_events_by_portfolio_id(&self, portfolio_id: &str) -> Result<Vec<PortfolioEvent>> {
        let inner = self.inner.read().await;
        Ok(inner
            .events
            .iter()
            .filter(|e| e.portfolio_id == portfolio_id)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl SecurityProvider for MemoryStore {
    async fn list_securities(&self) -> Result<Vec<Security>> {
        Ok(self.inner.read().await.securities.values().cloned().collect())
    }

    async fn list_securities_by_ids(&self, ids: &[String]) -> Result<Vec<Security>> {
        let inner = self.inner.read().await;
        Ok(ids
            .iter()
            .filter_map(|id| inner.securities.get(id))
            .cloned()
            .collect())
    }

    async fn list_listings_by_security_id(&self, security_id: &str) -> Result<Vec<Listing>> {
        let inner = self.inner.read().await;
        Ok(inner
            .listings
            .values()
            .filter(|l| l.security_id == security_id)
            .cloned()
            .collect())
    }

    async fn upsert_listing(&self, listing: &Listing) -> Result<()> {
        let key = (listing.security_id.clone(), listing.ticker.clone());
        self.inner.write().await.listings.insert(key, listing.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::currency::Currency;
    use crate::core::event::PortfolioEventType;
    use chrono::{TimeZone, Utc};

    fn security(id: &str) -> Security {
        Security {
            id: id.to_string(),
            display_name: id.to_string(),
            quote_provider: None,
        }
    }

    fn deposit(id: &str, portfolio: &str) -> PortfolioEvent {
        PortfolioEvent {
            id: id.to_string(),
            event_type: PortfolioEventType::DepositCash,
            time: Utc.with_ymd_and_hms(2023, 1, 1, 0, 0, 0).unwrap(),
            portfolio_id: portfolio.to_string(),
            security_id: None,
            amount: 0.0,
            price: Currency::new(100, "EUR"),
            fees: Currency::zero("EUR"),
            taxes: Currency::zero("EUR"),
        }
    }

    #[tokio::test]
    async fn test_events_by_portfolio_keep_arrival_order() {
        let store = MemoryStore::new();
        store.add_event(deposit("b", "p1")).await;
        store.add_event(deposit("x", "p2")).await;
        store.add_event(deposit("a", "p1")).await;

        let events = store.list_events_by_portfolio_id("p1").await.unwrap();
        let ids: Vec<_> = events.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["b", "a"]);
        assert!(store.list_events_by_portfolio_id("none").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_securities_by_ids_skips_unknown() {
        let store = MemoryStore::new();
        store.add_security(security("A")).await;
        store.add_security(security("B")).await;

        let found = store
            .list_securities_by_ids(&["B".to_string(), "Z".to_string()])
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, "B");
        assert_eq!(store.list_securities().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_upsert_listing_replaces_by_ticker() {
        let store = MemoryStore::new();
        store.upsert_listing(&Listing::new("A", "A1", "EUR")).await.unwrap();
        store.upsert_listing(&Listing::new("A", "A2", "USD")).await.unwrap();

        let mut quoted = Listing::new("A", "A1", "EUR");
        quoted.latest_quote = Some(Currency::new(42, "EUR"));
        store.upsert_listing(&quoted).await.unwrap();

        let listings = store.list_listings_by_security_id("A").await.unwrap();
        assert_eq!(listings.len(), 2);
        assert_eq!(listings[0].latest_quote, Some(Currency::new(42, "EUR")));
        assert!(listings[1].latest_quote.is_none());
    }
}
