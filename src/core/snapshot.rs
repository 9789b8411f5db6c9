//! Point-in-time portfolio snapshots built by replaying the event history.

use super::calculation::Calculation;
use super::currency::Currency;
use super::event::PortfolioEvent;
use super::security::{Listing, Security, latest_quote};
use super::store::{EventProvider, SecurityProvider};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, instrument, warn};

#[derive(Debug, Clone)]
pub struct PortfolioPosition {
    pub security_id: String,
    /// `None` when the security provider does not know the security.
    pub security: Option<Security>,
    pub amount: f64,
    pub purchase_value: Currency,
    pub purchase_price: Currency,
    pub market_value: Currency,
    pub market_price: Currency,
    pub profit_or_loss: Currency,
    /// Profit or loss relative to the purchase value.
    pub gains: f64,
}

#[derive(Debug, Clone)]
pub struct PortfolioSnapshot {
    pub time: DateTime<Utc>,
    pub first_transaction_time: Option<DateTime<Utc>>,
    pub positions: HashMap<String, PortfolioPosition>,
    pub total_purchase_value: Currency,
    pub total_market_value: Currency,
    pub total_profit_or_loss: Currency,
    pub total_gains: f64,
    pub cash: Currency,
    pub total_portfolio_value: Currency,
}

impl PortfolioSnapshot {
    fn empty(time: DateTime<Utc>, currency: &str) -> Self {
        Self {
            time,
            first_transaction_time: None,
            positions: HashMap::new(),
            total_purchase_value: Currency::zero(currency),
            total_market_value: Currency::zero(currency),
            total_profit_or_loss: Currency::zero(currency),
            total_gains: 0.0,
            cash: Currency::zero(currency),
            total_portfolio_value: Currency::zero(currency),
        }
    }

    /// Positions ordered by security id.
    pub fn sorted_positions(&self) -> Vec<&PortfolioPosition> {
        let mut positions: Vec<_> = self.positions.values().collect();
        positions.sort_by(|a, b| a.security_id.cmp(&b.security_id));
        positions
    }
}

/// Builds snapshots from an event provider and a security provider.
pub struct SnapshotBuilder<'a> {
    events: &'a dyn EventProvider,
    securities: &'a dyn SecurityProvider,
    currency: String,
}

impl<'a> SnapshotBuilder<'a> {
    pub fn new(
        events: &'a dyn EventProvider,
        securities: &'a dyn SecurityProvider,
        currency: &str,
    ) -> Self {
        Self {
            events,
            securities,
            currency: currency.to_string(),
        }
    }

    /// Replays all events of `portfolio_id` up to and including `cutoff`.
    #[instrument(name = "BuildSnapshot", skip(self), fields(currency = %self.currency))]
    pub async fn build(
        &self,
        portfolio_id: &str,
        cutoff: DateTime<Utc>,
    ) -> Result<PortfolioSnapshot> {
        let events = self
            .events
            .list_events_by_portfolio_id(portfolio_id)
            .await
            .with_context(|| {
                format!("internal error while listing events of portfolio {portfolio_id}")
            })?;

        let mut snapshot = PortfolioSnapshot::empty(cutoff, &self.currency);
        snapshot.first_transaction_time = events.iter().map(|e| e.time).min();

        let (cash_events, groups) = group_events(&events, cutoff);
        debug!(
            events = events.len(),
            securities = groups.len(),
            "Grouped portfolio events"
        );

        let cash = Calculation::from_events(cash_events, &self.currency);
        snapshot.cash += &cash.cash;

        let securities = self.lookup_securities(&groups).await?;

        for (security_id, txs) in groups {
            let c = Calculation::from_events(txs, &self.currency);
            if c.outstanding_amount == 0.0 {
                debug!(security = security_id, "Position is closed, skipping");
                continue;
            }

            // Cash moved by buying and selling this security
            snapshot.cash += &c.cash;

            let security = securities.get(security_id).cloned();
            let purchase_value = c.net_value();
            let purchase_price = c.net_price();
            let market_price = self
                .market_price(security_id, security.as_ref(), &purchase_price)
                .await?;
            let market_value = market_price.times(c.outstanding_amount);
            let profit_or_loss = market_value.minus(&purchase_value);
            let gains = ratio(profit_or_loss.amount, purchase_value.amount);

            snapshot.total_purchase_value += &purchase_value;
            snapshot.total_market_value += &market_value;
            snapshot.total_profit_or_loss += &profit_or_loss;

            snapshot.positions.insert(
                security_id.to_string(),
                PortfolioPosition {
                    security_id: security_id.to_string(),
                    security,
                    amount: c.outstanding_amount,
                    purchase_value,
                    purchase_price,
                    market_value,
                    market_price,
                    profit_or_loss,
                    gains,
                },
            );
        }

        snapshot.total_gains = ratio(
            snapshot
                .total_market_value
                .minus(&snapshot.total_purchase_value)
                .amount,
            snapshot.total_purchase_value.amount,
        );
        snapshot.total_portfolio_value = snapshot.total_market_value.plus(&snapshot.cash);

        Ok(snapshot)
    }

    async fn lookup_securities(
        &self,
        groups: &BTreeMap<&str, Vec<&PortfolioEvent>>,
    ) -> Result<HashMap<String, Security>> {
        if groups.is_empty() {
            return Ok(HashMap::new());
        }

        let ids: Vec<String> = groups.keys().map(|id| id.to_string()).collect();
        let securities = self
            .securities
            .list_securities_by_ids(&ids)
            .await
            .context("internal error while listing securities")?;

        Ok(securities.into_iter().map(|s| (s.id.clone(), s)).collect())
    }

    /// Latest known quote of the security, or `fallback` if there is none.
    async fn market_price(
        &self,
        security_id: &str,
        security: Option<&Security>,
        fallback: &Currency,
    ) -> Result<Currency> {
        if security.is_none() {
            debug!(security = security_id, "Unknown security, using purchase price");
            return Ok(fallback.clone());
        }

        let listings = self
            .securities
            .list_listings_by_security_id(security_id)
            .await
            .with_context(|| {
                format!("internal error while listing listings of security {security_id}")
            })?;

        // Quotes in other currencies cannot be added to the base-currency totals.
        let (quoted, foreign): (Vec<Listing>, Vec<Listing>) = listings
            .into_iter()
            .filter(|l| l.latest_quote.is_some())
            .partition(|l| {
                l.latest_quote
                    .as_ref()
                    .is_some_and(|q| q.symbol == self.currency)
            });

        match latest_quote(&quoted) {
            Some(quote) => Ok(quote.clone()),
            None if !foreign.is_empty() => {
                warn!(
                    security = security_id,
                    currency = %self.currency,
                    listings = ?foreign.iter().map(|l| l.ticker.as_str()).collect::<Vec<_>>(),
                    "Only quotes in other currencies available, using purchase price"
                );
                Ok(fallback.clone())
            }
            None => {
                debug!(security = security_id, "No quote available, using purchase price");
                Ok(fallback.clone())
            }
        }
    }
}

/// Convenience wrapper around [`SnapshotBuilder::build`].
pub async fn build_snapshot(
    events: &dyn EventProvider,
    securities: &dyn SecurityProvider,
    portfolio_id: &str,
    cutoff: DateTime<Utc>,
    currency: &str,
) -> Result<PortfolioSnapshot> {
    SnapshotBuilder::new(events, securities, currency)
        .build(portfolio_id, cutoff)
        .await
}

/// Splits events at or before `cutoff` into cash-only events and per-security
/// groups, each sorted by time. Events with equal time keep their original order.
fn group_events(
    events: &[PortfolioEvent],
    cutoff: DateTime<Utc>,
) -> (Vec<&PortfolioEvent>, BTreeMap<&str, Vec<&PortfolioEvent>>) {
    let mut cash = Vec::new();
    let mut groups: BTreeMap<&str, Vec<&PortfolioEvent>> = BTreeMap::new();

    for event in events.iter().filter(|e| e.time <= cutoff) {
        match event.security() {
            Some(id) => groups.entry(id).or_default().push(event),
            None => cash.push(event),
        }
    }

    cash.sort_by_key(|e| e.time);
    for txs in groups.values_mut() {
        txs.sort_by_key(|e| e.time);
    }

    (cash, groups)
}

fn ratio(numerator: i64, denominator: i64) -> f64 {
    if denominator == 0 {
        0.0
    } else {
        numerator as f64 / denominator as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::event::PortfolioEventType;
    use crate::store::memory::MemoryStore;
    use anyhow::anyhow;
    use async_trait::async_trait;
    use chrono::{Duration, TimeZone};

    const APPLE: &str = "US0378331005";
    const MSFT: &str = "US5949181045";

    fn day(d: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2023, 1, 1, 0, 0, 0).unwrap() + Duration::days(d)
    }

    fn event(
        id: &str,
        event_type: PortfolioEventType,
        d: i64,
        security_id: Option<&str>,
        amount: f64,
        price: i64,
        fees: i64,
        taxes: i64,
    ) -> PortfolioEvent {
        PortfolioEvent {
            id: id.to_string(),
            event_type,
            time: day(d),
            portfolio_id: "main".to_string(),
            security_id: security_id.map(str::to_string),
            amount,
            price: Currency::new(price, "EUR"),
            fees: Currency::new(fees, "EUR"),
            taxes: Currency::new(taxes, "EUR"),
        }
    }

    fn security(id: &str, provider: Option<&str>) -> Security {
        Security {
            id: id.to_string(),
            display_name: id.to_string(),
            quote_provider: provider.map(str::to_string),
        }
    }

    async fn example_store() -> MemoryStore {
        use PortfolioEventType::*;
        let store = MemoryStore::new();
        for e in [
            event("0", DepositCash, 0, None, 0.0, 500000, 0, 0),
            event("1", Buy, 1, Some(APPLE), 5.0, 18110, 716, 0),
            event("2", Sell, 2, Some(APPLE), 2.0, 30430, 642, 1632),
            event("3", Buy, 3, Some(APPLE), 5.0, 29000, 853, 0),
            event("4", Sell, 4, Some(APPLE), 3.0, 22000, 845, 0),
            event("5", Buy, 5, Some(APPLE), 5.0, 20330, 744, 0),
            event("6", Buy, 6, Some(APPLE), 5.0, 19645, 736, 0),
            event("7", Buy, 7, Some(APPLE), 10.0, 14655, 856, 0),
        ] {
            store.add_event(e).await;
        }
        store.add_security(security(APPLE, Some("yf"))).await;
        store
    }

    #[tokio::test]
    async fn test_snapshot_before_first_event_is_empty() {
        let store = example_store().await;
        let snap = build_snapshot(&store, &store, "main", day(-1), "EUR")
            .await
            .unwrap();

        assert!(snap.positions.is_empty());
        assert!(snap.total_purchase_value.is_zero());
        assert!(snap.total_market_value.is_zero());
        assert!(snap.total_profit_or_loss.is_zero());
        assert!(snap.cash.is_zero());
        assert!(snap.total_portfolio_value.is_zero());
        assert_eq!(snap.total_gains, 0.0);
        assert_eq!(snap.first_transaction_time, Some(day(0)));
    }

    #[tokio::test]
    async fn test_snapshot_without_quote_uses_purchase_price() {
        let store = example_store().await;
        let snap = build_snapshot(&store, &store, "main", day(30), "EUR")
            .await
            .unwrap();

        let pos = &snap.positions[APPLE];
        assert_eq!(pos.amount, 25.0);
        assert_eq!(pos.purchase_value.amount, 491425);
        assert_eq!(pos.purchase_price.amount, 19657);
        assert_eq!(pos.market_price, pos.purchase_price);
        assert_eq!(pos.market_value.amount, 19657 * 25);
        assert_eq!(pos.profit_or_loss.amount, 19657 * 25 - 491425);
        assert_eq!(snap.cash.amount, 37861);
        assert_eq!(
            snap.total_portfolio_value.amount,
            snap.total_market_value.amount + 37861
        );
    }

    #[tokio::test]
    async fn test_snapshot_uses_latest_quote() {
        let store = example_store().await;
        let mut listing = Listing::new(APPLE, "AAPL", "EUR");
        listing.latest_quote = Some(Currency::new(20000, "EUR"));
        listing.latest_quote_timestamp = Some(day(10));
        store.upsert_listing(&listing).await.unwrap();

        let snap = build_snapshot(&store, &store, "main", day(30), "EUR")
            .await
            .unwrap();

        let pos = &snap.positions[APPLE];
        assert_eq!(pos.market_price.amount, 20000);
        assert_eq!(pos.market_value.amount, 500000);
        assert_eq!(pos.profit_or_loss.amount, 500000 - 491425);
        assert!((pos.gains - 8575.0 / 491425.0).abs() < 1e-12);
        assert_eq!(snap.total_market_value.amount, 500000);
        assert_eq!(snap.total_purchase_value.amount, 491425);
        assert_eq!(snap.total_profit_or_loss.amount, 8575);
        assert!((snap.total_gains - 8575.0 / 491425.0).abs() < 1e-12);
        assert_eq!(snap.total_portfolio_value.amount, 500000 + 37861);
    }

    #[test_log::test(tokio::test)]
    async fn test_quotes_in_other_currencies_are_ignored() {
        let store = example_store().await;
        let mut local = Listing::new(APPLE, "APC.F", "EUR");
        local.latest_quote = Some(Currency::new(20000, "EUR"));
        local.latest_quote_timestamp = Some(day(10));
        store.upsert_listing(&local).await.unwrap();
        let mut foreign = Listing::new(APPLE, "AAPL", "USD");
        foreign.latest_quote = Some(Currency::new(22000, "USD"));
        foreign.latest_quote_timestamp = Some(day(11));
        store.upsert_listing(&foreign).await.unwrap();

        let snap = build_snapshot(&store, &store, "main", day(30), "EUR")
            .await
            .unwrap();

        let pos = &snap.positions[APPLE];
        assert_eq!(pos.market_price, Currency::new(20000, "EUR"));
        assert_eq!(pos.market_value, Currency::new(500000, "EUR"));
        assert_eq!(pos.profit_or_loss.symbol, "EUR");
        assert_eq!(snap.total_market_value, Currency::new(500000, "EUR"));
    }

    #[test_log::test(tokio::test)]
    async fn test_only_foreign_quote_falls_back_to_purchase_price() {
        let store = example_store().await;
        let mut foreign = Listing::new(APPLE, "AAPL", "USD");
        foreign.latest_quote = Some(Currency::new(11000, "USD"));
        foreign.latest_quote_timestamp = Some(day(10));
        store.upsert_listing(&foreign).await.unwrap();

        let snap = build_snapshot(&store, &store, "main", day(30), "EUR")
            .await
            .unwrap();

        let pos = &snap.positions[APPLE];
        assert_eq!(pos.market_price, pos.purchase_price);
        assert_eq!(pos.market_value.symbol, "EUR");
        assert_eq!(snap.total_market_value.symbol, "EUR");
        assert_eq!(snap.total_market_value.amount, 19657 * 25);
    }

    #[tokio::test]
    async fn test_cutoff_includes_events_at_the_same_time() {
        let store = example_store().await;
        let snap = build_snapshot(&store, &store, "main", day(1), "EUR")
            .await
            .unwrap();

        let pos = &snap.positions[APPLE];
        assert_eq!(pos.amount, 5.0);
        assert_eq!(pos.purchase_value.amount, 90550);
        assert_eq!(snap.cash.amount, 500000 - 90550 - 716);
    }

    #[tokio::test]
    async fn test_closed_position_is_omitted() {
        use PortfolioEventType::*;
        let store = example_store().await;
        store
            .add_event(event("8", Buy, 1, Some(MSFT), 2.0, 25000, 0, 0))
            .await;
        store
            .add_event(event("9", Sell, 2, Some(MSFT), 2.0, 26000, 0, 0))
            .await;

        let snap = build_snapshot(&store, &store, "main", day(30), "EUR")
            .await
            .unwrap();

        assert_eq!(snap.positions.len(), 1);
        assert!(!snap.positions.contains_key(MSFT));
        assert_eq!(snap.sorted_positions()[0].security_id, APPLE);
    }

    #[tokio::test]
    async fn test_events_are_replayed_in_time_order() {
        use PortfolioEventType::*;
        let store = MemoryStore::new();
        // Imported late, but happened first
        store
            .add_event(event("b", Sell, 2, Some(APPLE), 1.0, 3000, 0, 0))
            .await;
        store
            .add_event(event("a", Buy, 1, Some(APPLE), 2.0, 1000, 0, 0))
            .await;
        store
            .add_event(event("c", Buy, 3, Some(APPLE), 1.0, 2000, 0, 0))
            .await;

        let snap = build_snapshot(&store, &store, "main", day(30), "EUR")
            .await
            .unwrap();

        let pos = &snap.positions[APPLE];
        assert_eq!(pos.amount, 2.0);
        assert_eq!(pos.purchase_value.amount, 3000);
        assert!(pos.security.is_none());
        assert_eq!(snap.first_transaction_time, Some(day(1)));
    }

    struct FailingEvents;

    #[async_trait]
    impl EventProvider for FailingEvents {
        async fn list_events_by_portfolio_id(&self, _: &str) -> Result<Vec<PortfolioEvent>> {
            Err(anyhow!("database is locked"))
        }
    }

    #[tokio::test]
    async fn test_event_fetch_failure_is_internal_error() {
        let store = MemoryStore::new();
        let err = build_snapshot(&FailingEvents, &store, "main", day(0), "EUR")
            .await
            .unwrap_err();

        assert!(err.to_string().contains("internal error"));
        assert_eq!(err.root_cause().to_string(), "database is locked");
    }
}
