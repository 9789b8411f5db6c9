//! Storage abstractions the valuation engine depends on

use super::event::PortfolioEvent;
use super::security::{Listing, Security};
use anyhow::Result;
use async_trait::async_trait;

#[async_trait]
pub trait EventProvider: Send + Sync {
    /// Lists a portfolio's events in a stable order (arrival order).
    async fn list_events_by_portfolio_id(&self, portfolio_id: &str) -> Result<Vec<PortfolioEvent>>;
}

#[async_trait]
pub trait SecurityProvider: Send + Sync {
    async fn list_securities(&self) -> Result<Vec<Security>>;

    /// Lists the known securities among `ids`; unknown ids are left out.
    async fn list_securities_by_ids(&self, ids: &[String]) -> Result<Vec<Security>>;

    async fn list_listings_by_security_id(&self, security_id: &str) -> Result<Vec<Listing>>;

    /// Inserts or replaces the listing identified by `(security_id, ticker)`.
    async fn upsert_listing(&self, listing: &Listing) -> Result<()>;
}
