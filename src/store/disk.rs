use crate::core::config::AppConfig;
use crate::core::event::PortfolioEvent;
use crate::core::security::{Listing, Security};
use crate::core::store::{EventProvider, SecurityProvider};
use anyhow::{Context, Result};
use async_trait::async_trait;
use fjall::{Keyspace, PartitionCreateOptions, PartitionHandle, PersistMode};
use serde::{Serialize, de::DeserializeOwned};
use std::path::Path;
use tracing::{debug, info};

const SEP: char = '\0';

/// Persistent event and security store on top of a fjall keyspace.
///
/// Events are keyed `{portfolio}\0{seq}` with a zero-padded sequence so that
/// a prefix scan yields them in arrival order. Listings are keyed
/// `{security}\0{ticker}`.
pub struct DiskStore {
    keyspace: Keyspace,
    events: PartitionHandle,
    securities: PartitionHandle,
    listings: PartitionHandle,
}

fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    serde_json::to_vec(value).context("Failed to encode record")
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    serde_json::from_slice(bytes).context("Failed to decode record")
}

fn event_prefix(portfolio_id: &str) -> String {
    format!("{portfolio_id}{SEP}")
}

fn event_key(portfolio_id: &str, seq: u64) -> String {
    format!("{portfolio_id}{SEP}{seq:010}")
}

fn listing_prefix(security_id: &str) -> String {
    format!("{security_id}{SEP}")
}

fn listing_key(security_id: &str, ticker: &str) -> String {
    format!("{security_id}{SEP}{ticker}")
}

impl DiskStore {
    pub fn open(path: &Path) -> Result<Self> {
        std::fs::create_dir_all(path)
            .with_context(|| format!("Failed to create directory: {}", path.display()))?;

        let keyspace = fjall::Config::new(path)
            .open()
            .with_context(|| format!("Failed to open store at {}", path.display()))?;
        let open = |name: &str| {
            keyspace
                .open_partition(name, PartitionCreateOptions::default())
                .with_context(|| format!("Failed to open partition {name}"))
        };
        let events = open("events")?;
        let securities = open("securities")?;
        let listings = open("listings")?;

        debug!("Opened store at {}", path.display());
        Ok(Self {
            keyspace,
            events,
            securities,
            listings,
        })
    }

    /// Imports the configured securities, listings and portfolio events.
    ///
    /// Events of every configured portfolio are replaced. Listings keep a
    /// quote that was already stored for them.
    pub fn import_config(&self, config: &AppConfig) -> Result<()> {
        for security in config.securities() {
            self.securities.insert(security.id.as_str(), encode(&security)?)?;
        }

        for mut listing in config.listings() {
            let key = listing_key(&listing.security_id, &listing.ticker);
            if let Some(bytes) = self.listings.get(&key)? {
                let stored: Listing = decode(&bytes)?;
                listing.latest_quote = stored.latest_quote;
                listing.latest_quote_timestamp = stored.latest_quote_timestamp;
            }
            self.listings.insert(key, encode(&listing)?)?;
        }

        for portfolio in &config.portfolios {
            self.clear_events(&portfolio.id)?;
            let events = config.events(portfolio);
            for (seq, event) in events.iter().enumerate() {
                self.events
                    .insert(event_key(&portfolio.id, seq as u64), encode(event)?)?;
            }
            debug!(portfolio = %portfolio.id, events = events.len(), "Imported events");
        }

        self.keyspace
            .persist(PersistMode::SyncAll)
            .context("Failed to persist store")?;
        info!(
            portfolios = config.portfolios.len(),
            securities = config.securities.len(),
            "Imported configuration"
        );
        Ok(())
    }

    fn clear_events(&self, portfolio_id: &str) -> Result<()> {
        let keys = self
            .events
            .prefix(event_prefix(portfolio_id))
            .map(|kv| kv.map(|(key, _)| key))
            .collect::<Result<Vec<_>, _>>()?;
        for key in keys {
            self.events.remove(key)?;
        }
        Ok(())
    }

    fn scan<T: DeserializeOwned>(partition: &PartitionHandle, prefix: &str) -> Result<Vec<T>> {
        partition
            .prefix(prefix)
            .map(|kv| {
                let (_, value) = kv?;
                decode(&value)
            })
            .collect()
    }
}

#[cfg(test)]
impl DiskStore {
    /// Appends an event to its portfolio.
    pub(crate) fn add_event(&self, event: &PortfolioEvent) -> Result<()> {
        let seq = match self.events.prefix(event_prefix(&event.portfolio_id)).next_back() {
            Some(kv) => {
                let (key, _) = kv?;
                let key = String::from_utf8_lossy(&key);
                let last = key
                    .rsplit(SEP)
                    .next()
                    .and_then(|s| s.parse::<u64>().ok())
                    .with_context(|| format!("Malformed event key: {key:?}"))?;
                last + 1
            }
            None => 0,
        };
        self.events
            .insert(event_key(&event.portfolio_id, seq), encode(event)?)?;
        Ok(())
    }

    pub(crate) fn add_security(&self, security: &Security) -> Result<()> {
        self.securities.insert(security.id.as_str(), encode(security)?)?;
        Ok(())
    }
}

#[async_trait]
impl EventProvider for DiskStore {
    async fn list_events_by_portfolio_id(&self, portfolio_id: &str) -> Result<Vec<PortfolioEvent>> {
        Self::scan(&self.events, &event_prefix(portfolio_id))
            .with_context(|| format!("Failed to read events of portfolio {portfolio_id}"))
    }
}

#[async_trait]
impl SecurityProvider for DiskStore {
    async fn list_securities(&self) -> Result<Vec<Security>> {
        Self::scan(&self.securities, "").context("Failed to read securities")
    }

    async fn list_securities_by_ids(&self, ids: &[String]) -> Result<Vec<Security>> {
        let mut securities = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(bytes) = self.securities.get(id)? {
                securities.push(decode(&bytes)?);
            }
        }
        Ok(securities)
    }

    async fn list_listings_by_security_id(&self, security_id: &str) -> Result<Vec<Listing>> {
        Self::scan(&self.listings, &listing_prefix(security_id))
            .with_context(|| format!("Failed to read listings of security {security_id}"))
    }

    async fn upsert_listing(&self, listing: &Listing) -> Result<()> {
        self.listings.insert(
            listing_key(&listing.security_id, &listing.ticker),
            encode(listing)?,
        )?;
        self.keyspace
            .persist(PersistMode::SyncAll)
            .context("Failed to persist store")?;
        Ok(())
    }
}
