//! Valuation engine: money, events, lot ledger, snapshots and quote refresh

pub mod calculation;
pub mod config;
pub mod currency;
pub mod event;
pub mod log;
pub mod quote;
pub mod security;
pub mod snapshot;
pub mod store;
pub mod updater;

pub use calculation::{Calculation, Lot};
pub use currency::Currency;
pub use event::{PortfolioEvent, PortfolioEventType};
pub use quote::{Quote, QuoteProvider, QuoteProviderRegistry};
pub use security::{Listing, Security};
pub use snapshot::{PortfolioPosition, PortfolioSnapshot, SnapshotBuilder, build_snapshot};
pub use store::{EventProvider, SecurityProvider};
pub use updater::{ListingRefresh, QuoteRefresh, QuoteUpdater};
