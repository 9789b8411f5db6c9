use super::currency::Currency;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Security {
    pub id: String,
    pub display_name: String,
    /// Name of the registered quote provider used to refresh this security.
    #[serde(default)]
    pub quote_provider: Option<String>,
}

/// A ticker under which a security trades, together with its latest quote.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Listing {
    pub security_id: String,
    pub ticker: String,
    pub currency: String,
    #[serde(default)]
    pub latest_quote: Option<Currency>,
    #[serde(default)]
    pub latest_quote_timestamp: Option<DateTime<Utc>>,
}

impl Listing {
    pub fn new(security_id: &str, ticker: &str, currency: &str) -> Self {
        Self {
            security_id: security_id.to_string(),
            ticker: ticker.to_string(),
            currency: currency.to_string(),
            latest_quote: None,
            latest_quote_timestamp: None,
        }
    }
}

/// Picks the most recent quote among `listings`.
///
/// Listings without a quote are ignored; a quote without timestamp only wins
/// when no timestamped quote exists. On equal timestamps the earlier listing wins.
pub fn latest_quote(listings: &[Listing]) -> Option<&Currency> {
    let mut best: Option<&Listing> = None;
    for listing in listings.iter().filter(|l| l.latest_quote.is_some()) {
        match best {
            Some(b) if listing.latest_quote_timestamp <= b.latest_quote_timestamp => {}
            _ => best = Some(listing),
        }
    }
    best.and_then(|l| l.latest_quote.as_ref())
}
