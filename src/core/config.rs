use super::currency::Currency;
use super::event::{PortfolioEvent, PortfolioEventType};
use super::security::{Listing, Security};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::{fs, path::PathBuf};
use tracing::debug;

pub const DEFAULT_YAHOO_BASE_URL: &str = "https://query1.finance.yahoo.com";
pub const DEFAULT_ING_BASE_URL: &str = "https://component-api.wertpapiere.ing.de";

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ListingConfig {
    pub ticker: String,
    pub currency: String,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct SecurityConfig {
    pub id: String,
    pub display_name: Option<String>,
    pub quote_provider: Option<String>,
    #[serde(default)]
    pub listings: Vec<ListingConfig>,
}

/// A portfolio event as written in the configuration file. Monetary values
/// are given in major units of the base currency.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct EventConfig {
    pub id: Option<String>,
    #[serde(rename = "type")]
    pub event_type: PortfolioEventType,
    pub time: DateTime<Utc>,
    pub security_id: Option<String>,
    #[serde(default)]
    pub amount: f64,
    #[serde(default)]
    pub price: f64,
    #[serde(default)]
    pub fees: f64,
    #[serde(default)]
    pub taxes: f64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct PortfolioConfig {
    pub id: String,
    pub display_name: Option<String>,
    #[serde(default)]
    pub events: Vec<EventConfig>,
}

impl PortfolioConfig {
    pub fn name(&self) -> &str {
        self.display_name.as_deref().unwrap_or(&self.id)
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ProviderConfig {
    pub base_url: String,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ProvidersConfig {
    pub yahoo: Option<ProviderConfig>,
    pub ing: Option<ProviderConfig>,
}

impl Default for ProvidersConfig {
    fn default() -> Self {
        ProvidersConfig {
            yahoo: Some(ProviderConfig {
                base_url: DEFAULT_YAHOO_BASE_URL.to_string(),
            }),
            ing: Some(ProviderConfig {
                base_url: DEFAULT_ING_BASE_URL.to_string(),
            }),
        }
    }
}

impl ProvidersConfig {
    pub fn yahoo_base_url(&self) -> String {
        self.yahoo
            .as_ref()
            .map_or(DEFAULT_YAHOO_BASE_URL, |p| &p.base_url)
            .to_string()
    }

    pub fn ing_base_url(&self) -> String {
        self.ing
            .as_ref()
            .map_or(DEFAULT_ING_BASE_URL, |p| &p.base_url)
            .to_string()
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct QuotesConfig {
    /// Upper bound of concurrent outbound quote requests.
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
    /// Deadline of a single quote fetch and store.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_max_concurrency() -> usize {
    8
}

fn default_timeout_secs() -> u64 {
    60
}

impl Default for QuotesConfig {
    fn default() -> Self {
        Self {
            max_concurrency: default_max_concurrency(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_currency() -> String {
    "EUR".to_string()
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct AppConfig {
    #[serde(default)]
    pub portfolios: Vec<PortfolioConfig>,
    #[serde(default)]
    pub securities: Vec<SecurityConfig>,
    #[serde(default)]
    pub providers: ProvidersConfig,
    #[serde(default)]
    pub quotes: QuotesConfig,
    #[serde(default = "default_currency")]
    pub currency: String,
    pub data_path: Option<String>,
}

impl AppConfig {
    pub fn load() -> Result<Self> {
        debug!("Loading default config");
        let config_path = Self::default_config_path()?;
        Self::load_from_path(&config_path)
    }

    pub fn default_config_path() -> Result<PathBuf> {
        let proj_dirs = ProjectDirs::from("io", "lotwise", "lotwise")
            .context("Could not determine project directories")?;
        Ok(proj_dirs.config_dir().join("config.yaml"))
    }

    pub fn default_data_path(&self) -> Result<PathBuf> {
        if let Some(custom_path) = &self.data_path {
            return Ok(PathBuf::from(custom_path));
        }
        let proj_dirs = ProjectDirs::from("io", "lotwise", "lotwise")
            .context("Could not determine project directories")?;
        Ok(proj_dirs.data_dir().to_path_buf())
    }

    pub fn load_from_path<P: AsRef<std::path::Path>>(path: P) -> Result<Self> {
        let config_str = fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;

        let config: Self = serde_yaml::from_str(&config_str)
            .with_context(|| format!("Failed to parse config file: {}", path.as_ref().display()))?;
        debug!("Successfully loaded config");
        Ok(config)
    }

    pub fn portfolio(&self, id: &str) -> Option<&PortfolioConfig> {
        self.portfolios.iter().find(|p| p.id == id)
    }

    pub fn securities(&self) -> Vec<Security> {
        self.securities
            .iter()
            .map(|s| Security {
                id: s.id.clone(),
                display_name: s.display_name.clone().unwrap_or_else(|| s.id.clone()),
                quote_provider: s.quote_provider.clone(),
            })
            .collect()
    }

    pub fn listings(&self) -> Vec<Listing> {
        self.securities
            .iter()
            .flat_map(|s| {
                s.listings
                    .iter()
                    .map(|l| Listing::new(&s.id, &l.ticker, &l.currency))
            })
            .collect()
    }

    /// Events of `portfolio` in file order, priced in the base currency.
    pub fn events(&self, portfolio: &PortfolioConfig) -> Vec<PortfolioEvent> {
        portfolio
            .events
            .iter()
            .enumerate()
            .map(|(i, e)| PortfolioEvent {
                id: e
                    .id
                    .clone()
                    .unwrap_or_else(|| format!("{}-{i}", portfolio.id)),
                event_type: e.event_type,
                time: e.time,
                portfolio_id: portfolio.id.clone(),
                security_id: e.security_id.clone(),
                amount: e.amount,
                price: Currency::from_major(e.price, &self.currency),
                fees: Currency::from_major(e.fees, &self.currency),
                taxes: Currency::from_major(e.taxes, &self.currency),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CONFIG: &str = r#"
securities:
  - id: "US0378331005"
    display_name: "Apple Inc."
    quote_provider: yf
    listings:
      - ticker: AAPL
        currency: USD
      - ticker: APC.F
        currency: EUR
  - id: "DE0005557508"
    quote_provider: ing
portfolios:
  - id: main
    display_name: "Main Depot"
    events:
      - type: deposit_cash
        time: 2023-01-01T00:00:00Z
        price: 5000.0
      - id: first-buy
        type: buy
        time: 2023-01-02T10:00:00Z
        security_id: "US0378331005"
        amount: 5
        price: 181.10
        fees: 7.16
"#;

    #[test]
    fn test_config_deserialization() {
        let config: AppConfig = serde_yaml::from_str(CONFIG).expect("Failed to deserialize");

        assert_eq!(config.currency, "EUR");
        assert_eq!(config.quotes.max_concurrency, 8);
        assert_eq!(config.quotes.timeout_secs, 60);
        assert_eq!(config.providers.yahoo_base_url(), DEFAULT_YAHOO_BASE_URL);
        assert_eq!(config.providers.ing_base_url(), DEFAULT_ING_BASE_URL);

        let securities = config.securities();
        assert_eq!(securities.len(), 2);
        assert_eq!(securities[0].display_name, "Apple Inc.");
        assert_eq!(securities[0].quote_provider.as_deref(), Some("yf"));
        assert_eq!(securities[1].display_name, "DE0005557508");

        let listings = config.listings();
        assert_eq!(listings.len(), 2);
        assert_eq!(listings[1].ticker, "APC.F");
        assert_eq!(listings[1].security_id, "US0378331005");
        assert!(listings[1].latest_quote.is_none());

        let portfolio = config.portfolio("main").unwrap();
        assert_eq!(portfolio.name(), "Main Depot");
        let events = config.events(portfolio);
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].id, "main-0");
        assert!(events[0].security().is_none());
        assert_eq!(events[0].price, Currency::new(500000, "EUR"));
        assert_eq!(events[1].id, "first-buy");
        assert_eq!(events[1].event_type, PortfolioEventType::Buy);
        assert_eq!(events[1].amount, 5.0);
        assert_eq!(events[1].price.amount, 18110);
        assert_eq!(events[1].fees.amount, 716);
        assert!(events[1].taxes.is_zero());
    }

    #[test]
    fn test_config_with_providers_and_quotes() {
        let yaml_str = r#"
providers:
  yahoo:
    base_url: "http://example.com/yahoo"
  ing:
    base_url: "http://example.com/ing"
quotes:
  max_concurrency: 2
currency: "USD"
data_path: /tmp/lotwise
"#;
        let config: AppConfig = serde_yaml::from_str(yaml_str).unwrap();
        assert_eq!(config.providers.yahoo_base_url(), "http://example.com/yahoo");
        assert_eq!(config.providers.ing_base_url(), "http://example.com/ing");
        assert_eq!(config.quotes.max_concurrency, 2);
        assert_eq!(config.quotes.timeout_secs, 60);
        assert_eq!(config.currency, "USD");
        assert_eq!(
            config.default_data_path().unwrap(),
            PathBuf::from("/tmp/lotwise")
        );
        assert!(config.portfolios.is_empty());
    }
}
