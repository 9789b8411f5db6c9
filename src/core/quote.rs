//! Quote provider abstractions

use super::config::ProvidersConfig;
use super::currency::Currency;
use super::security::Listing;
use crate::providers::ing::IngProvider;
use crate::providers::yahoo_finance::YahooFinanceProvider;
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;

pub const QUOTE_PROVIDER_YF: &str = "yf";
pub const QUOTE_PROVIDER_ING: &str = "ing";

#[derive(Debug, Clone, PartialEq)]
pub struct Quote {
    pub price: Currency,
    pub timestamp: DateTime<Utc>,
}

#[async_trait]
pub trait QuoteProvider: Send + Sync {
    async fn latest_quote(&self, listing: &Listing) -> Result<Quote>;
}

/// Quote providers addressable by the name configured on a security.
#[derive(Default, Clone)]
pub struct QuoteProviderRegistry {
    providers: HashMap<String, Arc<dyn QuoteProvider>>,
}

impl QuoteProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the built-in providers with the configured endpoints.
    pub fn from_config(config: &ProvidersConfig) -> Self {
        let mut registry = Self::new();
        registry.register(
            QUOTE_PROVIDER_YF,
            Arc::new(YahooFinanceProvider::new(&config.yahoo_base_url())),
        );
        registry.register(
            QUOTE_PROVIDER_ING,
            Arc::new(IngProvider::new(&config.ing_base_url())),
        );
        registry
    }

    /// Registers `provider` under `name`, replacing any earlier registration.
    pub fn register(&mut self, name: &str, provider: Arc<dyn QuoteProvider>) {
        self.providers.insert(name.to_string(), provider);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn QuoteProvider>> {
        self.providers.get(name).cloned()
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<_> = self.providers.keys().map(String::as_str).collect();
        names.sort();
        names
    }
}
