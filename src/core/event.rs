use super::currency::Currency;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PortfolioEventType {
    Buy,
    Sell,
    Dividend,
    /// Securities transferred in from another account.
    DeliveryInbound,
    /// Securities transferred out to another account.
    DeliveryOutbound,
    DepositCash,
    WithdrawCash,
}

impl Display for PortfolioEventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}",
            match self {
                PortfolioEventType::Buy => "buy",
                PortfolioEventType::Sell => "sell",
                PortfolioEventType::Dividend => "dividend",
                PortfolioEventType::DeliveryInbound => "delivery_inbound",
                PortfolioEventType::DeliveryOutbound => "delivery_outbound",
                PortfolioEventType::DepositCash => "deposit_cash",
                PortfolioEventType::WithdrawCash => "withdraw_cash",
            }
        )
    }
}

impl FromStr for PortfolioEventType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "buy" => Ok(PortfolioEventType::Buy),
            "sell" => Ok(PortfolioEventType::Sell),
            "dividend" => Ok(PortfolioEventType::Dividend),
            "delivery_inbound" => Ok(PortfolioEventType::DeliveryInbound),
            "delivery_outbound" => Ok(PortfolioEventType::DeliveryOutbound),
            "deposit_cash" => Ok(PortfolioEventType::DepositCash),
            "withdraw_cash" => Ok(PortfolioEventType::WithdrawCash),
            _ => Err(anyhow::anyhow!("Invalid portfolio event type: {}", s)),
        }
    }
}

/// An immutable entry in a portfolio's append-only event history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortfolioEvent {
    pub id: String,
    #[serde(rename = "type")]
    pub event_type: PortfolioEventType,
    pub time: DateTime<Utc>,
    pub portfolio_id: String,
    #[serde(default)]
    pub security_id: Option<String>,
    /// Quantity of the security; unused by pure cash movements.
    #[serde(default)]
    pub amount: f64,
    pub price: Currency,
    pub fees: Currency,
    pub taxes: Currency,
}

impl PortfolioEvent {
    /// Returns the security this event refers to, or `None` for cash movements.
    pub fn security(&self) -> Option<&str> {
        self.security_id.as_deref().filter(|id| !id.is_empty())
    }
}
