//! FIFO cost-basis calculation over the event history of a single security.

use super::currency::Currency;
use super::event::{PortfolioEvent, PortfolioEventType};
use tracing::warn;

/// Quantities below this are float residue of a full sale and count as zero.
const AMOUNT_EPSILON: f64 = 1e-9;

fn snap_to_zero(amount: f64) -> f64 {
    if amount.abs() < AMOUNT_EPSILON {
        0.0
    } else {
        amount
    }
}

/// A batch of acquired units, consumed oldest-first by later disposals.
#[derive(Debug, Clone, PartialEq)]
pub struct Lot {
    pub amount: f64,
    pub price: Currency,
    pub fees: Currency,
    /// Net value of the remaining units, `price × amount`.
    pub value: Currency,
}

impl Lot {
    pub fn is_open(&self) -> bool {
        self.amount > 0.0
    }
}

/// Running cost-basis state, built by replaying events in order.
///
/// Lots are never removed once created. A fully consumed lot stays in place
/// with a zero amount so that insertion order, and with it FIFO order, is kept.
#[derive(Debug, Clone)]
pub struct Calculation {
    pub outstanding_amount: f64,
    pub buyer_fees: Currency,
    pub seller_fees: Currency,
    pub total_fees: Currency,
    pub taxes: Currency,
    /// Cash effect of all applied events.
    pub cash: Currency,
    lots: Vec<Lot>,
    currency: String,
}

impl Calculation {
    pub fn new(currency: &str) -> Self {
        Self {
            outstanding_amount: 0.0,
            buyer_fees: Currency::zero(currency),
            seller_fees: Currency::zero(currency),
            total_fees: Currency::zero(currency),
            taxes: Currency::zero(currency),
            cash: Currency::zero(currency),
            lots: Vec::new(),
            currency: currency.to_string(),
        }
    }

    /// Creates a calculation and applies all `events` in the given order.
    pub fn from_events<'a, I>(events: I, currency: &str) -> Self
    where
        I: IntoIterator<Item = &'a PortfolioEvent>,
    {
        let mut c = Self::new(currency);
        for event in events {
            c.apply(event);
        }
        c
    }

    pub fn apply(&mut self, event: &PortfolioEvent) {
        match event.event_type {
            PortfolioEventType::Buy | PortfolioEventType::DeliveryInbound => {
                let value = event.price.times(event.amount);

                if event.event_type == PortfolioEventType::Buy {
                    self.cash -= &value;
                }
                self.cash -= &event.fees;
                self.cash -= &event.taxes;

                self.buyer_fees += &event.fees;
                self.total_fees += &event.fees;
                self.outstanding_amount += event.amount;

                self.lots.push(Lot {
                    amount: event.amount,
                    price: event.price.clone(),
                    fees: event.fees.clone(),
                    value,
                });
            }
            PortfolioEventType::Sell | PortfolioEventType::DeliveryOutbound => {
                if event.event_type == PortfolioEventType::Sell {
                    self.cash += &event.price.times(event.amount);
                }
                self.cash -= &event.fees;
                self.cash -= &event.taxes;

                self.seller_fees += &event.fees;
                self.total_fees += &event.fees;
                self.taxes += &event.taxes;

                if event.amount > self.outstanding_amount + AMOUNT_EPSILON {
                    warn!(
                        security = event.security().unwrap_or("cash"),
                        event = %event.id,
                        sold = event.amount,
                        held = self.outstanding_amount,
                        "Selling more than currently held, clamping to zero"
                    );
                }
                self.outstanding_amount =
                    snap_to_zero((self.outstanding_amount - event.amount).max(0.0));

                self.consume_lots(event.amount);
            }
            PortfolioEventType::Dividend => {
                self.cash += &event.price.times(event.amount);
                self.cash -= &event.fees;
                self.cash -= &event.taxes;
            }
            PortfolioEventType::DepositCash => {
                self.cash += &event.price;
            }
            PortfolioEventType::WithdrawCash => {
                self.cash -= &event.price;
            }
        }
    }

    fn consume_lots(&mut self, mut sold: f64) {
        for lot in self.lots.iter_mut() {
            if sold <= 0.0 {
                break;
            }
            if !lot.is_open() {
                continue;
            }

            let n = sold.min(lot.amount);
            lot.amount = snap_to_zero(lot.amount - n);
            lot.value = lot.price.times(lot.amount);

            // Fees of a closed lot are consumed by the sale, not carried over.
            if lot.amount <= 0.0 {
                lot.fees = Currency::zero(&lot.fees.symbol);
            }

            sold = snap_to_zero(sold - n);
        }
    }

    /// All lots in insertion order, including consumed ones.
    pub fn lots(&self) -> &[Lot] {
        &self.lots
    }

    pub fn open_lots(&self) -> impl Iterator<Item = &Lot> {
        self.lots.iter().filter(|lot| lot.is_open())
    }

    /// Cost basis of the remaining units, without fees.
    pub fn net_value(&self) -> Currency {
        self.lots
            .iter()
            .fold(Currency::zero(&self.currency), |acc, lot| acc.plus(&lot.value))
    }

    /// Cost basis of the remaining units, including their purchase fees.
    pub fn gross_value(&self) -> Currency {
        self.lots.iter().fold(Currency::zero(&self.currency), |acc, lot| {
            acc.plus(&lot.value).plus(&lot.fees)
        })
    }

    /// Net value per outstanding unit; zero for a closed position.
    pub fn net_price(&self) -> Currency {
        self.per_unit(self.net_value())
    }

    /// Gross value per outstanding unit; zero for a closed position.
    pub fn gross_price(&self) -> Currency {
        self.per_unit(self.gross_value())
    }

    fn per_unit(&self, value: Currency) -> Currency {
        if self.outstanding_amount == 0.0 {
            return Currency::zero(&self.currency);
        }
        value.divide(self.outstanding_amount)
    }
}
